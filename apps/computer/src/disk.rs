// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Create the default persistent disk image through the external disk tool.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::path::Path;
use std::process::{Command, Stdio};

use log::{error, info};

use crate::config::DiskConfig;
use crate::error::ComputerError;
use crate::probe::ProbeResult;

/// External disk image tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskTool {
    program: String,
    format: String,
    size: String,
}

impl DiskTool {
    /// Tool described by the disk configuration.
    #[must_use]
    pub fn new(config: &DiskConfig) -> Self {
        Self {
            program: config.tool.clone(),
            format: config.format.clone(),
            size: config.size.clone(),
        }
    }

    /// Argument vector, program first, that creates `path`.
    #[must_use]
    pub fn argv(&self, path: &Path) -> Vec<String> {
        vec![
            self.program.clone(),
            "create".to_owned(),
            "-f".to_owned(),
            self.format.clone(),
            path.display().to_string(),
            self.size.clone(),
        ]
    }

    /// Run the tool synchronously and confirm the image exists afterwards.
    pub fn create(&self, path: &Path) -> Result<(), ComputerError> {
        let argv = self.argv(path);
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .output()
            .map_err(|err| ComputerError::DiskCreate {
                path: path.to_path_buf(),
                reason: format!("spawn {}: {err}", self.program),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.lines().map(str::trim).find(|line| !line.is_empty()) {
                Some(line) => format!("{} exited with {}: {line}", self.program, output.status),
                None => format!("{} exited with {}", self.program, output.status),
            };
            return Err(ComputerError::DiskCreate {
                path: path.to_path_buf(),
                reason,
            });
        }
        if !path.exists() {
            return Err(ComputerError::DiskCreate {
                path: path.to_path_buf(),
                reason: format!("{} succeeded but produced no image", self.program),
            });
        }
        Ok(())
    }
}

/// Ensure a disk image exists, creating the default one when it is missing.
///
/// A failed creation is logged and the probe is returned unchanged so the
/// boot policy can still fall back to removable media.
pub fn provision_disk(tool: &DiskTool, probe: ProbeResult) -> ProbeResult {
    if probe.disk_present {
        return probe;
    }
    info!("Creating default {} disk...", tool.size);
    match tool.create(&probe.disk_path) {
        Ok(()) => {
            info!("Default disk created successfully!");
            probe.with_created_disk()
        }
        Err(err) => {
            error!("{err}");
            probe
        }
    }
}
