// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Inspect the host filesystem for boot media, firmware and bridge prerequisites.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::config::{ComputerConfig, Layout};

/// Snapshot of the artefacts available for one boot attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Read-only firmware image location.
    pub firmware_path: PathBuf,
    /// Whether the firmware image exists.
    pub firmware_present: bool,
    /// Persistent disk image location.
    pub disk_path: PathBuf,
    /// Whether the disk image exists.
    pub disk_present: bool,
    /// First removable media image found, if any.
    pub media_path: Option<PathBuf>,
    /// Whether the bridge web client directory exists.
    pub web_assets_present: bool,
    /// Resolved bridge executable, if it can be found.
    pub bridge_executable: Option<PathBuf>,
}

impl ProbeResult {
    /// Whether the bridge executable was found.
    #[must_use]
    pub fn bridge_executable_present(&self) -> bool {
        self.bridge_executable.is_some()
    }

    /// Copy of this snapshot recording that the disk image now exists.
    #[must_use]
    pub fn with_created_disk(&self) -> Self {
        Self {
            disk_present: true,
            ..self.clone()
        }
    }
}

/// Create the standard directories. Failures are logged and otherwise ignored.
pub fn ensure_layout(layout: &Layout) {
    for dir in layout.directories() {
        if let Err(err) = fs::create_dir_all(&dir) {
            error!("Failed to create directory {}: {err}", dir.display());
        }
    }
}

/// Probe the configured layout and tool locations.
pub fn probe(config: &ComputerConfig) -> ProbeResult {
    let layout = &config.layout;
    let firmware_present = check_path(&layout.firmware_code, "Firmware");
    let disk_present = check_path(&layout.disk_image, "Disk");
    let media_path = find_media(&layout.media_dir, &config.machine.media_extension);
    match &media_path {
        Some(path) => {
            debug!("ISO available.. yes");
            if let Some(name) = path.file_name() {
                info!("ISO found: {}", name.to_string_lossy());
            }
        }
        None => debug!("ISO available.. no"),
    }

    debug!("Checking libraries..");
    let web_assets_present = check_path(&layout.web_assets, "noVNC");
    let bridge_executable = match which::which(&config.bridge.program) {
        Ok(path) => {
            debug!("{}.. yes ({})", config.bridge.program, path.display());
            Some(path)
        }
        Err(err) => {
            debug!("{}.. no ({err})", config.bridge.program);
            None
        }
    };

    ProbeResult {
        firmware_path: layout.firmware_code.clone(),
        firmware_present,
        disk_path: layout.disk_image.clone(),
        disk_present,
        media_path,
        web_assets_present,
        bridge_executable,
    }
}

fn check_path(path: &Path, name: &str) -> bool {
    let present = path.exists();
    debug!("{name} available.. {}", if present { "yes" } else { "no" });
    present
}

/// Return the first regular file in `dir` whose extension matches `extension`.
///
/// Candidates are ordered by file name so repeated probes agree. An unreadable
/// directory is reported as "nothing found".
pub fn find_media(dir: &Path, extension: &str) -> Option<PathBuf> {
    debug!("Checking for ISO files in {}", dir.display());
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Error checking media directory {}: {err}", dir.display());
            return None;
        }
    };
    let wanted = extension.trim_start_matches('.');
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!("Error reading media directory entry: {err}");
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}
