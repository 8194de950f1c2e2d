// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Assemble the emulator and display bridge argument vectors.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{ComputerConfig, VARS_STORE_BYTES};
use crate::error::ComputerError;
use crate::policy::{BootDecision, DisplayMode};
use crate::probe::ProbeResult;

/// Ordered program invocation plus the files materialised while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<String>,
    created: Vec<PathBuf>,
}

impl CommandSpec {
    fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            created: Vec::new(),
        }
    }

    fn push(&mut self, token: impl Into<String>) {
        self.argv.push(token.into());
    }

    fn flag(&mut self, name: &str, value: impl Into<String>) {
        self.push(name);
        self.push(value);
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments following the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// Full token sequence, program first.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Files created as a side effect of building this command.
    #[must_use]
    pub fn created(&self) -> &[PathBuf] {
        &self.created
    }

    /// Space-joined rendering for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Create the zero-filled firmware variable store unless it already exists.
///
/// Returns `true` when the file was created by this call. An existing store is
/// never truncated. A store that could not be filled completely is removed so
/// a later call starts over.
pub fn ensure_vars_store(path: &Path) -> io::Result<bool> {
    let file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(err),
    };
    if let Err(err) = fill_vars_store(file) {
        if let Err(cleanup) = fs::remove_file(path) {
            warn!("failed to remove partial {}: {cleanup}", path.display());
        }
        return Err(err);
    }
    Ok(true)
}

fn fill_vars_store(mut file: File) -> io::Result<()> {
    file.write_all(&vec![0u8; VARS_STORE_BYTES])?;
    file.sync_all()
}

/// Builds emulator invocations from a configuration.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    config: &'a ComputerConfig,
}

impl<'a> CommandBuilder<'a> {
    /// Builder bound to `config`.
    #[must_use]
    pub fn new(config: &'a ComputerConfig) -> Self {
        Self { config }
    }

    /// Assemble the emulator invocation.
    ///
    /// Device order is fixed because the emulator assigns drive indices in
    /// argument order.
    pub fn build(
        &self,
        probe: &ProbeResult,
        decision: &BootDecision,
    ) -> Result<CommandSpec, ComputerError> {
        decision.into_result()?;
        let machine = &self.config.machine;
        let mut spec = CommandSpec::new(machine.emulator.as_str());

        spec.push("-enable-kvm");
        spec.flag("-cpu", "host");
        spec.flag("-smp", machine.cpus.to_string());
        spec.flag("-m", machine.memory.as_str());

        spec.flag("-vga", "virtio");

        match decision.display() {
            DisplayMode::Bridged => {
                spec.flag("-display", "none");
                spec.flag("-vnc", format!(":{}", machine.display));
            }
            DisplayMode::DirectFullscreen => {
                spec.flag("-display", "gtk,full-screen=on");
            }
        }

        if probe.firmware_present {
            spec.flag(
                "-drive",
                format!(
                    "if=pflash,format=raw,readonly=on,file={}",
                    probe.firmware_path.display()
                ),
            );
            let vars = self.config.layout.firmware_vars();
            let created = ensure_vars_store(&vars).map_err(|source| ComputerError::VarsStore {
                path: vars.clone(),
                source,
            })?;
            if created {
                info!("Created firmware variable store {}", vars.display());
                spec.created.push(vars.clone());
            }
            spec.flag(
                "-drive",
                format!("if=pflash,format=raw,file={}", vars.display()),
            );
        }

        if probe.disk_present {
            spec.flag(
                "-drive",
                format!(
                    "file={},format={},if=virtio",
                    probe.disk_path.display(),
                    self.config.disk.format
                ),
            );
        }

        if let Some(media) = &probe.media_path {
            spec.flag("-cdrom", media.display().to_string());
        }

        spec.flag("-audiodev", "alsa,id=audio0");
        spec.flag("-device", "intel-hda");
        spec.flag("-device", "hda-duplex,audiodev=audio0");

        spec.flag("-netdev", "user,id=net0");
        spec.flag("-device", "virtio-net-pci,netdev=net0");

        spec.flag("-device", "usb-ehci");
        spec.flag("-device", "usb-tablet");

        spec.flag("-rtc", "base=localtime,clock=host");

        Ok(spec)
    }

    /// Bridge invocation: served assets, listen port, and the emulator's VNC endpoint.
    #[must_use]
    pub fn bridge(&self, probe: &ProbeResult) -> CommandSpec {
        let bridge = &self.config.bridge;
        let program = match &probe.bridge_executable {
            Some(path) => path.display().to_string(),
            None => bridge.program.clone(),
        };
        let mut spec = CommandSpec::new(program);
        spec.push(format!("--web={}", self.config.layout.web_assets.display()));
        spec.push(bridge.listen_port.to_string());
        spec.push(format!(
            "{}:{}",
            bridge.upstream_host,
            self.config.machine.vnc_port()
        ));
        spec
    }
}
