// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load launcher configuration and the fixed on-disk layout.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Environment variable naming an optional TOML configuration file.
pub const CONFIG_ENV: &str = "COMPUTER_CONFIG";
/// File name of the firmware variable store, kept beside the firmware image.
pub const VARS_FILE_NAME: &str = "OVMF_VARS.fd";
/// Size of a freshly materialised firmware variable store.
pub const VARS_STORE_BYTES: usize = 64 * 1024;
/// TCP port of VNC display `:0`.
pub const VNC_BASE_PORT: u16 = 5900;

const MAX_VNC_DISPLAY: u16 = 99;
const MAX_GRACE_MS: u64 = 60_000;
const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Complete launcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputerConfig {
    /// Filesystem layout probed at boot.
    pub layout: Layout,
    /// Emulator invocation settings.
    pub machine: MachineConfig,
    /// Display bridge invocation settings.
    pub bridge: BridgeConfig,
    /// Disk auto-creation settings.
    pub disk: DiskConfig,
    /// Grace delays and shutdown polling.
    pub supervisor: SupervisorConfig,
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self::rooted_at(Path::new("."))
    }
}

impl ComputerConfig {
    /// Default configuration with every layout path placed under `root`.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            layout: Layout::rooted_at(root),
            machine: MachineConfig::default(),
            bridge: BridgeConfig::default(),
            disk: DiskConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }

    /// Reject values the emulator or bridge could not use.
    pub fn validate(&self) -> Result<()> {
        if self.machine.emulator.trim().is_empty() {
            return Err(anyhow!("machine.emulator must not be empty"));
        }
        if self.machine.cpus == 0 {
            return Err(anyhow!("machine.cpus must be >= 1"));
        }
        if self.machine.memory.trim().is_empty() {
            return Err(anyhow!("machine.memory must not be empty"));
        }
        if self.machine.display > MAX_VNC_DISPLAY {
            return Err(anyhow!(
                "machine.display {} exceeds {MAX_VNC_DISPLAY}",
                self.machine.display
            ));
        }
        if self.machine.media_extension.trim().is_empty() {
            return Err(anyhow!("machine.media_extension must not be empty"));
        }
        if self.bridge.program.trim().is_empty() {
            return Err(anyhow!("bridge.program must not be empty"));
        }
        if self.disk.tool.trim().is_empty() {
            return Err(anyhow!("disk.tool must not be empty"));
        }
        for (name, value) in [
            ("supervisor.emulator_grace_ms", self.supervisor.emulator_grace_ms),
            ("supervisor.bridge_grace_ms", self.supervisor.bridge_grace_ms),
        ] {
            if value > MAX_GRACE_MS {
                return Err(anyhow!("{name} {value} exceeds {MAX_GRACE_MS}"));
            }
        }
        if self.supervisor.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(anyhow!(
                "supervisor.poll_interval_ms must be >= {MIN_POLL_INTERVAL_MS}"
            ));
        }
        Ok(())
    }
}

/// Fixed locations of the artefacts the prober inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Persistent disk image.
    pub disk_image: PathBuf,
    /// Directory scanned for removable media images.
    pub media_dir: PathBuf,
    /// Read-only firmware image.
    pub firmware_code: PathBuf,
    /// Web client served by the display bridge.
    pub web_assets: PathBuf,
}

impl Layout {
    /// Standard layout under `root`.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            disk_image: root.join("devices").join("disk").join("disk.qcow2"),
            media_dir: root.join("devices").join("rom"),
            firmware_code: root.join("boot").join("firmware").join("OVMF_CODE.fd"),
            web_assets: root.join("libraries").join("noVNC"),
        }
    }

    /// Writable variable store paired with the firmware image.
    #[must_use]
    pub fn firmware_vars(&self) -> PathBuf {
        match self.firmware_code.parent() {
            Some(dir) => dir.join(VARS_FILE_NAME),
            None => PathBuf::from(VARS_FILE_NAME),
        }
    }

    /// Directories created before probing.
    #[must_use]
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(4);
        for parent in [
            self.disk_image.parent(),
            Some(self.media_dir.as_path()),
            self.firmware_code.parent(),
            self.web_assets.parent(),
        ]
        .into_iter()
        .flatten()
        {
            if parent.as_os_str().is_empty() {
                continue;
            }
            let parent = parent.to_path_buf();
            if !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
        dirs
    }
}

/// Emulator invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Emulator executable.
    pub emulator: String,
    /// Logical CPU count.
    pub cpus: u32,
    /// Guest memory, in emulator syntax.
    pub memory: String,
    /// VNC display number used as the remote-display channel.
    pub display: u16,
    /// File extension identifying removable media images.
    pub media_extension: String,
}

impl MachineConfig {
    /// TCP port the remote-display channel listens on.
    #[must_use]
    pub fn vnc_port(&self) -> u16 {
        VNC_BASE_PORT.saturating_add(self.display)
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            emulator: "qemu-system-x86_64".to_owned(),
            cpus: 4,
            memory: "4G".to_owned(),
            display: 1,
            media_extension: "iso".to_owned(),
        }
    }
}

/// Display bridge invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Bridge executable.
    pub program: String,
    /// Local port the web client is served on.
    pub listen_port: u16,
    /// Host the emulator's remote-display channel is reachable at.
    pub upstream_host: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "websockify".to_owned(),
            listen_port: 8080,
            upstream_host: "localhost".to_owned(),
        }
    }
}

/// Disk auto-creation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskConfig {
    /// Disk image tool.
    pub tool: String,
    /// Image format selector.
    pub format: String,
    /// Virtual size of a new image.
    pub size: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            tool: "qemu-img".to_owned(),
            format: "qcow2".to_owned(),
            size: "20G".to_owned(),
        }
    }
}

/// Post-launch grace delays and shutdown polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Delay after launching the emulator.
    pub emulator_grace_ms: u64,
    /// Delay after launching the bridge.
    pub bridge_grace_ms: u64,
    /// Interval between shutdown flag checks while running.
    pub poll_interval_ms: u64,
}

impl SupervisorConfig {
    /// Emulator grace delay.
    #[must_use]
    pub fn emulator_grace(&self) -> Duration {
        Duration::from_millis(self.emulator_grace_ms)
    }

    /// Bridge grace delay.
    #[must_use]
    pub fn bridge_grace(&self) -> Duration {
        Duration::from_millis(self.bridge_grace_ms)
    }

    /// Shutdown poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            emulator_grace_ms: 3_000,
            bridge_grace_ms: 2_000,
            poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    layout: LayoutToml,
    #[serde(default)]
    machine: MachineToml,
    #[serde(default)]
    bridge: BridgeToml,
    #[serde(default)]
    disk: DiskToml,
    #[serde(default)]
    supervisor: SupervisorToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutToml {
    disk_image: Option<PathBuf>,
    media_dir: Option<PathBuf>,
    firmware_code: Option<PathBuf>,
    web_assets: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MachineToml {
    emulator: Option<String>,
    cpus: Option<u32>,
    memory: Option<String>,
    display: Option<u16>,
    media_extension: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BridgeToml {
    program: Option<String>,
    listen_port: Option<u16>,
    upstream_host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DiskToml {
    tool: Option<String>,
    format: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SupervisorToml {
    emulator_grace_ms: Option<u64>,
    bridge_grace_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Parse a TOML document, overlaying it on the built-in defaults.
pub fn parse_config(text: &str) -> Result<ComputerConfig> {
    let raw: ConfigToml = toml::from_str(text).context("invalid computer config TOML")?;
    let mut config = ComputerConfig::default();

    apply(&mut config.layout.disk_image, raw.layout.disk_image);
    apply(&mut config.layout.media_dir, raw.layout.media_dir);
    apply(&mut config.layout.firmware_code, raw.layout.firmware_code);
    apply(&mut config.layout.web_assets, raw.layout.web_assets);

    apply(&mut config.machine.emulator, raw.machine.emulator);
    apply(&mut config.machine.cpus, raw.machine.cpus);
    apply(&mut config.machine.memory, raw.machine.memory);
    apply(&mut config.machine.display, raw.machine.display);
    apply(&mut config.machine.media_extension, raw.machine.media_extension);

    apply(&mut config.bridge.program, raw.bridge.program);
    apply(&mut config.bridge.listen_port, raw.bridge.listen_port);
    apply(&mut config.bridge.upstream_host, raw.bridge.upstream_host);

    apply(&mut config.disk.tool, raw.disk.tool);
    apply(&mut config.disk.format, raw.disk.format);
    apply(&mut config.disk.size, raw.disk.size);

    apply(
        &mut config.supervisor.emulator_grace_ms,
        raw.supervisor.emulator_grace_ms,
    );
    apply(
        &mut config.supervisor.bridge_grace_ms,
        raw.supervisor.bridge_grace_ms,
    );
    apply(
        &mut config.supervisor.poll_interval_ms,
        raw.supervisor.poll_interval_ms,
    );

    config.validate()?;
    Ok(config)
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<ComputerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("failed to load config {}", path.display()))
}

/// Resolve the active configuration from `COMPUTER_CONFIG`, falling back to defaults.
pub fn resolve_config() -> Result<ComputerConfig> {
    match env::var(CONFIG_ENV) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(ComputerConfig::default())
            } else {
                load_config(Path::new(trimmed))
            }
        }
        Err(env::VarError::NotPresent) => Ok(ComputerConfig::default()),
        Err(err) => Err(anyhow!("failed to read {CONFIG_ENV}: {err}")),
    }
}
