// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Shared fixtures for computer launcher integration tests.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use computer::config::{ComputerConfig, SupervisorConfig};
use tempfile::TempDir;

/// Temporary VM root with a launcher configuration pointing into it.
pub struct Fixture {
    pub dir: TempDir,
    pub config: ComputerConfig,
}

impl Fixture {
    /// Empty layout; bridge and disk tool point at scripts that do not exist yet.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = ComputerConfig::rooted_at(dir.path());
        config.machine.emulator = dir.path().join("bin/emulator").display().to_string();
        config.bridge.program = dir.path().join("bin/bridge").display().to_string();
        config.disk.tool = dir.path().join("bin/disk-tool").display().to_string();
        config.supervisor = SupervisorConfig {
            emulator_grace_ms: 50,
            bridge_grace_ms: 50,
            poll_interval_ms: 10,
        };
        fs::create_dir_all(dir.path().join("bin")).expect("bin dir");
        for layout_dir in config.layout.directories() {
            fs::create_dir_all(layout_dir).expect("layout dir");
        }
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn with_firmware(self) -> Self {
        fs::write(&self.config.layout.firmware_code, b"firmware").expect("firmware");
        self
    }

    pub fn with_disk(self) -> Self {
        fs::write(&self.config.layout.disk_image, b"disk").expect("disk");
        self
    }

    pub fn with_media(self, name: &str) -> Self {
        fs::write(self.config.layout.media_dir.join(name), b"media").expect("media");
        self
    }

    pub fn with_web_assets(self) -> Self {
        fs::create_dir_all(&self.config.layout.web_assets).expect("web assets");
        self
    }

    /// Emulator stand-in that records its arguments and stays alive.
    pub fn with_emulator(self) -> Self {
        let script = recording_script(&self.args_file("emulator"));
        write_script(Path::new(&self.config.machine.emulator), &script);
        self
    }

    /// Bridge stand-in that records its arguments and stays alive.
    pub fn with_bridge(self) -> Self {
        let script = recording_script(&self.args_file("bridge"));
        write_script(Path::new(&self.config.bridge.program), &script);
        self
    }

    /// Bridge that the prober finds but that cannot be executed.
    pub fn with_broken_bridge(self) -> Self {
        write_script(
            Path::new(&self.config.bridge.program),
            "#!/nonexistent/interpreter\n",
        );
        self
    }

    /// Disk tool that creates its final argument.
    pub fn with_working_disk_tool(self) -> Self {
        write_script(
            Path::new(&self.config.disk.tool),
            "#!/bin/sh\nfor last; do :; done\n: > \"$last\"\n",
        );
        self
    }

    /// Disk tool that always fails.
    pub fn with_failing_disk_tool(self) -> Self {
        write_script(
            Path::new(&self.config.disk.tool),
            "#!/bin/sh\necho 'disk tool unavailable' >&2\nexit 1\n",
        );
        self
    }

    pub fn args_file(&self, role: &str) -> PathBuf {
        self.root().join(format!("{role}.args"))
    }
}

fn recording_script(args_file: &Path) -> String {
    format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\nexec sleep 30\n",
        args_file.display()
    )
}

/// Write an executable script.
pub fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    }
}

/// Wait for a recorded argument file and return its lines.
pub fn wait_for_args(path: &Path) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(text) = fs::read_to_string(path) {
            if !text.is_empty() {
                return text.lines().map(str::to_owned).collect();
            }
        }
        assert!(
            Instant::now() < deadline,
            "{} was never written",
            path.display()
        );
        thread::sleep(Duration::from_millis(20));
    }
}

/// Index of the first token equal to `needle`.
pub fn position(tokens: &[String], needle: &str) -> usize {
    tokens
        .iter()
        .position(|token| token == needle)
        .unwrap_or_else(|| panic!("token {needle} missing from {tokens:?}"))
}
