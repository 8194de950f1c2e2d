// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decide whether and how the virtual machine can boot from probe results.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fmt;

use crate::error::{ComputerError, Dependency};
use crate::probe::ProbeResult;

/// How the guest console is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Headless emulator with the console served through the web bridge.
    Bridged,
    /// Local full-screen window, no bridge.
    DirectFullscreen,
}

impl DisplayMode {
    /// Map the user's bridge preference onto a display mode.
    #[must_use]
    pub fn from_preference(want_bridge: bool) -> Self {
        if want_bridge {
            DisplayMode::Bridged
        } else {
            DisplayMode::DirectFullscreen
        }
    }

    /// Whether this mode needs the display bridge.
    #[must_use]
    pub fn is_bridged(self) -> bool {
        matches!(self, DisplayMode::Bridged)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Bridged => f.write_str("bridged"),
            DisplayMode::DirectFullscreen => f.write_str("direct-fullscreen"),
        }
    }
}

/// Which bootable devices are available. Descriptive only; the emulator
/// receives every available device and applies its own boot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSource {
    /// Persistent disk, no removable media.
    DiskOnly,
    /// Removable media without a disk image.
    MediaOnly,
    /// Removable media with a disk image to install onto.
    MediaWithDisk,
    /// Nothing bootable.
    None,
}

impl BootSource {
    fn classify(probe: &ProbeResult) -> Self {
        match (probe.media_path.is_some(), probe.disk_present) {
            (true, true) => BootSource::MediaWithDisk,
            (true, false) => BootSource::MediaOnly,
            (false, true) => BootSource::DiskOnly,
            (false, false) => BootSource::None,
        }
    }

    /// Human-readable status line for this source.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            BootSource::MediaWithDisk => "Booting from ISO with disk available!",
            BootSource::MediaOnly => "Booting from ISO only!",
            BootSource::DiskOnly => "There's no ISO in the media directory, booting from disk!",
            BootSource::None => "No boot source available",
        }
    }
}

impl fmt::Display for BootSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootSource::DiskOnly => f.write_str("disk-only"),
            BootSource::MediaOnly => f.write_str("media-only"),
            BootSource::MediaWithDisk => f.write_str("media-with-disk"),
            BootSource::None => f.write_str("none"),
        }
    }
}

/// Reason a boot attempt must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootBlocker {
    /// No disk and no removable media.
    NoBootSource,
    /// Bridged display requested without its delivery chain.
    Missing(Dependency),
}

/// Outcome of the boot policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootDecision {
    source: BootSource,
    display: DisplayMode,
    blocker: Option<BootBlocker>,
}

impl BootDecision {
    /// Whether the session may proceed to building and launching.
    #[must_use]
    pub fn bootable(&self) -> bool {
        self.blocker.is_none()
    }

    /// Boot source classification.
    #[must_use]
    pub fn source(&self) -> BootSource {
        self.source
    }

    /// Selected display mode.
    #[must_use]
    pub fn display(&self) -> DisplayMode {
        self.display
    }

    /// Why the decision is not bootable, if it is not.
    #[must_use]
    pub fn blocker(&self) -> Option<BootBlocker> {
        self.blocker
    }

    /// Convert a non-bootable decision into its terminal error.
    pub fn into_result(self) -> Result<Self, ComputerError> {
        match self.blocker {
            None => Ok(self),
            Some(BootBlocker::NoBootSource) => Err(ComputerError::Unbootable),
            Some(BootBlocker::Missing(dependency)) => {
                Err(ComputerError::MissingDependency { dependency })
            }
        }
    }
}

/// Evaluate the boot rules against a probe snapshot.
///
/// The probe must already reflect any disk auto-creation. Bridged mode never
/// downgrades to direct mode when its dependencies are missing.
#[must_use]
pub fn decide(probe: &ProbeResult, display: DisplayMode) -> BootDecision {
    let source = BootSource::classify(probe);
    let blocker = if source == BootSource::None {
        Some(BootBlocker::NoBootSource)
    } else if display.is_bridged() && !probe.web_assets_present {
        Some(BootBlocker::Missing(Dependency::WebAssets))
    } else if display.is_bridged() && !probe.bridge_executable_present() {
        Some(BootBlocker::Missing(Dependency::BridgeExecutable))
    } else {
        None
    };
    BootDecision {
        source,
        display,
        blocker,
    }
}
