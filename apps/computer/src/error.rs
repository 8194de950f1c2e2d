// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the terminal boot error taxonomy for the computer launcher.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::supervisor::Role;

/// External artefacts that bridged display mode cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Static web client served by the bridge.
    WebAssets,
    /// The bridge executable itself.
    BridgeExecutable,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::WebAssets => f.write_str("web assets"),
            Dependency::BridgeExecutable => f.write_str("bridge executable"),
        }
    }
}

/// Errors that end a boot attempt before the session reaches `Running`.
#[derive(Debug, Error)]
pub enum ComputerError {
    /// Neither a disk image nor removable media is available.
    #[error("no disk or ISO available")]
    Unbootable,
    /// Bridged display was requested but its delivery chain is incomplete.
    #[error("required {dependency} not found for bridged display mode")]
    MissingDependency {
        /// The missing artefact.
        dependency: Dependency,
    },
    /// The child process could not be created.
    #[error("failed to launch {role}: {source}")]
    Launch {
        /// Role of the process that failed to start.
        role: Role,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// A bridge was offered to a session without a live emulator.
    #[error("display bridge cannot start without a running emulator")]
    BridgeWithoutEmulator,
    /// The firmware variable store could not be materialised.
    #[error("failed to create firmware variable store {}: {source}", .path.display())]
    VarsStore {
        /// Store location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The disk tool did not produce a disk image.
    #[error("failed to create disk image {}: {reason}", .path.display())]
    DiskCreate {
        /// Target image path.
        path: PathBuf,
        /// Tool failure description.
        reason: String,
    },
}
