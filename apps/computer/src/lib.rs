// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose the computer VM launcher building blocks.
// Author: Lukas Bower
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Launch a QEMU virtual machine and, in bridged mode, a websockify/noVNC
//! bridge in front of its VNC console. Both children are supervised as a
//! pair and always torn down together, bridge first.

/// Emulator and bridge argument assembly.
pub mod command;
/// Configuration and on-disk layout.
pub mod config;
/// Default disk image creation.
pub mod disk;
/// Boot error taxonomy.
pub mod error;
/// Boot policy.
pub mod policy;
/// Filesystem and tool probing.
pub mod probe;
/// Boot sequencing.
pub mod session;
/// Signal-driven shutdown flag.
pub mod signals;
/// Child process supervision.
pub mod supervisor;

pub use command::{CommandBuilder, CommandSpec};
pub use config::{resolve_config, ComputerConfig};
pub use error::ComputerError;
pub use policy::{decide, BootDecision, BootSource, DisplayMode};
pub use probe::ProbeResult;
pub use session::{Orchestrator, SessionPhase};
pub use signals::{install_signal_handlers, ShutdownToken};
pub use supervisor::{Role, Session, Supervisor, Termination};
