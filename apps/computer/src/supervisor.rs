// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Own the emulator and display bridge child processes and tear them down together.
// Author: Lukas Bower
#![deny(unsafe_code)]

//! Two-process supervision.
//!
//! The [`Supervisor`] is the only writer of a [`Session`]'s process slots.
//! Readiness is a fixed grace delay after each launch; a child that is slow
//! to bind its endpoint is indistinguishable from one that is ready.

use std::fmt;
use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use log::{debug, info, warn};

use crate::command::CommandSpec;
use crate::config::SupervisorConfig;
use crate::error::ComputerError;
use crate::policy::BootDecision;

/// Logical role of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Hardware emulator.
    Emulator,
    /// Remote-display web bridge.
    Bridge,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Emulator => f.write_str("emulator"),
            Role::Bridge => f.write_str("display bridge"),
        }
    }
}

/// A running child process and its role.
#[derive(Debug)]
pub struct SupervisedProcess {
    role: Role,
    pid: u32,
    child: Child,
}

impl SupervisedProcess {
    /// Role of this process.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Operating system process identifier.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Record of one child being stopped and reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    /// Role of the reaped child.
    pub role: Role,
    /// Its process identifier.
    pub pid: u32,
    /// Exit status, when the wait succeeded.
    pub status: Option<ExitStatus>,
}

/// Processes started for one boot attempt.
///
/// A bridge is only ever present alongside an emulator.
#[derive(Debug)]
pub struct Session {
    decision: BootDecision,
    emulator: Option<SupervisedProcess>,
    bridge: Option<SupervisedProcess>,
}

impl Session {
    /// Empty session for a bootable decision.
    #[must_use]
    pub fn new(decision: BootDecision) -> Self {
        Self {
            decision,
            emulator: None,
            bridge: None,
        }
    }

    /// Decision that produced this session.
    #[must_use]
    pub fn decision(&self) -> &BootDecision {
        &self.decision
    }

    /// Emulator pid, if it is held.
    #[must_use]
    pub fn emulator_pid(&self) -> Option<u32> {
        self.emulator.as_ref().map(SupervisedProcess::pid)
    }

    /// Bridge pid, if it is held.
    #[must_use]
    pub fn bridge_pid(&self) -> Option<u32> {
        self.bridge.as_ref().map(SupervisedProcess::pid)
    }

    /// Number of processes held.
    #[must_use]
    pub fn live_count(&self) -> usize {
        usize::from(self.emulator.is_some()) + usize::from(self.bridge.is_some())
    }

    /// Whether no process is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<SupervisedProcess> {
        match role {
            Role::Emulator => &mut self.emulator,
            Role::Bridge => &mut self.bridge,
        }
    }
}

/// Starts, waits on and stops the session's children.
#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    /// Supervisor using the configured grace delays.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Spawn `spec` as an independent child. Only creation failure is an error;
    /// the child's own exit status is not inspected here.
    pub fn launch(
        &self,
        spec: &CommandSpec,
        role: Role,
    ) -> Result<SupervisedProcess, ComputerError> {
        info!("Starting {role}...");
        debug!("{role} command: {}", spec.command_line());
        let child = Command::new(spec.program())
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ComputerError::Launch { role, source })?;
        let pid = child.id();
        debug!("{role} started with pid {pid}");
        Ok(SupervisedProcess { role, pid, child })
    }

    /// Hand a launched process to the session.
    ///
    /// A bridge offered to a session without an emulator is stopped and rejected.
    pub fn adopt(
        &self,
        session: &mut Session,
        process: SupervisedProcess,
    ) -> Result<(), ComputerError> {
        if process.role == Role::Bridge && session.emulator.is_none() {
            terminate(process);
            return Err(ComputerError::BridgeWithoutEmulator);
        }
        let role = process.role;
        if let Some(previous) = session.slot_mut(role).replace(process) {
            warn!("replacing {role} pid {}", previous.pid);
            terminate(previous);
        }
        Ok(())
    }

    /// Block for the role's grace delay. This does not confirm the child's
    /// endpoint is listening; an early exit is only logged.
    pub fn await_ready(&self, session: &mut Session, role: Role) {
        let delay = match role {
            Role::Emulator => self.config.emulator_grace(),
            Role::Bridge => self.config.bridge_grace(),
        };
        debug!("waiting {} ms for {role}", delay.as_millis());
        thread::sleep(delay);
        if let Some(process) = session.slot_mut(role).as_mut() {
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    warn!("{role} (pid {}) exited during startup with {status}", process.pid);
                }
                Ok(None) => {}
                Err(err) => warn!("failed to query {role} (pid {}): {err}", process.pid),
            }
        }
    }

    /// Stop every held process, bridge first, and reap each one.
    ///
    /// A session with nothing held yields an empty list.
    pub fn terminate_all(&self, session: &mut Session) -> Vec<Termination> {
        let mut reaped = Vec::with_capacity(2);
        for role in [Role::Bridge, Role::Emulator] {
            if let Some(process) = session.slot_mut(role).take() {
                reaped.push(terminate(process));
            }
        }
        reaped
    }
}

fn terminate(process: SupervisedProcess) -> Termination {
    let SupervisedProcess {
        role,
        pid,
        mut child,
    } = process;
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("{role} (pid {pid}) already exited with {status}");
            return Termination {
                role,
                pid,
                status: Some(status),
            };
        }
        Ok(None) => {}
        Err(err) => warn!("failed to query {role} (pid {pid}): {err}"),
    }
    debug!("stopping {role} (pid {pid})");
    if let Err(err) = request_stop(&mut child) {
        warn!("failed to signal {role} (pid {pid}): {err}");
    }
    let status = match child.wait() {
        Ok(status) => {
            debug!("{role} (pid {pid}) reaped with {status}");
            Some(status)
        }
        Err(err) => {
            warn!("failed to reap {role} (pid {pid}): {err}");
            None
        }
    };
    Termination { role, pid, status }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn request_stop(child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions; the pid is our unreaped child.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> io::Result<()> {
    child.kill()
}
