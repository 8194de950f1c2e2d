// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Sequence probing, policy, command building and supervision for one VM session.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fmt;
use std::thread;

use log::{debug, info, warn};

use crate::command::CommandBuilder;
use crate::config::ComputerConfig;
use crate::disk::{provision_disk, DiskTool};
use crate::error::ComputerError;
use crate::policy::{decide, DisplayMode};
use crate::probe::{ensure_layout, probe};
use crate::signals::ShutdownToken;
use crate::supervisor::{Role, Session, Supervisor, Termination};

/// Orchestrator lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing attempted yet.
    Idle,
    /// Creating directories, probing, provisioning the disk.
    Preparing,
    /// Evaluating the boot policy.
    Deciding,
    /// Assembling the emulator command.
    Building,
    /// Launching the emulator.
    StartingEmulator,
    /// Launching the display bridge.
    StartingBridge,
    /// Children running; waiting for shutdown.
    Running,
    /// Tearing the children down.
    ShuttingDown,
    /// Finished, successfully or not.
    Terminated,
}

impl SessionPhase {
    /// Whether `next` is a legal successor of this phase.
    #[must_use]
    pub fn allows(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Deciding)
                | (Deciding, Building)
                | (Deciding, Terminated)
                | (Building, StartingEmulator)
                | (Building, Terminated)
                | (StartingEmulator, StartingBridge)
                | (StartingEmulator, Running)
                | (StartingEmulator, Terminated)
                | (StartingBridge, Running)
                | (StartingBridge, Terminated)
                | (Running, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Preparing => "preparing",
            SessionPhase::Deciding => "deciding",
            SessionPhase::Building => "building",
            SessionPhase::StartingEmulator => "starting-emulator",
            SessionPhase::StartingBridge => "starting-bridge",
            SessionPhase::Running => "running",
            SessionPhase::ShuttingDown => "shutting-down",
            SessionPhase::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Drives one boot attempt from probe to running children.
#[derive(Debug)]
pub struct Orchestrator {
    config: ComputerConfig,
    display: DisplayMode,
    supervisor: Supervisor,
    phase: SessionPhase,
    rolled_back: Vec<Termination>,
}

impl Orchestrator {
    /// Orchestrator for `config` using the requested display mode.
    #[must_use]
    pub fn new(config: ComputerConfig, display: DisplayMode) -> Self {
        let supervisor = Supervisor::new(config.supervisor);
        Self {
            config,
            display,
            supervisor,
            phase: SessionPhase::Idle,
            rolled_back: Vec::new(),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Children reaped while rolling back a failed boot.
    #[must_use]
    pub fn rolled_back(&self) -> &[Termination] {
        &self.rolled_back
    }

    fn enter(&mut self, next: SessionPhase) {
        debug_assert!(
            self.phase.allows(next),
            "illegal session transition {} -> {}",
            self.phase,
            next
        );
        debug!("phase {} -> {}", self.phase, next);
        self.phase = next;
    }

    fn fail(&mut self, err: ComputerError) -> ComputerError {
        self.enter(SessionPhase::Terminated);
        err
    }

    fn roll_back(&mut self, session: &mut Session, err: ComputerError) -> ComputerError {
        warn!("boot failed; stopping started processes");
        self.rolled_back = self.supervisor.terminate_all(session);
        self.enter(SessionPhase::Terminated);
        err
    }

    /// Boot the machine. On success the returned session holds the running
    /// children; on failure nothing is left running.
    pub fn boot(&mut self) -> Result<Session, ComputerError> {
        self.enter(SessionPhase::Preparing);
        info!("Booting computer..");
        ensure_layout(&self.config.layout);
        let probed = probe(&self.config);
        let probed = provision_disk(&DiskTool::new(&self.config.disk), probed);

        self.enter(SessionPhase::Deciding);
        let decision = match decide(&probed, self.display).into_result() {
            Ok(decision) => decision,
            Err(err) => return Err(self.fail(err)),
        };
        info!("{}", decision.source().describe());

        self.enter(SessionPhase::Building);
        let (emulator_spec, bridge_spec) = {
            let builder = CommandBuilder::new(&self.config);
            let emulator = builder.build(&probed, &decision);
            let bridge = decision
                .display()
                .is_bridged()
                .then(|| builder.bridge(&probed));
            (emulator, bridge)
        };
        let emulator_spec = match emulator_spec {
            Ok(spec) => spec,
            Err(err) => return Err(self.fail(err)),
        };

        self.enter(SessionPhase::StartingEmulator);
        let mut session = Session::new(decision);
        let emulator = match self.supervisor.launch(&emulator_spec, Role::Emulator) {
            Ok(process) => process,
            Err(err) => return Err(self.fail(err)),
        };
        if let Err(err) = self.supervisor.adopt(&mut session, emulator) {
            return Err(self.roll_back(&mut session, err));
        }
        self.supervisor.await_ready(&mut session, Role::Emulator);

        if let Some(bridge_spec) = bridge_spec {
            self.enter(SessionPhase::StartingBridge);
            let bridge = match self.supervisor.launch(&bridge_spec, Role::Bridge) {
                Ok(process) => process,
                Err(err) => return Err(self.roll_back(&mut session, err)),
            };
            if let Err(err) = self.supervisor.adopt(&mut session, bridge) {
                return Err(self.roll_back(&mut session, err));
            }
            self.supervisor.await_ready(&mut session, Role::Bridge);
            let port = self.config.bridge.listen_port;
            info!(
                "Port {port} for machine opened! Go to http://localhost:{port}/vnc.html?resize=remote&autoconnect=true"
            );
        } else {
            info!("Machine started in full-screen mode!");
        }

        self.enter(SessionPhase::Running);
        Ok(session)
    }

    /// Block until `token` is requested, then tear the session down.
    pub fn run_until_shutdown(
        &mut self,
        session: &mut Session,
        token: &ShutdownToken,
    ) -> Vec<Termination> {
        let interval = self.config.supervisor.poll_interval();
        while !token.is_requested() {
            thread::sleep(interval);
        }
        self.shutdown(session)
    }

    /// Tear the session down, bridge first. Outside `Running` this only
    /// reaps whatever the session still holds.
    pub fn shutdown(&mut self, session: &mut Session) -> Vec<Termination> {
        if self.phase != SessionPhase::Running {
            return self.supervisor.terminate_all(session);
        }
        info!("Shutting down gracefully...");
        self.enter(SessionPhase::ShuttingDown);
        let reaped = self.supervisor.terminate_all(session);
        self.enter(SessionPhase::Terminated);
        reaped
    }
}
