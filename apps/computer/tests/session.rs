// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate end-to-end boot sequencing, rollback and shutdown.
// Author: Lukas Bower
#![cfg(unix)]
#![deny(unsafe_code)]

mod support;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use computer::error::Dependency;
use computer::{
    install_signal_handlers, BootSource, ComputerError, DisplayMode, Orchestrator, Role,
    SessionPhase, ShutdownToken,
};
use serial_test::serial;
use support::{position, wait_for_args, Fixture};

#[test]
#[serial]
fn no_boot_source_launches_nothing() {
    let fixture = Fixture::new().with_emulator().with_failing_disk_tool();
    let mut orchestrator = Orchestrator::new(fixture.config.clone(), DisplayMode::DirectFullscreen);

    let err = orchestrator.boot().unwrap_err();
    assert!(matches!(err, ComputerError::Unbootable));
    assert_eq!(orchestrator.phase(), SessionPhase::Terminated);
    assert!(orchestrator.rolled_back().is_empty());
    thread::sleep(Duration::from_millis(100));
    assert!(!fixture.args_file("emulator").exists());
    assert!(!fixture.config.layout.disk_image.exists());
}

#[test]
#[serial]
fn failed_disk_creation_falls_back_to_media() -> Result<()> {
    let fixture = Fixture::new()
        .with_media("installer.iso")
        .with_emulator()
        .with_failing_disk_tool();
    let mut orchestrator = Orchestrator::new(fixture.config.clone(), DisplayMode::DirectFullscreen);

    let mut session = orchestrator.boot()?;
    assert_eq!(session.decision().source(), BootSource::MediaOnly);
    let tokens = wait_for_args(&fixture.args_file("emulator"));
    assert!(tokens.iter().all(|token| !token.contains("if=virtio")));
    position(&tokens, "-cdrom");

    orchestrator.shutdown(&mut session);
    assert!(session.is_empty());
    Ok(())
}

#[test]
#[serial]
fn created_disk_is_attached_in_direct_mode() -> Result<()> {
    let fixture = Fixture::new().with_emulator().with_working_disk_tool();
    let mut orchestrator = Orchestrator::new(fixture.config.clone(), DisplayMode::DirectFullscreen);

    let mut session = orchestrator.boot()?;
    assert_eq!(orchestrator.phase(), SessionPhase::Running);
    assert_eq!(session.decision().source(), BootSource::DiskOnly);
    assert!(fixture.config.layout.disk_image.exists());
    assert!(session.bridge_pid().is_none());

    let tokens = wait_for_args(&fixture.args_file("emulator"));
    position(
        &tokens,
        &format!(
            "file={},format=qcow2,if=virtio",
            fixture.config.layout.disk_image.display()
        ),
    );
    position(&tokens, "gtk,full-screen=on");

    let reaped = orchestrator.shutdown(&mut session);
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].role, Role::Emulator);
    assert_eq!(orchestrator.phase(), SessionPhase::Terminated);
    Ok(())
}

#[test]
#[serial]
fn bridge_launch_failure_rolls_back_emulator() {
    let fixture = Fixture::new()
        .with_disk()
        .with_web_assets()
        .with_emulator()
        .with_broken_bridge();
    let mut orchestrator = Orchestrator::new(fixture.config.clone(), DisplayMode::Bridged);

    let err = orchestrator.boot().unwrap_err();
    assert!(matches!(
        err,
        ComputerError::Launch {
            role: Role::Bridge,
            ..
        }
    ));
    assert_eq!(orchestrator.phase(), SessionPhase::Terminated);
    let rolled_back = orchestrator.rolled_back();
    assert_eq!(rolled_back.len(), 1);
    assert_eq!(rolled_back[0].role, Role::Emulator);
    assert!(rolled_back[0].status.is_some());
}

#[test]
#[serial]
fn missing_bridge_assets_stop_before_launch() {
    let fixture = Fixture::new().with_disk().with_emulator().with_bridge();
    let mut orchestrator = Orchestrator::new(fixture.config.clone(), DisplayMode::Bridged);

    let err = orchestrator.boot().unwrap_err();
    assert!(matches!(
        err,
        ComputerError::MissingDependency {
            dependency: Dependency::WebAssets
        }
    ));
    thread::sleep(Duration::from_millis(100));
    assert!(!fixture.args_file("emulator").exists());
}

#[test]
#[serial]
fn bridged_session_runs_until_shutdown_requested() -> Result<()> {
    let fixture = Fixture::new()
        .with_firmware()
        .with_disk()
        .with_media("installer.iso")
        .with_web_assets()
        .with_emulator()
        .with_bridge();
    let mut orchestrator = Orchestrator::new(fixture.config.clone(), DisplayMode::Bridged);

    let mut session = orchestrator.boot()?;
    assert_eq!(orchestrator.phase(), SessionPhase::Running);
    assert_eq!(session.decision().source(), BootSource::MediaWithDisk);
    let emulator_pid = session.emulator_pid().expect("emulator running");
    let bridge_pid = session.bridge_pid().expect("bridge running");

    let bridge_args = wait_for_args(&fixture.args_file("bridge"));
    assert_eq!(
        bridge_args,
        vec![
            format!("--web={}", fixture.config.layout.web_assets.display()),
            "8080".to_owned(),
            "localhost:5901".to_owned(),
        ]
    );
    let emulator_args = wait_for_args(&fixture.args_file("emulator"));
    position(&emulator_args, "none");
    position(&emulator_args, ":1");

    let token = ShutdownToken::new();
    let trigger = token.clone();
    let requester = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        trigger.request();
    });
    let reaped = orchestrator.run_until_shutdown(&mut session, &token);
    requester.join().expect("requester thread");

    let order: Vec<(Role, u32)> = reaped.iter().map(|t| (t.role, t.pid)).collect();
    assert_eq!(
        order,
        vec![(Role::Bridge, bridge_pid), (Role::Emulator, emulator_pid)]
    );
    assert!(session.is_empty());
    assert_eq!(orchestrator.phase(), SessionPhase::Terminated);
    Ok(())
}

#[test]
#[serial]
#[allow(unsafe_code)]
fn sigterm_tears_down_running_session() -> Result<()> {
    let fixture = Fixture::new()
        .with_disk()
        .with_web_assets()
        .with_emulator()
        .with_bridge();
    let token = ShutdownToken::new();
    install_signal_handlers(&token)?;
    let mut orchestrator = Orchestrator::new(fixture.config.clone(), DisplayMode::Bridged);

    let mut session = orchestrator.boot()?;
    let emulator_pid = session.emulator_pid().expect("emulator running");
    let bridge_pid = session.bridge_pid().expect("bridge running");
    assert!(!token.is_requested());

    // SAFETY: raise(3) delivers SIGTERM to this process; the installed handler only sets a flag.
    assert_eq!(unsafe { libc::raise(libc::SIGTERM) }, 0);
    assert!(token.is_requested());

    let reaped = orchestrator.run_until_shutdown(&mut session, &token);
    let order: Vec<(Role, u32)> = reaped.iter().map(|t| (t.role, t.pid)).collect();
    assert_eq!(
        order,
        vec![(Role::Bridge, bridge_pid), (Role::Emulator, emulator_pid)]
    );
    assert!(session.is_empty());
    assert_eq!(orchestrator.phase(), SessionPhase::Terminated);
    Ok(())
}
