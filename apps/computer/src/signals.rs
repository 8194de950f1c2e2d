// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Route interrupt and termination signals into a shutdown flag.
// Author: Lukas Bower
#![deny(unsafe_code)]

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static SIGNAL_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Shared shutdown request flag observed by the running session.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// Fresh, unrequested token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to shut down.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested by a caller or a signal.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Deliver SIGINT and SIGTERM to `token`.
///
/// Handlers can be installed once per process; a second call with a
/// different token fails with `AlreadyExists`.
pub fn install_signal_handlers(token: &ShutdownToken) -> io::Result<()> {
    let installed = SIGNAL_FLAG.get_or_init(|| Arc::clone(&token.flag));
    if !Arc::ptr_eq(installed, &token.flag) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "signal handlers already bound to another shutdown token",
        ));
    }
    register()
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn register() -> io::Result<()> {
    extern "C" fn handler(_signal: libc::c_int) {
        // Only an atomic store happens here.
        if let Some(flag) = SIGNAL_FLAG.get() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    let handler_ptr = handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only performs an atomic load and store.
        let previous = unsafe { libc::signal(signal, handler_ptr) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn register() -> io::Result<()> {
    Ok(())
}
