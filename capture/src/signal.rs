// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! The shared stop flag and its SIGINT wiring.
//!
//! The flag is process-global because a signal handler cannot close over
//! instance state; everything else about shutdown flows through the rings.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static STOP: AtomicBool = AtomicBool::new(false);

pub fn stop_requested() -> bool {
    STOP.load(Ordering::Relaxed)
}

pub fn request_stop() {
    STOP.store(true, Ordering::Relaxed);
}

extern "C" fn on_sigint(_signum: libc::c_int) {
    // Only an async-signal-safe atomic store.
    STOP.store(true, Ordering::Relaxed);
}

/// Installed SIGINT disposition, restored on drop.
///
/// The handler is oneshot (`SA_RESETHAND`): the first Ctrl-C requests a clean
/// drain, a second one gets the default disposition and kills the process.
pub struct SigintGuard {
    previous: SigAction,
}

impl SigintGuard {
    pub fn install() -> Result<SigintGuard, Errno> {
        let action = SigAction::new(
            SigHandler::Handler(on_sigint),
            SaFlags::SA_RESETHAND | SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler performs a single atomic store.
        let previous = unsafe { sigaction(Signal::SIGINT, &action) }?;
        Ok(SigintGuard { previous })
    }
}

impl Drop for SigintGuard {
    fn drop(&mut self) {
        // SAFETY: restores the disposition captured at install time.
        if let Err(errno) = unsafe { sigaction(Signal::SIGINT, &self.previous) } {
            tracing::error!("failed to restore SIGINT disposition: {errno}");
        }
    }
}
