//! Cooperative start/stop control for the single active consumer
//!
//! The controller is the only state shared between the HTTP handlers and the
//! consumer loop. It is a single atomic word; handlers call [`RunController::try_start`]
//! and [`RunController::stop`], the loop polls [`RunController::is_running`] at
//! the top of every iteration and calls [`RunController::finish`] on exit.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

/// Snapshot of the controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No loop is active
    Idle,
    /// A loop is active and should keep going
    Running,
    /// A stop was requested and the loop has not exited yet
    Stopping,
}

impl RunState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            RUNNING => Self::Running,
            STOPPING => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunController {
    state: AtomicU8,
    stop_requested: Notify,
    exited: Notify,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to run a consumer loop.
    ///
    /// Returns `false` when a loop is running or still winding down; the
    /// caller must reject the start request instead of launching a loop.
    pub fn try_start(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Ask the running loop to exit. Returns whether a loop was running.
    pub fn stop(&self) -> bool {
        let was_running = self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if was_running {
            self.stop_requested.notify_waiters();
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    pub fn state(&self) -> RunState {
        RunState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Mark the loop as exited, whatever the reason.
    pub fn finish(&self) {
        self.state.store(IDLE, Ordering::Release);
        self.exited.notify_waiters();
    }

    /// Wait up to `limit` for the loop to call [`RunController::finish`].
    ///
    /// Returns `true` once the controller is idle, `false` on timeout.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let exited = self.exited.notified();
            tokio::pin!(exited);
            exited.as_mut().enable();
            if self.state() == RunState::Idle {
                return true;
            }
            if tokio::time::timeout_at(deadline, exited).await.is_err() {
                return self.state() == RunState::Idle;
            }
        }
    }

    /// Sleep for `interval`, returning early if a stop is requested meanwhile.
    pub async fn pause(&self, interval: Duration) {
        let stopped = self.stop_requested.notified();
        tokio::pin!(stopped);
        // Register before re-checking so a concurrent stop() cannot slip between.
        stopped.as_mut().enable();
        if !self.is_running() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = stopped => {}
        }
    }
}

/// Resets the controller to idle when dropped, including on panic.
pub struct FinishGuard<'a> {
    controller: &'a RunController,
}

impl<'a> FinishGuard<'a> {
    pub fn new(controller: &'a RunController) -> Self {
        Self { controller }
    }
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.controller.finish();
    }
}
