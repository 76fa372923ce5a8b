//! Shared run state for the background loops.
//!
//! The agent owns one [`AgentContext`]; every loop holds an `Arc` to it and
//! waits on a [`Ticker`] instead of sleeping, so a shutdown request ends the
//! wait immediately. Work already started in an iteration always finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

#[derive(Debug)]
pub struct AgentContext {
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for AgentContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentContext {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            running: AtomicBool::new(true),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask every loop to exit before its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
    }

    /// Future-based view of the shutdown request
    pub fn shutdown(&self) -> Shutdown {
        Shutdown {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Interval ticker that stops yielding once shutdown is requested.
    /// The first tick completes immediately.
    pub fn ticker(self: &Arc<Self>, period: Duration) -> Ticker {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ticker {
            ctx: Arc::clone(self),
            interval,
            shutdown: self.shutdown(),
        }
    }
}

/// Resolves once shutdown has been requested
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Context dropped
                return;
            }
        }
    }
}

pub struct Ticker {
    ctx: Arc<AgentContext>,
    interval: Interval,
    shutdown: Shutdown,
}

impl Ticker {
    /// Wait for the next iteration. Returns `false` when the loop should exit.
    pub async fn tick(&mut self) -> bool {
        if !self.ctx.is_running() {
            return false;
        }

        tokio::select! {
            _ = self.interval.tick() => self.ctx.is_running(),
            _ = self.shutdown.requested() => false,
        }
    }
}
