//! Periodic sweep that force-closes idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::registry::SessionRegistry;

pub struct InactivityReaper {
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
}

impl InactivityReaper {
    pub fn new(registry: Arc<SessionRegistry>, idle_timeout: Duration, interval: Duration) -> Self {
        Self {
            registry,
            idle_timeout,
            interval,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Force-close every session idle for longer than the threshold.
    /// Returns how many were closed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut reaped = 0;

        for session in self.registry.list_active() {
            let idle = now.saturating_duration_since(session.last_activity());
            if idle > self.idle_timeout {
                info!(
                    session_id = %session.id(),
                    "Closing session idle for {}s",
                    idle.as_secs()
                );
                session.force_close_session();
                reaped += 1;
            }
        }

        if reaped > 0 {
            info!("Reaper closed {} idle session(s)", reaped);
        } else {
            debug!("Reaper sweep found no idle sessions");
        }
        reaped
    }

    /// Sweep every `interval` until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        info!(
            "Starting inactivity reaper (idle timeout {:?}, interval {:?})",
            self.idle_timeout, self.interval
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Inactivity reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }
}
