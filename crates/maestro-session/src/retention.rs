use crate::store::SessionStore;
use chrono::{Duration as ChronoDuration, Utc};
use maestro_core::MaestroResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Default retention age for terminal sessions.
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;
/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodic retention cleanup for the session store.
///
/// Constructed explicitly and owned by the caller; the background loop is
/// started and stopped through [`RetentionSweeper::start`] and
/// [`SweeperHandle::stop`] rather than an implicit global timer.
pub struct RetentionSweeper {
    store: Arc<dyn SessionStore>,
    max_age_hours: i64,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age_hours = hours;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Delete terminal sessions older than the retention age.
    /// Returns how many sessions were removed.
    pub async fn sweep(&self) -> MaestroResult<usize> {
        let cutoff = Utc::now() - ChronoDuration::hours(self.max_age_hours);
        let mut removed = 0;

        for id in self.store.list_ids().await? {
            let session = match self.store.get(id).await {
                Ok(Some(s)) => s,
                Ok(None) => continue,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Sweep: skipping unreadable session");
                    continue;
                }
            };
            if session.status.is_terminal() && session.updated_at < cutoff {
                self.store.delete(id).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Retention sweep removed terminal sessions");
        }
        Ok(removed)
    }

    /// Spawn the sweep loop. Returns a handle whose `stop()` shuts the loop
    /// down cooperatively.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so startup does not
            // race session creation in tests.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!(error = %e, "Retention sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Retention sweeper stopping");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

/// Handle to a running sweeper loop.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionStatus};
    use crate::store::MemorySessionStore;

    #[tokio::test]
    async fn test_sweep_removes_old_terminal_sessions() {
        let store = Arc::new(MemorySessionStore::new());

        let mut old_done = Session::new("old", "user-1", false);
        old_done.status = SessionStatus::Completed;
        old_done.updated_at = Utc::now() - ChronoDuration::hours(48);
        store.create(&old_done).await.unwrap();

        let mut old_active = Session::new("still running", "user-1", false);
        old_active.updated_at = Utc::now() - ChronoDuration::hours(48);
        store.create(&old_active).await.unwrap();

        let mut fresh_done = Session::new("fresh", "user-1", false);
        fresh_done.status = SessionStatus::Failed;
        store.create(&fresh_done).await.unwrap();

        let sweeper = RetentionSweeper::new(store.clone()).with_max_age_hours(24);
        let removed = sweeper.sweep().await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(old_done.id).await.unwrap().is_none());
        assert!(store.get(old_active.id).await.unwrap().is_some());
        assert!(store.get(fresh_done.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Arc::new(MemorySessionStore::new());
        let sweeper = RetentionSweeper::new(store).with_interval(Duration::from_millis(10));
        let handle = sweeper.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;
    }
}
