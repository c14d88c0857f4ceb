//! Periodic background reaping of expired sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::sessions::{Namespace, SessionStore};

/// Callback invoked with the namespace and number of sessions reaped in a pass.
pub type ReapObserver = Arc<dyn Fn(Namespace, usize) + Send + Sync>;

/// Reaps expired sessions from each store on a fixed period.
pub struct SessionSweeper {
    stores: Vec<SessionStore>,
    period: Duration,
    observer: Option<ReapObserver>,
}

impl SessionSweeper {
    /// Sweep `stores` every `period`.
    #[must_use]
    pub fn new(stores: Vec<SessionStore>, period: Duration) -> Self {
        Self {
            stores,
            period,
            observer: None,
        }
    }

    /// Report each pass to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: ReapObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run one pass over every store, returning the total reaped.
    pub async fn sweep_once(&self) -> usize {
        let mut total = 0;
        for store in &self.stores {
            match store.sweep().await {
                Ok(reaped) => {
                    if let Some(observer) = &self.observer {
                        observer(store.namespace(), reaped);
                    }
                    if reaped > 0 {
                        debug!(namespace = store.namespace().as_str(), reaped, "expired sessions reaped");
                    }
                    total += reaped;
                }
                Err(err) => {
                    warn!(
                        namespace = store.namespace().as_str(),
                        error = %err,
                        "session sweep failed"
                    );
                }
            }
        }
        total
    }

    /// Start the loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
            debug!("session sweeper stopped");
        });
        SweeperHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

/// Handle used to stop a running sweeper.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "session sweeper task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::backend::SessionBackend;
    use crate::memory::MemorySessions;
    use crate::session::ExpiryPolicy;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store(clock: &ManualClock, namespace: Namespace, policy: ExpiryPolicy) -> SessionStore {
        SessionStore::new(
            Arc::new(MemorySessions::default()),
            policy,
            Arc::new(clock.clone()),
            namespace,
        )
    }

    #[tokio::test]
    async fn sweep_once_reaps_each_namespace() -> anyhow::Result<()> {
        let clock = ManualClock::new(Utc::now());
        let members = store(&clock, Namespace::Member, ExpiryPolicy::member_default());
        let admins = store(&clock, Namespace::Admin, ExpiryPolicy::admin_default());
        members.create_session("11111111").await?;
        admins.create_session("admin").await?;
        clock.advance(ChronoDuration::hours(25));

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let sweeper = SessionSweeper::new(vec![members, admins], Duration::from_secs(60))
            .with_observer(Arc::new(move |_, reaped| {
                counter.fetch_add(reaped, Ordering::SeqCst);
            }));
        assert_eq!(sweeper.sweep_once().await, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn spawned_sweeper_runs_and_stops() -> anyhow::Result<()> {
        let clock = ManualClock::new(Utc::now());
        let backend = Arc::new(MemorySessions::default());
        let members = SessionStore::new(
            backend.clone(),
            ExpiryPolicy::member_default(),
            Arc::new(clock.clone()),
            Namespace::Member,
        );
        members.create_session("11111111").await?;
        clock.advance(ChronoDuration::hours(25));

        let handle = SessionSweeper::new(vec![members], Duration::from_millis(10)).spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;
        assert!(backend.list().await?.is_empty());
        Ok(())
    }
}
