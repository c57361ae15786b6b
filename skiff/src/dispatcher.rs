//! Sync dispatcher
//!
//! Drains the offline queue into the submission gateway. Drain runs when
//! connectivity comes back (offline -> online transition seen by the health
//! probe) and on a periodic fallback timer in case the transition is
//! missed. Draining is idempotent: already-synced actions are gone from the
//! queue, and a duplicate answer from the gateway confirms an earlier
//! partially-acknowledged drain.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayClient, SubmitAck};
use crate::queue::OfflineQueue;
use crate::types::Result;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Connectivity probe cadence
    pub probe_interval: Duration,
    /// Fallback drain cadence (runs even without a connectivity event)
    pub drain_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            drain_interval: Duration::from_secs(30),
        }
    }
}

/// What one drain pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Confirmed persisted (or confirmed duplicates) and removed
    pub synced: usize,
    /// Validation-rejected and removed (they would never succeed)
    pub dropped: usize,
    /// Still queued awaiting connectivity
    pub remaining: usize,
}

/// Drains the offline queue into the gateway
pub struct Dispatcher {
    queue: Arc<OfflineQueue>,
    gateway: Arc<dyn GatewayClient>,
    config: DispatcherConfig,
    running: Arc<RwLock<bool>>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<OfflineQueue>,
        gateway: Arc<dyn GatewayClient>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            gateway,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// One drain pass over the pending queue. An action is removed only on
    /// confirmed persistence (or confirmed duplicate / permanent
    /// rejection); transport failures leave it queued and stop the pass -
    /// connectivity is evidently gone again.
    pub async fn drain(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        for action in self.queue.list_pending()? {
            match self.gateway.submit(&action.payload).await {
                Ok(SubmitAck::Persisted(ack)) => {
                    info!(
                        action_id = %action.action_id,
                        catch_id = %ack.catch_id,
                        "Offline catch synced"
                    );
                    self.queue.remove(&action.action_id)?;
                    report.synced += 1;
                }
                Ok(SubmitAck::Duplicate) => {
                    info!(
                        action_id = %action.action_id,
                        "Catch already on server, confirming earlier sync"
                    );
                    self.queue.remove(&action.action_id)?;
                    report.synced += 1;
                }
                Ok(SubmitAck::Rejected(errors)) => {
                    warn!(
                        action_id = %action.action_id,
                        errors = ?errors,
                        "Catch rejected by validation, dropping"
                    );
                    self.queue.remove(&action.action_id)?;
                    report.dropped += 1;
                }
                Err(e) => {
                    debug!(
                        action_id = %action.action_id,
                        "Gateway unreachable, keeping action queued: {}", e
                    );
                    break;
                }
            }
        }

        report.remaining = self.queue.len();
        Ok(report)
    }

    /// Run the dispatcher loop until [`stop`](Self::stop) is called:
    /// probe connectivity, drain on restoration, and drain on the fallback
    /// timer regardless.
    pub async fn run(&self) {
        *self.running.write().await = true;
        info!(
            probe_secs = self.config.probe_interval.as_secs(),
            drain_secs = self.config.drain_interval.as_secs(),
            "Sync dispatcher started"
        );

        let mut online = false;
        let mut since_drain = Duration::ZERO;

        while *self.running.read().await {
            tokio::time::sleep(self.config.probe_interval).await;
            since_drain += self.config.probe_interval;

            let reachable = self.gateway.is_reachable().await;
            let restored = reachable && !online;
            let fallback_due = reachable && since_drain >= self.config.drain_interval;
            online = reachable;

            if (restored || fallback_due) && !self.queue.is_empty() {
                if restored {
                    info!("Connectivity restored, draining offline queue");
                }
                match self.drain().await {
                    Ok(report) => {
                        if report.synced > 0 || report.dropped > 0 {
                            info!(
                                synced = report.synced,
                                dropped = report.dropped,
                                remaining = report.remaining,
                                "Drain pass complete"
                            );
                        }
                    }
                    Err(e) => warn!("Drain pass failed: {}", e),
                }
                since_drain = Duration::ZERO;
            }
        }

        info!("Sync dispatcher stopped");
    }

    /// Stop the dispatcher loop
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatchDraft, CatchRecordAck};
    use crate::types::SkiffError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn draft(species: &str) -> CatchDraft {
        CatchDraft {
            catch_id: None,
            actor_id: "fisher-1".to_string(),
            actor_name: None,
            species: species.to_string(),
            weight: 5.0,
            harvest_date: "2026-08-01".to_string(),
            drying_method: "sun".to_string(),
            batch_size: 1.0,
            shelf_life: 10,
            price: 100.0,
            lat: -6.8,
            lng: 39.2,
            image_urls: vec![],
        }
    }

    /// Gateway double that plays back a scripted sequence of outcomes
    struct ScriptedGateway {
        script: Mutex<VecDeque<Result<SubmitAck>>>,
        submitted: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Result<SubmitAck>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                submitted: Mutex::new(Vec::new()),
            }
        }

        fn persisted(catch_id: &str) -> Result<SubmitAck> {
            Ok(SubmitAck::Persisted(CatchRecordAck {
                catch_id: catch_id.to_string(),
                status: "pending".to_string(),
                ledger_transaction_id: None,
                ledger_block_number: None,
            }))
        }
    }

    #[async_trait::async_trait]
    impl GatewayClient for ScriptedGateway {
        async fn submit(&self, draft: &CatchDraft) -> Result<SubmitAck> {
            self.submitted.lock().unwrap().push(draft.species.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SkiffError::Gateway("script exhausted".to_string())))
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    fn temp_queue() -> (tempfile::TempDir, Arc<OfflineQueue>) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(OfflineQueue::open(dir.path().join("queue.sled")).unwrap());
        (dir, queue)
    }

    #[tokio::test]
    async fn drain_removes_only_confirmed_actions() {
        let (_dir, queue) = temp_queue();
        queue.enqueue(draft("tilapia")).unwrap();
        queue.enqueue(draft("sardine")).unwrap();
        queue.enqueue(draft("mackerel")).unwrap();

        // First confirmed, second hits a transport failure - the pass stops
        // and leaves the rest queued.
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ScriptedGateway::persisted("C1"),
            Err(SkiffError::Gateway("connection reset".to_string())),
        ]));
        let dispatcher = Dispatcher::new(queue.clone(), gateway, DispatcherConfig::default());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.remaining, 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_ack_confirms_earlier_partial_drain() {
        let (_dir, queue) = temp_queue();
        queue.enqueue(draft("tilapia")).unwrap();

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(SubmitAck::Duplicate)]));
        let dispatcher = Dispatcher::new(queue.clone(), gateway, DispatcherConfig::default());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report.synced, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn validation_rejections_are_dropped_not_retried() {
        let (_dir, queue) = temp_queue();
        queue.enqueue(draft("tilapia")).unwrap();
        queue.enqueue(draft("sardine")).unwrap();

        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(SubmitAck::Rejected(vec!["weight: is required".to_string()])),
            ScriptedGateway::persisted("C2"),
        ]));
        let dispatcher = Dispatcher::new(queue.clone(), gateway.clone(), DispatcherConfig::default());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty());
        assert_eq!(gateway.submitted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn drain_is_idempotent_when_queue_is_empty() {
        let (_dir, queue) = temp_queue();
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let dispatcher = Dispatcher::new(queue, gateway.clone(), DispatcherConfig::default());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert!(gateway.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_action_is_retried_on_the_next_drain() {
        let (_dir, queue) = temp_queue();
        queue.enqueue(draft("tilapia")).unwrap();

        let gateway = Arc::new(ScriptedGateway::new(vec![
            Err(SkiffError::Gateway("offline".to_string())),
            ScriptedGateway::persisted("C1"),
        ]));
        let dispatcher = Dispatcher::new(queue.clone(), gateway, DispatcherConfig::default());

        let first = dispatcher.drain().await.unwrap();
        assert_eq!(first.synced, 0);
        assert_eq!(first.remaining, 1);

        let second = dispatcher.drain().await.unwrap();
        assert_eq!(second.synced, 1);
        assert_eq!(second.remaining, 0);
    }
}
