//! Background replication queue
//!
//! `sync_with_servers` enqueues one request per server and returns at once.
//! Requests run on the tokio runtime under a semaphore; each outcome is
//! published as a [`ReplicationEvent`] and logged. `wait_idle` resolves once
//! everything enqueued so far has settled.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::Result;

const EVENT_CAPACITY: usize = 256;

/// Outcome of one request against one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationOutcome {
    Succeeded,
    Failed(String),
}

/// A user-visible notice about one replication request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationEvent {
    pub label: String,
    pub server: String,
    pub outcome: ReplicationOutcome,
}

impl ReplicationEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ReplicationOutcome::Failed(_))
    }
}

/// Per-call summary; a partial failure is still a completed replication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    pub label: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ReplicationReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() && !self.succeeded.is_empty()
    }
}

#[derive(Clone)]
pub struct Replicator {
    inner: Arc<Inner>,
}

struct Inner {
    permits: Arc<Semaphore>,
    pending: AtomicUsize,
    idle: Notify,
    events: broadcast::Sender<ReplicationEvent>,
}

impl Replicator {
    pub fn new(max_concurrent: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                events,
            }),
        }
    }

    /// Stream of replication notices
    pub fn subscribe(&self) -> broadcast::Receiver<ReplicationEvent> {
        self.inner.events.subscribe()
    }

    /// Requests enqueued and not yet settled
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Fire `request` once per server in the background.
    ///
    /// The returned handle may be awaited for a [`ReplicationReport`] or
    /// dropped to leave the replication detached. Must be called from
    /// within a tokio runtime.
    pub fn sync_with_servers<F, Fut, T>(
        &self,
        servers: Vec<String>,
        label: &str,
        request: F,
    ) -> JoinHandle<ReplicationReport>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.pending.fetch_add(servers.len(), Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let label = label.to_string();
        let request = Arc::new(request);

        tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            for server in servers {
                let inner = Arc::clone(&inner);
                let request = Arc::clone(&request);
                let label = label.clone();
                tasks.spawn(async move {
                    let outcome = match inner.permits.clone().acquire_owned().await {
                        Ok(_permit) => match request(server.clone()).await {
                            Ok(_) => ReplicationOutcome::Succeeded,
                            Err(e) => ReplicationOutcome::Failed(e.to_string()),
                        },
                        Err(_) => ReplicationOutcome::Failed("replicator closed".to_string()),
                    };
                    let event = ReplicationEvent {
                        label,
                        server,
                        outcome,
                    };
                    inner.settle(&event);
                    event
                });
            }

            let mut report = ReplicationReport {
                label,
                ..ReplicationReport::default()
            };
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(ReplicationEvent {
                        server, outcome, ..
                    }) => match outcome {
                        ReplicationOutcome::Succeeded => report.succeeded.push(server),
                        ReplicationOutcome::Failed(reason) => report.failed.push((server, reason)),
                    },
                    Err(e) => {
                        tracing::error!(label = %report.label, error = %e, "replication task aborted");
                        inner.finish_one();
                    }
                }
            }
            report
        })
    }

    /// Resolve once every request enqueued so far has settled
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn settle(&self, event: &ReplicationEvent) {
        match &event.outcome {
            ReplicationOutcome::Succeeded => {
                tracing::debug!(label = %event.label, server = %event.server, "replicated");
            }
            ReplicationOutcome::Failed(reason) => {
                tracing::warn!(
                    label = %event.label,
                    server = %event.server,
                    reason = %reason,
                    "replication failed"
                );
            }
        }
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("pending", &self.pending())
            .finish()
    }
}
