//! Read reconciliation
//!
//! `read_and_wait` asks the local store and every server, waits for all of
//! them to answer or fail, and settles on the version with the latest
//! `updatedAt`:
//!
//! 1. read local (may be absent)
//! 2. read every server in parallel, wait for all
//! 3. keep the freshest remote record carrying `updatedAt`
//! 4. remote found: backfill local if it is absent or older, return the winner
//! 5. no remote data but local exists: re-upload local in the background
//! 6. nothing anywhere: `NotFound`
//! 7. a failure while settling falls back to local data when there is some

use serde_json::Value;
use tokio::task::JoinSet;

use crate::error::{NoloError, Result};
use crate::key::DbKey;
use crate::record::{is_newer, updated_at};

use super::database::Database;

impl Database {
    /// Blocking, remote-authoritative read
    pub async fn read_and_wait(&self, key: &str) -> Result<Value> {
        let parsed = DbKey::parse(key)?;
        let local = self.local.get(key)?;
        let remote = self.freshest_remote(key).await;

        match self.settle(&parsed, key, local.as_ref(), remote) {
            Ok(record) => Ok(record),
            Err(e) if !e.is_not_found() => match local {
                Some(record) => {
                    tracing::warn!(key, error = %e, "reconciliation failed, serving local copy");
                    Ok(record)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    fn settle(
        &self,
        parsed: &DbKey,
        key: &str,
        local: Option<&Value>,
        remote: Option<Value>,
    ) -> Result<Value> {
        match (remote, local) {
            (Some(remote), Some(local)) if is_newer(local, &remote) => {
                // Local carries a later write the servers have not seen yet.
                self.replicate_write(parsed, local, "re-upload");
                Ok(local.clone())
            }
            (Some(remote), local) => {
                let stale = local.map_or(true, |l| is_newer(&remote, l));
                if stale {
                    self.local.put(key, &remote)?;
                    tracing::debug!(key, "local cache refreshed from server");
                }
                Ok(remote)
            }
            (None, Some(local)) => {
                tracing::info!(key, "record only found locally, re-uploading");
                self.replicate_write(parsed, local, "re-upload");
                Ok(local.clone())
            }
            (None, None) => Err(NoloError::NotFound(format!(
                "Data not found in any source for key: {}",
                key
            ))),
        }
    }

    /// Freshest record among servers that answered with a timestamped version
    async fn freshest_remote(&self, key: &str) -> Option<Value> {
        let mut tasks = JoinSet::new();
        for server in self.servers() {
            let client = self.client.clone();
            let key = key.to_string();
            tasks.spawn(async move {
                let result = client.read(&server, &key).await;
                (server, result)
            });
        }

        let mut best: Option<(i64, Value)> = None;
        while let Some(joined) = tasks.join_next().await {
            let record = match joined {
                Ok((_, Ok(Some(record)))) => record,
                Ok((_, Ok(None))) => continue,
                Ok((server, Err(e))) => {
                    tracing::warn!(server = %server, key, error = %e, "read failed on server");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "read task aborted");
                    continue;
                }
            };
            let Some(ts) = updated_at(&record) else {
                continue;
            };
            if best.as_ref().map_or(true, |(current, _)| ts > *current) {
                best = Some((ts, record));
            }
        }
        best.map(|(_, record)| record)
    }
}
