//! Client actions: read, write, patch, remove, upsert, query

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;

use crate::config::SyncConfig;
use crate::error::{NoloError, Result};
use crate::key::{DbKey, KeyFlags};
use crate::local::LocalStore;
use crate::merge::deep_merge;
use crate::protocol::{DeleteKind, WriteBody};
use crate::query::{QueryRequest, SortSpec, DEFAULT_QUERY_LIMIT};
use crate::record::{
    is_newer, now_timestamp, set_field, FIELD_CREATED_AT, FIELD_DB_KEY, FIELD_ID,
    FIELD_UPDATED_AT,
};

use super::client::ServerClient;
use super::replicator::Replicator;

/// Input of [`Database::write`]
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    pub data: Value,
    pub flags: KeyFlags,
    /// Record id or complete encoded key
    pub custom_key: Option<String>,
    /// Namespace owner; defaults to the configured actor
    pub user_id: Option<String>,
}

impl WriteRequest {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            flags: KeyFlags::object(),
            ..Self::default()
        }
    }

    pub fn flags(mut self, flags: KeyFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn custom_key(mut self, key: impl Into<String>) -> Self {
        self.custom_key = Some(key.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResult {
    pub db_key: String,
}

/// Local-first database handle
pub struct Database {
    pub(super) local: Arc<dyn LocalStore>,
    pub(super) client: ServerClient,
    pub(super) replicator: Replicator,
    pub(super) config: SyncConfig,
}

impl Database {
    pub fn new(local: Arc<dyn LocalStore>, config: SyncConfig) -> Result<Self> {
        let client = ServerClient::new(
            Duration::from_millis(config.request_timeout_ms),
            &config.api_prefix,
            config.actor.clone(),
        )?;
        Ok(Self {
            local,
            client,
            replicator: Replicator::new(config.max_concurrent_replications),
            config,
        })
    }

    /// Current server and mirrors, deduplicated
    pub fn servers(&self) -> Vec<String> {
        self.config.server_list()
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Local lookup only
    pub async fn read(&self, key: &str) -> Result<Option<Value>> {
        self.local.get(key)
    }

    // =========================================================================
    // Mutations (local first, then background replication)
    // =========================================================================

    pub async fn write(&self, request: WriteRequest) -> Result<Value> {
        let key = self.resolve_key(&request)?;
        if !request.data.is_object() {
            return Err(NoloError::MalformedInput(
                "record data must be a JSON object".to_string(),
            ));
        }

        let now = now_timestamp();
        let mut record = request.data;
        set_field(&mut record, FIELD_ID, Value::from(key.id.clone()));
        set_field(&mut record, FIELD_DB_KEY, Value::from(key.to_string()));
        if record.get(FIELD_CREATED_AT).map_or(true, Value::is_null) {
            set_field(&mut record, FIELD_CREATED_AT, Value::from(now.clone()));
        }
        set_field(&mut record, FIELD_UPDATED_AT, Value::from(now));

        let encoded = key.to_string();
        self.local.put(&encoded, &record)?;
        self.replicate_write(&key, &record, "write");

        Ok(record)
    }

    /// Merge `changes` into the local record and mirror the delta
    pub async fn patch(&self, key: &str, changes: Value) -> Result<Value> {
        let current = self
            .local
            .get(key)?
            .ok_or_else(|| NoloError::NotFound(format!("Data not found locally for key: {}", key)))?;
        if !changes.is_object() {
            return Err(NoloError::MalformedInput(
                "patch changes must be a JSON object".to_string(),
            ));
        }

        let mut updated_changes = changes;
        set_field(&mut updated_changes, FIELD_UPDATED_AT, Value::from(now_timestamp()));
        let merged = deep_merge(&current, &updated_changes);
        self.local.put(key, &merged)?;

        let client = self.client.clone();
        let key_owned = key.to_string();
        self.replicator
            .sync_with_servers(self.servers(), "patch", move |server| {
                let client = client.clone();
                let key = key_owned.clone();
                let changes = updated_changes.clone();
                async move { client.patch(&server, &key, &changes).await }
            });

        Ok(merged)
    }

    pub async fn remove(&self, key: &str) -> Result<RemoveResult> {
        self.remove_with(key, DeleteKind::Single).await
    }

    /// Remove a dialog locally together with its messages; servers do the same
    pub async fn remove_messages(&self, key: &str) -> Result<RemoveResult> {
        let dialog = DbKey::parse(key)?;
        let request = QueryRequest::new(dialog.user_id.clone(), Value::Object(Default::default()));
        for (message_key, record) in self.local_matches(&request)? {
            let belongs = record
                .get("dialogId")
                .and_then(Value::as_str)
                .is_some_and(|id| id == dialog.id || id == key);
            if belongs {
                self.local.del(&message_key)?;
            }
        }
        self.remove_with(key, DeleteKind::Messages).await
    }

    async fn remove_with(&self, key: &str, kind: DeleteKind) -> Result<RemoveResult> {
        DbKey::parse(key)?;
        self.local.del(key)?;

        let client = self.client.clone();
        let key_owned = key.to_string();
        self.replicator
            .sync_with_servers(self.servers(), "delete", move |server| {
                let client = client.clone();
                let key = key_owned.clone();
                async move { client.delete(&server, &key, kind).await }
            });

        Ok(RemoveResult {
            db_key: key.to_string(),
        })
    }

    /// Patch when the key exists locally, otherwise write under that key
    pub async fn upsert(&self, key: &str, data: Value) -> Result<Value> {
        if self.local.get(key)?.is_some() {
            return self.patch(key, data).await;
        }
        let parsed = DbKey::parse(key)?;
        self.write(WriteRequest {
            data,
            flags: parsed.flags,
            custom_key: Some(key.to_string()),
            user_id: Some(parsed.user_id),
        })
        .await
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Local results merged with every server's, freshest version per key.
    /// Newer remote versions are written back to the local store.
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<Value>> {
        let mut merged: HashMap<String, Value> = self.local_matches(request)?.into_iter().collect();

        // Servers window in the same order the merge does, so their top
        // `skip + limit` always covers the merged window.
        let mut window = request.clone();
        window.sort = Some(
            request
                .sort
                .clone()
                .unwrap_or_else(|| SortSpec::descending(FIELD_UPDATED_AT)),
        );

        let mut remote_request = window.clone();
        remote_request.skip = 0;
        remote_request.limit = Some(
            request
                .limit
                .unwrap_or(DEFAULT_QUERY_LIMIT)
                .saturating_add(request.skip),
        );

        let mut tasks = JoinSet::new();
        for server in self.servers() {
            let client = self.client.clone();
            let remote_request = remote_request.clone();
            tasks.spawn(async move {
                let result = client.query(&server, &remote_request).await;
                (server, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (server, records) = match joined {
                Ok((server, Ok(records))) => (server, records),
                Ok((server, Err(e))) => {
                    tracing::warn!(server = %server, error = %e, "query failed on server");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "query task aborted");
                    continue;
                }
            };

            for record in records {
                let Some(key) = record.get(FIELD_DB_KEY).and_then(Value::as_str).map(str::to_string) else {
                    tracing::debug!(server = %server, "remote record without dbKey skipped");
                    continue;
                };
                let fresher = merged.get(&key).map_or(true, |current| is_newer(&record, current));
                if fresher {
                    if let Err(e) = self.local.put(&key, &record) {
                        tracing::warn!(key = %key, error = %e, "could not backfill local store");
                    }
                    merged.insert(key, record);
                }
            }
        }

        Ok(window.apply_window(merged.into_values().collect()))
    }

    /// Local records of the request's user passing its key and record filters
    fn local_matches(&self, request: &QueryRequest) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        for (key, record) in self.local.scan_user(&request.user_id)? {
            let Ok(parsed) = DbKey::parse(&key) else {
                continue;
            };
            if request.accepts_key(&parsed) && request.accepts_record(&record)? {
                out.push((key, record));
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn resolve_key(&self, request: &WriteRequest) -> Result<DbKey> {
        if let Some(custom) = request.custom_key.as_deref() {
            if let Ok(key) = DbKey::parse(custom) {
                return Ok(key);
            }
        }

        let user_id = request
            .user_id
            .clone()
            .or_else(|| self.config.actor.clone())
            .ok_or_else(|| NoloError::MalformedInput("write needs a user id".to_string()))?;

        let id = request
            .custom_key
            .clone()
            .or_else(|| request.data.get(FIELD_ID).and_then(Value::as_str).map(str::to_string));
        match id {
            Some(id) => DbKey::new(request.flags, user_id, id),
            None => DbKey::generate(request.flags, user_id),
        }
    }

    /// Fire-and-forget upload of a full record to every server
    pub(super) fn replicate_write(&self, key: &DbKey, record: &Value, label: &str) {
        let client = self.client.clone();
        let body = WriteBody {
            data: record.clone(),
            flags: key.flags,
            custom_id: Some(key.to_string()),
            user_id: Some(key.user_id.clone()),
        };
        self.replicator
            .sync_with_servers(self.servers(), label, move |server| {
                let client = client.clone();
                let body = body.clone();
                async move { client.write(&server, &body).await }
            });
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("servers", &self.servers())
            .field("replicator", &self.replicator)
            .finish()
    }
}
