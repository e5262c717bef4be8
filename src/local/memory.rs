//! In-memory local store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{NoloError, Result};

use super::LocalStore;

/// Ordered in-memory store, the per-tab cache analogue.
///
/// `close()` makes every later call fail, which is how an unavailable
/// backing store presents itself.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Value>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NoloError::Storage("local store is closed".to_string()));
        }
        Ok(())
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &Value) -> Result<()> {
        self.check_open()?;
        self.data.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn del(&self, key: &str) -> Result<()> {
        self.check_open()?;
        self.data.write().remove(key);
        Ok(())
    }

    fn scan(&self, gte: &str, lte: &str) -> Result<Vec<(String, Value)>> {
        self.check_open()?;
        if gte > lte {
            return Ok(Vec::new());
        }
        Ok(self
            .data
            .read()
            .range(gte.to_string()..=lte.to_string())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
