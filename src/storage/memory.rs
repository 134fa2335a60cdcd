use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::KeyValueStore;

/// In-process store. Nothing survives the process; used by tests and by
/// callers that want a throwaway session.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    failing_key: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set` fail, to exercise write-failure paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `set` fail for one key only.
    pub fn fail_writes_to(&self, key: Option<&str>) {
        let mut failing_key = match self.failing_key.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *failing_key = key.map(str::to_string);
    }

    fn write_blocked(&self, key: &str) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return true;
        }
        match self.failing_key.lock() {
            Ok(guard) => guard.as_deref() == Some(key),
            Err(poisoned) => poisoned.into_inner().as_deref() == Some(key),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.write_blocked(key) {
            bail!("memory store refused write to {key}");
        }
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
