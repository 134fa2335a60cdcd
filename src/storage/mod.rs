//! Persistence port.
//!
//! Every durable piece of state (territories, accounts, the logged-in session)
//! lives under a string key as a JSON document. Stores receive the port as an
//! `Arc<dyn KeyValueStore>` so the backing can be sqlite, a JSON file, or
//! memory in tests.

mod file;
mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

pub const TERRITORIES_KEY: &str = "terratrail_territories";
pub const GRID_PRECISION_KEY: &str = "terratrail_grid_precision";
pub const USERS_KEY: &str = "terratrail_users";
pub const SESSION_KEY: &str = "terratrail_session";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Outcome of reading a JSON document from the port.
#[derive(Debug)]
pub enum Stored<T> {
    Missing,
    Value(T),
    /// The key exists but does not decode as `T`; the raw text is kept so the
    /// caller can quarantine it.
    Corrupt { raw: String, error: serde_json::Error },
}

impl<T> Stored<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Stored::Value(value) => Some(value),
            Stored::Missing | Stored::Corrupt { .. } => None,
        }
    }
}

pub async fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Stored<T>> {
    let raw = match store
        .get(key)
        .await
        .with_context(|| format!("failed to read {key}"))?
    {
        Some(raw) => raw,
        None => return Ok(Stored::Missing),
    };

    Ok(match serde_json::from_str(&raw) {
        Ok(value) => Stored::Value(value),
        Err(error) => Stored::Corrupt { raw, error },
    })
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let serialized = serde_json::to_string(value).with_context(|| format!("failed to encode {key}"))?;
    store
        .set(key, &serialized)
        .await
        .with_context(|| format!("failed to write {key}"))
}

/// Copies an unreadable document aside under `<key>.<suffix>` so it is not
/// lost when the key is next written.
pub async fn quarantine(store: &dyn KeyValueStore, key: &str, suffix: &str, raw: &str) -> Result<String> {
    let backup_key = format!("{key}.{suffix}");
    store
        .set(&backup_key, raw)
        .await
        .with_context(|| format!("failed to quarantine {key}"))?;
    Ok(backup_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn json_documents_distinguish_missing_and_corrupt() {
        let store = MemoryStore::new();

        let missing: Stored<BTreeMap<String, u32>> = load_json(&store, "a").await.unwrap();
        assert!(matches!(missing, Stored::Missing));

        let mut map = BTreeMap::new();
        map.insert("x".to_string(), 1u32);
        save_json(&store, "a", &map).await.unwrap();
        let loaded: Stored<BTreeMap<String, u32>> = load_json(&store, "a").await.unwrap();
        assert_eq!(loaded.into_option(), Some(map));

        store.set("b", "{not json").await.unwrap();
        let corrupt: Stored<BTreeMap<String, u32>> = load_json(&store, "b").await.unwrap();
        match corrupt {
            Stored::Corrupt { raw, .. } => assert_eq!(raw, "{not json"),
            other => panic!("expected corrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quarantine_keeps_the_raw_text() {
        let store = MemoryStore::new();
        let backup = quarantine(&store, "k", "corrupt", "garbage").await.unwrap();
        assert_eq!(backup, "k.corrupt");
        assert_eq!(store.get("k.corrupt").await.unwrap().as_deref(), Some("garbage"));
    }
}
