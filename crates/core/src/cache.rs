// Content-addressed memoization of action outputs

use crate::config::CacheConfig;
use crate::types::Values;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Entries = RwLock<HashMap<String, CacheEntry>>;

/// A cached action output
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Values,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Output cache keyed by action name and canonicalized inputs.
///
/// A background task started with the cache drops expired entries every
/// sweep interval. [`get`](Self::get) re-checks the TTL itself, so a late
/// sweep never produces a stale hit.
pub struct Cache {
    entries: Arc<Entries>,
    default_ttl: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl Cache {
    /// Create a cache. The sweeper only starts when called inside a tokio
    /// runtime and the configured interval is non-zero.
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Arc::new(Entries::default());
        let sweeper = config
            .sweep_interval()
            .and_then(|interval| spawn_sweeper(Arc::downgrade(&entries), interval));

        Self {
            entries,
            default_ttl: config.default_ttl(),
            sweeper,
        }
    }

    /// Deterministic key for an action invocation: hex SHA-256 of the
    /// canonical JSON form of `{"action": .., "inputs": ..}`
    pub fn key(action: &str, inputs: &Values) -> String {
        let mut names: Vec<&String> = inputs.keys().collect();
        names.sort();
        let inputs: Map<String, Value> = names
            .into_iter()
            .map(|name| (name.clone(), canonicalize(&inputs[name])))
            .collect();

        let mut document = Map::new();
        document.insert("action".to_string(), Value::String(action.to_string()));
        document.insert("inputs".to_string(), Value::Object(inputs));

        let hash = Sha256::digest(Value::Object(document).to_string().as_bytes());
        hex::encode(hash)
    }

    /// Cached outputs, if present and younger than their TTL
    pub fn get(&self, action: &str, inputs: &Values) -> Option<Values> {
        let key = Self::key(action, inputs);
        let entries = self.entries.read();
        let entry = entries.get(&key)?;

        if entry.is_expired_at(Instant::now()) {
            tracing::trace!("Cache entry for {} expired", action);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store outputs, replacing any existing entry for the same key
    pub fn set(&self, action: &str, inputs: &Values, outputs: Values, ttl: Duration) {
        let key = Self::key(action, inputs);
        let entry = CacheEntry {
            key: key.clone(),
            value: outputs,
            created_at: Instant::now(),
            ttl,
        };
        self.entries.write().insert(key, entry);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Remove expired entries now, returning how many were dropped
    pub fn sweep(&self) -> usize {
        sweep_entries(&self.entries)
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

fn spawn_sweeper(entries: Weak<Entries>, interval: Duration) -> Option<JoinHandle<()>> {
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            tracing::warn!("No tokio runtime available; cache sweeping disabled");
            return None;
        }
    };

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(entries) = entries.upgrade() else {
                break;
            };
            let removed = sweep_entries(&entries);
            if removed > 0 {
                tracing::debug!("Cache sweep removed {} expired entries", removed);
            }
        }
    }))
}

fn sweep_entries(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut entries = entries.write();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired_at(now));
    before - entries.len()
}

/// Copy of `value` with every object's keys in sorted order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|key| (key.clone(), canonicalize(&map[key])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
