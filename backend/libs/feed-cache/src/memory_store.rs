//! In-process store
//!
//! DashMap-backed implementation of [`KeyValueStore`] for tests and
//! single-node development. Every operation holds the shard lock of its key
//! for its whole duration, so per-key operations are atomic the same way
//! Redis commands are. Expiry is lazy: an expired key is dropped the next
//! time it is touched.

use crate::{CacheError, CacheResult, KeyValueStore};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    ZSet(HashMap<String, f64>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn expiring(value: Value, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    fn touch(&mut self, ttl_secs: u64) {
        self.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
    }
}

/// In-memory key-value store with per-key expiry
#[derive(Default)]
pub struct InMemoryStore {
    data: DashMap<String, Entry>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the cache were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remaining lifetime of a live key; `None` when missing or persistent
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.data.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Number of keys currently held, expired ones included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Run `f` against a live value; expired keys are evicted and read as missing
    fn read<R>(
        &self,
        key: &str,
        f: impl FnOnce(&Value) -> CacheResult<R>,
    ) -> CacheResult<Option<R>> {
        self.check_available()?;
        let now = Instant::now();
        {
            let Some(entry) = self.data.get(key) else {
                return Ok(None);
            };
            if !entry.is_expired(now) {
                return f(&entry.value).map(Some);
            }
        }
        self.data.remove_if(key, |_, e| e.is_expired(now));
        Ok(None)
    }

    /// Lock the key for writing, creating it with `init` when missing or expired
    fn slot(&self, key: &str, init: impl FnOnce() -> Value) -> RefMut<'_, String, Entry> {
        let now = Instant::now();
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(occupied) => {
                let mut entry = occupied.into_ref();
                if entry.is_expired(now) {
                    *entry = Entry::persistent(init());
                }
                entry
            }
            MapEntry::Vacant(vacant) => vacant.insert(Entry::persistent(init())),
        }
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::WrongType(key.to_string())
}

fn parse_int(key: &str, raw: &str) -> CacheResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| CacheError::InvalidData(format!("{} is not an integer", key)))
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.read(key, |value| match value {
            Value::Str(s) => Ok(s.clone()),
            _ => Err(wrong_type(key)),
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        self.check_available()?;
        self.data.insert(
            key.to_string(),
            Entry::expiring(Value::Str(value.to_string()), ttl_secs),
        );
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.check_available()?;
        let mut entry = self.slot(key, || Value::Str("0".to_string()));
        match &mut entry.value {
            Value::Str(raw) => {
                let next = parse_int(key, raw)? + delta;
                *raw = next.to_string();
                Ok(next)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn del(&self, keys: &[String]) -> CacheResult<()> {
        self.check_available()?;
        for key in keys {
            self.data.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.read(key, |_| Ok(()))?.is_some())
    }

    async fn hash_replace(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> CacheResult<()> {
        self.check_available()?;
        if fields.is_empty() {
            self.data.remove(key);
            return Ok(());
        }
        let hash = fields.iter().cloned().collect();
        self.data
            .insert(key.to_string(), Entry::expiring(Value::Hash(hash), ttl_secs));
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        let fields = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(hash.clone()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(fields.unwrap_or_default())
    }

    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> CacheResult<Vec<HashMap<String, String>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.hash_get_all(key).await?);
        }
        Ok(results)
    }

    async fn hash_get_fields(
        &self,
        key: &str,
        fields: &[String],
    ) -> CacheResult<Vec<Option<String>>> {
        let values = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(fields.iter().map(|f| hash.get(f).cloned()).collect()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(values.unwrap_or_else(|| vec![None; fields.len()]))
    }

    async fn hash_incr_existing(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> CacheResult<Option<i64>> {
        self.check_available()?;
        let now = Instant::now();
        {
            let Some(mut entry) = self.data.get_mut(key) else {
                return Ok(None);
            };
            if !entry.is_expired(now) {
                return match &mut entry.value {
                    Value::Hash(hash) => {
                        let current = match hash.get(field) {
                            Some(raw) => parse_int(key, raw)?,
                            None => 0,
                        };
                        let next = current + delta;
                        hash.insert(field.to_string(), next.to_string());
                        Ok(Some(next))
                    }
                    _ => Err(wrong_type(key)),
                };
            }
        }
        self.data.remove_if(key, |_, e| e.is_expired(now));
        Ok(None)
    }

    async fn hash_incr_many(
        &self,
        key: &str,
        deltas: &[(String, i64)],
        ttl_secs: u64,
    ) -> CacheResult<()> {
        self.check_available()?;
        if deltas.is_empty() {
            return Ok(());
        }
        let mut entry = self.slot(key, || Value::Hash(HashMap::new()));
        let Value::Hash(hash) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        for (field, delta) in deltas {
            let current = match hash.get(field) {
                Some(raw) => parse_int(key, raw)?,
                None => 0,
            };
            hash.insert(field.clone(), (current + delta).to_string());
        }
        entry.touch(ttl_secs);
        Ok(())
    }

    async fn zset_replace(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl_secs: u64,
    ) -> CacheResult<()> {
        self.check_available()?;
        if members.is_empty() {
            self.data.remove(key);
            return Ok(());
        }
        let zset = members.iter().cloned().collect();
        self.data
            .insert(key.to_string(), Entry::expiring(Value::ZSet(zset), ttl_secs));
        Ok(())
    }

    async fn zset_range_desc(
        &self,
        key: &str,
        limit: Option<usize>,
    ) -> CacheResult<Vec<(String, f64)>> {
        let members = self.read(key, |value| match value {
            Value::ZSet(zset) => {
                let mut members: Vec<(String, f64)> =
                    zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
                // Same order as ZREVRANGE: score desc, ties by member desc
                members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
                if let Some(limit) = limit {
                    members.truncate(limit);
                }
                Ok(members)
            }
            _ => Err(wrong_type(key)),
        })?;
        Ok(members.unwrap_or_default())
    }

    async fn set_add(&self, key: &str, members: &[String], ttl_secs: u64) -> CacheResult<()> {
        self.check_available()?;
        if members.is_empty() {
            return Ok(());
        }
        let mut entry = self.slot(key, || Value::Set(HashSet::new()));
        let Value::Set(set) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        set.extend(members.iter().cloned());
        entry.touch(ttl_secs);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CacheResult<HashSet<String>> {
        let members = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.clone()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(members.unwrap_or_default())
    }

    async fn set_contains(&self, key: &str, member: &str) -> CacheResult<bool> {
        let found = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.contains(member)),
            _ => Err(wrong_type(key)),
        })?;
        Ok(found.unwrap_or(false))
    }

    async fn set_contains_many(&self, key: &str, members: &[String]) -> CacheResult<Vec<bool>> {
        let flags = self.read(key, |value| match value {
            Value::Set(set) => Ok(members.iter().map(|m| set.contains(m)).collect()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(flags.unwrap_or_else(|| vec![false; members.len()]))
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check_available()
    }
}
