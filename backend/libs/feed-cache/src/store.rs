//! Key-value store contract
//!
//! The engine needs five primitives from the shared cache: atomic integer
//! increment, string get/set with expiry, hashes, sorted sets and unordered
//! sets. Anything offering those can back the engine; [`crate::RedisStore`]
//! is the production implementation and [`crate::InMemoryStore`] the
//! in-process one.

use crate::CacheResult;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string value
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a string value with expiry
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Atomically add `delta` to an integer key (missing key counts as 0).
    /// The key's expiry, if any, is left untouched.
    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Delete keys; missing keys are ignored
    async fn del(&self, keys: &[String]) -> CacheResult<()>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Atomically replace a whole hash and set its expiry
    async fn hash_replace(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> CacheResult<()>;

    /// All fields of a hash; empty when the key is missing
    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>>;

    /// `hash_get_all` for many keys in one round-trip, results in key order
    async fn hash_get_all_many(&self, keys: &[String])
        -> CacheResult<Vec<HashMap<String, String>>>;

    /// Selected fields of a hash, in input order; `None` for absent fields
    async fn hash_get_fields(&self, key: &str, fields: &[String])
        -> CacheResult<Vec<Option<String>>>;

    /// Increment one hash field only if the hash exists; `None` when missing
    async fn hash_incr_existing(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> CacheResult<Option<i64>>;

    /// Increment several fields of a hash and refresh its expiry atomically
    async fn hash_incr_many(
        &self,
        key: &str,
        deltas: &[(String, i64)],
        ttl_secs: u64,
    ) -> CacheResult<()>;

    /// Atomically replace a sorted set and set its expiry.
    /// An empty member list leaves the key deleted.
    async fn zset_replace(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl_secs: u64,
    ) -> CacheResult<()>;

    /// Members ordered by score descending, at most `limit` when given
    async fn zset_range_desc(
        &self,
        key: &str,
        limit: Option<usize>,
    ) -> CacheResult<Vec<(String, f64)>>;

    /// Add members to a set and refresh its expiry
    async fn set_add(&self, key: &str, members: &[String], ttl_secs: u64) -> CacheResult<()>;

    async fn set_members(&self, key: &str) -> CacheResult<HashSet<String>>;

    async fn set_contains(&self, key: &str, member: &str) -> CacheResult<bool>;

    /// Membership flags for many members, in input order
    async fn set_contains_many(&self, key: &str, members: &[String]) -> CacheResult<Vec<bool>>;

    /// Liveness probe
    async fn ping(&self) -> CacheResult<()>;
}
