//! Redis-backed store
//!
//! Every command runs through a bounded retry with a per-attempt timeout.
//! Only transient failures (I/O, dropped connection, timeout) are retried;
//! anything else surfaces immediately. Multi-step writes use MULTI/EXEC
//! pipelines so readers never observe a half-replaced key.

use crate::{CacheError, CacheResult, KeyValueStore};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult, Script};
use resilience::{with_retry_if, with_timeout_result, ServiceConfig, TimeoutError};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// HINCRBY that refuses to create the hash
static HINCR_IF_EXISTS: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return redis.call('HINCRBY', KEYS[1], ARGV[1], ARGV[2])
        end
        return false
        ",
    )
});

#[derive(Clone)]
pub struct RedisStore {
    redis: SharedRedis,
    io: ServiceConfig,
}

impl RedisStore {
    pub fn new(redis: SharedRedis, io: ServiceConfig) -> Self {
        Self { redis, io }
    }

    /// Open a client and connection manager for `redis_url`
    pub async fn connect(redis_url: &str, io: ServiceConfig) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        debug!("Redis connection manager initialised");
        Ok(Self::new(Arc::new(Mutex::new(manager)), io))
    }

    pub fn connection_manager(&self) -> SharedRedis {
        Arc::clone(&self.redis)
    }

    async fn execute<T, F, Fut>(&self, op: &'static str, key: &str, f: F) -> CacheResult<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let timeout = self.io.timeout.duration;

        let result = with_retry_if(
            self.io.retry.clone(),
            || {
                let redis = Arc::clone(&self.redis);
                let attempt = &f;
                async move {
                    // Clone the manager out so the lock is not held across I/O
                    let conn = redis.lock().await.clone();
                    with_timeout_result(timeout, attempt(conn)).await
                }
            },
            is_transient,
        )
        .await;

        result.map_err(|err| match err.into_inner() {
            TimeoutError::Failed(e) => {
                warn!(op, key = %key, error = %e, "Redis command failed");
                CacheError::Redis(e)
            }
            TimeoutError::Elapsed(after) => {
                warn!(op, key = %key, ?after, "Redis command timed out");
                CacheError::Unavailable(format!("{} on {} timed out after {:?}", op, key, after))
            }
        })
    }
}

fn is_transient(err: &TimeoutError<RedisError>) -> bool {
    match err {
        TimeoutError::Elapsed(_) => true,
        TimeoutError::Failed(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.execute("GET", key, |mut conn| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        self.execute("SETEX", key, |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
        })
        .await
    }

    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.execute("INCRBY", key, |mut conn| async move {
            conn.incr::<_, _, i64>(key, delta).await
        })
        .await
    }

    async fn del(&self, keys: &[String]) -> CacheResult<()> {
        let Some(first) = keys.first() else {
            return Ok(());
        };
        self.execute("DEL", first, |mut conn| async move {
            conn.del::<_, ()>(keys).await
        })
        .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.execute("EXISTS", key, |mut conn| async move {
            conn.exists::<_, bool>(key).await
        })
        .await
    }

    async fn hash_replace(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> CacheResult<()> {
        if fields.is_empty() {
            return self.del(&[key.to_string()]).await;
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(key)
            .ignore()
            .hset_multiple(key, fields)
            .ignore()
            .expire(key, ttl_secs as i64)
            .ignore();

        let pipe = &pipe;
        self.execute("HREPLACE", key, |mut conn| async move {
            pipe.query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        self.execute("HGETALL", key, |mut conn| async move {
            conn.hgetall::<_, HashMap<String, String>>(key).await
        })
        .await
    }

    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> CacheResult<Vec<HashMap<String, String>>> {
        let Some(first) = keys.first() else {
            return Ok(Vec::new());
        };

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hgetall(key);
        }

        let pipe = &pipe;
        self.execute("HGETALL*", first, |mut conn| async move {
            pipe.query_async::<_, Vec<HashMap<String, String>>>(&mut conn)
                .await
        })
        .await
    }

    async fn hash_get_fields(
        &self,
        key: &str,
        fields: &[String],
    ) -> CacheResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        self.execute("HMGET", key, |mut conn| async move {
            redis::cmd("HMGET")
                .arg(key)
                .arg(fields)
                .query_async::<_, Vec<Option<String>>>(&mut conn)
                .await
        })
        .await
    }

    async fn hash_incr_existing(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> CacheResult<Option<i64>> {
        self.execute("HINCR_IF_EXISTS", key, |mut conn| async move {
            HINCR_IF_EXISTS
                .key(key)
                .arg(field)
                .arg(delta)
                .invoke_async::<_, Option<i64>>(&mut conn)
                .await
        })
        .await
    }

    async fn hash_incr_many(
        &self,
        key: &str,
        deltas: &[(String, i64)],
        ttl_secs: u64,
    ) -> CacheResult<()> {
        if deltas.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (field, delta) in deltas {
            pipe.hincr(key, field, *delta).ignore();
        }
        pipe.expire(key, ttl_secs as i64).ignore();

        let pipe = &pipe;
        self.execute("HINCRBY*", key, |mut conn| async move {
            pipe.query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn zset_replace(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl_secs: u64,
    ) -> CacheResult<()> {
        if members.is_empty() {
            return self.del(&[key.to_string()]).await;
        }

        // ZADD takes (score, member)
        let items: Vec<(f64, &str)> = members
            .iter()
            .map(|(member, score)| (*score, member.as_str()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(key)
            .ignore()
            .zadd_multiple(key, &items)
            .ignore()
            .expire(key, ttl_secs as i64)
            .ignore();

        let pipe = &pipe;
        self.execute("ZREPLACE", key, |mut conn| async move {
            pipe.query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn zset_range_desc(
        &self,
        key: &str,
        limit: Option<usize>,
    ) -> CacheResult<Vec<(String, f64)>> {
        let stop = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(limit) => limit as isize - 1,
            None => -1,
        };

        self.execute("ZREVRANGE", key, |mut conn| async move {
            conn.zrevrange_withscores::<_, Vec<(String, f64)>>(key, 0, stop)
                .await
        })
        .await
    }

    async fn set_add(&self, key: &str, members: &[String], ttl_secs: u64) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(key, members)
            .ignore()
            .expire(key, ttl_secs as i64)
            .ignore();

        let pipe = &pipe;
        self.execute("SADD", key, |mut conn| async move {
            pipe.query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn set_members(&self, key: &str) -> CacheResult<HashSet<String>> {
        self.execute("SMEMBERS", key, |mut conn| async move {
            conn.smembers::<_, HashSet<String>>(key).await
        })
        .await
    }

    async fn set_contains(&self, key: &str, member: &str) -> CacheResult<bool> {
        self.execute("SISMEMBER", key, |mut conn| async move {
            conn.sismember::<_, _, bool>(key, member).await
        })
        .await
    }

    async fn set_contains_many(&self, key: &str, members: &[String]) -> CacheResult<Vec<bool>> {
        if members.is_empty() {
            return Ok(Vec::new());
        }

        self.execute("SMISMEMBER", key, |mut conn| async move {
            redis::cmd("SMISMEMBER")
                .arg(key)
                .arg(members)
                .query_async::<_, Vec<bool>>(&mut conn)
                .await
        })
        .await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.execute("PING", "ping", |mut conn| async move {
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        })
        .await
        .map(|_| ())
    }
}
