//! Redis store adapter
//!
//! [`RedisStore`] exposes the convenience surface used by application code:
//! most calls swallow failures into an empty value, `false` or `None`, while
//! [`RedisStore::get`], [`RedisStore::set`], [`RedisStore::incr_version`] and
//! [`RedisStore::get_incr_version`] propagate errors. The same operations are
//! available through [`RedisStore::tagged`] with a [`Reply`] that keeps
//! "missing" and "failed" apart.

use redis::{Cmd, ExistenceCheck, FromRedisValue, Pipeline, SetExpiry, SetOptions, ToRedisArgs};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{Backend, StoreConnection};
use crate::{CallContext, RedisConfig, Reply, StoreError};

struct StoreInner {
    backend: Backend,
    config: RedisConfig,
}

/// Shared handle to a Redis deployment
///
/// Cloning is cheap: clones share the connection pool. Pass the store to the
/// components that need it instead of keeping a global.
#[derive(Clone)]
pub struct RedisStore {
    inner: Arc<StoreInner>,
    ctx: CallContext,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("backend", &self.inner.backend.kind())
            .field("config", &self.inner.config)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl RedisStore {
    /// Build the client for the configured topology and PING it once.
    ///
    /// A store is never returned for a deployment that did not answer.
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        config.validate()?;
        info!("Connecting to Redis: {:?}", config);

        let backend = Backend::connect(&config).await?;

        let mut ctx = CallContext::new();
        if let Some(timeout) = config.call_timeout_duration() {
            ctx = ctx.with_timeout(timeout);
        }

        let store = Self {
            inner: Arc::new(StoreInner { backend, config }),
            ctx,
        };

        let pong = store.ping().await.map_err(|e| {
            error!("Redis startup PING failed: {}", e);
            e
        })?;
        debug!("Startup PING answered {}", pong);
        info!(
            "Redis store ready ({} backend)",
            store.inner.backend.kind()
        );

        Ok(store)
    }

    /// Fail-fast startup: connect or terminate the process
    pub async fn connect_or_exit(config: RedisConfig) -> Self {
        match Self::connect(config).await {
            Ok(store) => store,
            Err(e) => {
                error!("Redis store unreachable at startup: {}", e);
                std::process::exit(1);
            }
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.inner.config
    }

    /// Context applied to every call made through this handle
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Handle sharing the same pool but running calls under `ctx`
    pub fn with_context(&self, ctx: CallContext) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ctx,
        }
    }

    /// Handle whose calls fail with [`StoreError::Timeout`] after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_context(self.ctx.clone().with_timeout(timeout))
    }

    /// Handle whose calls abort when `token` is cancelled
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        self.with_context(self.ctx.clone().with_cancellation(token))
    }

    /// Operations returning a tagged [`Reply`]
    pub fn tagged(&self) -> TaggedStore<'_> {
        TaggedStore { store: self }
    }

    pub(crate) fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    /// Run one command on a pooled connection under the call context
    pub(crate) async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, StoreError> {
        self.ctx
            .run(async {
                let mut conn = self.inner.backend.get().await?;
                Ok::<_, StoreError>(cmd.query_async(&mut conn).await?)
            })
            .await
    }

    pub async fn ping(&self) -> Result<String, StoreError> {
        self.query(&redis::cmd("PING")).await
    }

    // ------------------------------------------------------------------
    // Hash
    // ------------------------------------------------------------------

    /// Field value, `""` when absent or on failure
    pub async fn hget(&self, key: &str, field: &str) -> String {
        swallow("hget", key, self.tagged().hget(key, field).await)
    }

    pub async fn hset<V: ToRedisArgs>(&self, key: &str, field: &str, value: V) -> bool {
        succeeded("hset", key, self.tagged().hset(key, field, value).await)
    }

    /// Values in field order; `None` on failure
    pub async fn hmget<F: ToRedisArgs>(&self, key: &str, fields: &[F]) -> Option<Vec<Option<String>>> {
        swallow_opt("hmget", key, self.tagged().hmget(key, fields).await)
    }

    pub async fn hmset<F: ToRedisArgs, V: ToRedisArgs>(&self, key: &str, items: &[(F, V)]) -> bool {
        succeeded("hmset", key, self.tagged().hmset(key, items).await)
    }

    pub async fn hdel<F: ToRedisArgs>(&self, key: &str, fields: &[F]) -> bool {
        succeeded("hdel", key, self.tagged().hdel(key, fields).await)
    }

    /// All fields, empty when the key is absent or on failure
    pub async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        swallow("hgetall", key, self.tagged().hgetall(key).await)
    }

    /// New field value, `0` on failure
    pub async fn hincrby(&self, key: &str, field: &str, incr: i64) -> i64 {
        swallow("hincrby", key, self.tagged().hincrby(key, field, incr).await)
    }

    // ------------------------------------------------------------------
    // Set
    // ------------------------------------------------------------------

    pub async fn sadd<M: ToRedisArgs>(&self, key: &str, members: &[M]) -> bool {
        succeeded("sadd", key, self.tagged().sadd(key, members).await)
    }

    pub async fn srem<M: ToRedisArgs>(&self, key: &str, members: &[M]) -> bool {
        succeeded("srem", key, self.tagged().srem(key, members).await)
    }

    pub async fn sismember<M: ToRedisArgs>(&self, key: &str, member: M) -> bool {
        swallow("sismember", key, self.tagged().sismember(key, member).await)
    }

    /// Cardinality, `None` on failure
    pub async fn scard(&self, key: &str) -> Option<i64> {
        swallow_opt("scard", key, self.tagged().scard(key).await)
    }

    pub async fn smembers(&self, key: &str) -> Vec<String> {
        swallow("smembers", key, self.tagged().smembers(key).await)
    }

    /// Every member via SSCAN; stops at the first failed page and keeps
    /// what was collected so far
    pub async fn sscan_all(&self, key: &str) -> Vec<String> {
        swallow("sscan_all", key, self.tagged().sscan_all(key).await)
    }

    // ------------------------------------------------------------------
    // String
    // ------------------------------------------------------------------

    /// Value, `""` when absent; failures are returned
    pub async fn get(&self, key: &str) -> Result<String, StoreError> {
        self.tagged()
            .get(key)
            .await
            .into_result()
            .map(Option::unwrap_or_default)
    }

    /// SET with expiry (`Duration::ZERO` = no expiry); failures are returned
    pub async fn set<V: ToRedisArgs>(&self, key: &str, value: V, expire: Duration) -> Result<(), StoreError> {
        self.tagged()
            .set(key, value, expire)
            .await
            .into_result()
            .map(|_| ())
    }

    /// `true` only if the key did not exist and was written
    pub async fn set_nx<V: ToRedisArgs>(&self, key: &str, value: V, expire: Duration) -> bool {
        swallow("set_nx", key, self.tagged().set_nx(key, value, expire).await)
    }

    /// INCR; failures are returned
    pub async fn incr_version(&self, key: &str) -> Result<i64, StoreError> {
        self.tagged()
            .incr_version(key)
            .await
            .into_result()
            .map(Option::unwrap_or_default)
    }

    /// Current counter value, `0` when absent; failures and non-integer
    /// values are returned as errors
    pub async fn get_incr_version(&self, key: &str) -> Result<i64, StoreError> {
        self.tagged()
            .get_incr_version(key)
            .await
            .into_result()
            .map(Option::unwrap_or_default)
    }

    // ------------------------------------------------------------------
    // List
    // ------------------------------------------------------------------

    /// List length after the push, `None` on failure
    pub async fn lpush<V: ToRedisArgs>(&self, key: &str, values: &[V]) -> Option<i64> {
        swallow_opt("lpush", key, self.tagged().lpush(key, values).await)
    }

    /// Popped value, `None` when the list is empty or on failure
    pub async fn rpop(&self, key: &str) -> Option<String> {
        swallow_opt("rpop", key, self.tagged().rpop(key).await)
    }

    // ------------------------------------------------------------------
    // Key
    // ------------------------------------------------------------------

    /// `true` unless the call failed, even when nothing was deleted
    pub async fn del<K: ToRedisArgs>(&self, keys: &[K]) -> bool {
        succeeded("del", "<keys>", self.tagged().del(keys).await)
    }

    pub async fn exists(&self, key: &str) -> bool {
        swallow("exists", key, self.tagged().exists(key).await)
    }

    /// `true` if a timeout was set
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        swallow("expire", key, self.tagged().expire(key, ttl).await)
    }

    // ------------------------------------------------------------------
    // Pub/Sub
    // ------------------------------------------------------------------

    /// `true` if the message was accepted, whether or not anyone listens
    pub async fn publish<M: ToRedisArgs>(&self, channel: &str, message: M) -> bool {
        succeeded("publish", channel, self.tagged().publish(channel, message).await)
    }

    // ------------------------------------------------------------------
    // Raw access
    // ------------------------------------------------------------------

    /// Fresh pipeline for batching commands in one round trip
    pub fn pipeline(&self) -> Pipeline {
        redis::pipe()
    }

    /// Pipeline wrapped in MULTI/EXEC (not available on cluster deployments)
    pub fn atomic_pipeline(&self) -> Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe
    }

    /// Execute a pipeline built with [`RedisStore::pipeline`]
    pub async fn query_pipeline<T: FromRedisValue>(&self, pipe: &Pipeline) -> Result<T, StoreError> {
        self.ctx
            .run(async {
                let mut conn = self.inner.backend.get().await?;
                Ok::<_, StoreError>(pipe.query_async(&mut conn).await?)
            })
            .await
    }

    /// Check out a raw connection for native commands
    pub async fn connection(&self) -> Result<StoreConnection, StoreError> {
        self.ctx.run(self.inner.backend.get()).await
    }
}

/// Tagged view over a [`RedisStore`]
///
/// Nil replies become [`Reply::Missing`]; every error becomes
/// [`Reply::Failed`] so the caller decides what a failure means.
#[derive(Clone, Copy)]
pub struct TaggedStore<'a> {
    store: &'a RedisStore,
}

impl TaggedStore<'_> {
    async fn call<T: FromRedisValue>(&self, cmd: &Cmd) -> Reply<T> {
        self.store.query(cmd).await.into()
    }

    async fn call_opt<T: FromRedisValue>(&self, cmd: &Cmd) -> Reply<T> {
        Reply::from_optional(self.store.query::<Option<T>>(cmd).await)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Reply<String> {
        self.call_opt(&Cmd::hget(key, field)).await
    }

    /// Number of fields added
    pub async fn hset<V: ToRedisArgs>(&self, key: &str, field: &str, value: V) -> Reply<i64> {
        self.call(&Cmd::hset(key, field, value)).await
    }

    pub async fn hmget<F: ToRedisArgs>(&self, key: &str, fields: &[F]) -> Reply<Vec<Option<String>>> {
        // Cmd::hget degrades to HGET for one field, which replies with a scalar
        self.call(redis::cmd("HMGET").arg(key).arg(fields)).await
    }

    pub async fn hmset<F: ToRedisArgs, V: ToRedisArgs>(&self, key: &str, items: &[(F, V)]) -> Reply<()> {
        self.call(&Cmd::hset_multiple(key, items)).await
    }

    /// Number of fields removed
    pub async fn hdel<F: ToRedisArgs>(&self, key: &str, fields: &[F]) -> Reply<i64> {
        self.call(&Cmd::hdel(key, fields)).await
    }

    pub async fn hgetall(&self, key: &str) -> Reply<HashMap<String, String>> {
        self.call(&Cmd::hgetall(key)).await
    }

    pub async fn hincrby(&self, key: &str, field: &str, incr: i64) -> Reply<i64> {
        self.call(&Cmd::hincr(key, field, incr)).await
    }

    /// Number of members added
    pub async fn sadd<M: ToRedisArgs>(&self, key: &str, members: &[M]) -> Reply<i64> {
        self.call(&Cmd::sadd(key, members)).await
    }

    /// Number of members removed
    pub async fn srem<M: ToRedisArgs>(&self, key: &str, members: &[M]) -> Reply<i64> {
        self.call(&Cmd::srem(key, members)).await
    }

    pub async fn sismember<M: ToRedisArgs>(&self, key: &str, member: M) -> Reply<bool> {
        self.call(&Cmd::sismember(key, member)).await
    }

    pub async fn scard(&self, key: &str) -> Reply<i64> {
        self.call(&Cmd::scard(key)).await
    }

    pub async fn smembers(&self, key: &str) -> Reply<Vec<String>> {
        self.call(&Cmd::smembers(key)).await
    }

    /// Full cursor scan.
    ///
    /// `Failed` only if the first page fails; a later failure ends the scan
    /// with the members collected so far.
    pub async fn sscan_all(&self, key: &str) -> Reply<Vec<String>> {
        let store = self.store;
        let count = store.config().scan_count;

        scan_pages(key, move |cursor| {
            let mut cmd = redis::cmd("SSCAN");
            cmd.arg(key).arg(cursor).arg("COUNT").arg(count);
            async move { store.query::<(u64, Vec<String>)>(&cmd).await }
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Reply<String> {
        self.call_opt(&Cmd::get(key)).await
    }

    pub async fn set<V: ToRedisArgs>(&self, key: &str, value: V, expire: Duration) -> Reply<()> {
        self.call(&set_command(key, value, expire, false)).await
    }

    /// `Found(true)` if written, `Found(false)` if the key already existed
    pub async fn set_nx<V: ToRedisArgs>(&self, key: &str, value: V, expire: Duration) -> Reply<bool> {
        self.store
            .query::<Option<String>>(&set_command(key, value, expire, true))
            .await
            .map(|written| written.is_some())
            .into()
    }

    pub async fn incr_version(&self, key: &str) -> Reply<i64> {
        self.call(&Cmd::incr(key, 1)).await
    }

    /// Parsed counter; an empty stored value reads as `0`
    pub async fn get_incr_version(&self, key: &str) -> Reply<i64> {
        match self.get(key).await {
            Reply::Found(raw) => parse_version(&raw).into(),
            Reply::Missing => Reply::Missing,
            Reply::Failed(e) => Reply::Failed(e),
        }
    }

    /// List length after the push
    pub async fn lpush<V: ToRedisArgs>(&self, key: &str, values: &[V]) -> Reply<i64> {
        self.call(&Cmd::lpush(key, values)).await
    }

    pub async fn rpop(&self, key: &str) -> Reply<String> {
        self.call_opt(&Cmd::rpop(key, None)).await
    }

    /// Number of keys removed
    pub async fn del<K: ToRedisArgs>(&self, keys: &[K]) -> Reply<i64> {
        self.call(&Cmd::del(keys)).await
    }

    pub async fn exists(&self, key: &str) -> Reply<bool> {
        self.call::<i64>(&Cmd::exists(key))
            .await
            .map(|count| count > 0)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Reply<bool> {
        let millis = i64::try_from(expire_millis(ttl)).unwrap_or(i64::MAX);
        self.call(&Cmd::pexpire(key, millis)).await
    }

    /// Number of subscribers that received the message
    pub async fn publish<M: ToRedisArgs>(&self, channel: &str, message: M) -> Reply<i64> {
        self.call(&Cmd::publish(channel, message)).await
    }
}

/// Drive a cursor scan through `fetch`, one page per call, starting at
/// cursor 0 and stopping when the server hands back cursor 0
async fn scan_pages<F, Fut>(key: &str, mut fetch: F) -> Reply<Vec<String>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<(u64, Vec<String>), StoreError>>,
{
    let mut cursor: u64 = 0;
    let mut pages = 0usize;
    let mut scan = ScanAccumulator::default();

    loop {
        match fetch(cursor).await {
            Ok((next, members)) => {
                scan.extend(members);
                pages += 1;
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Err(e) if pages == 0 => return Reply::Failed(e),
            Err(e) => {
                warn!(
                    key = %key,
                    pages = pages,
                    collected = scan.len(),
                    "SSCAN failed mid-scan, returning partial result: {}",
                    e
                );
                break;
            }
        }
    }

    Reply::Found(scan.into_members())
}

/// SET with optional NX and PX arguments
fn set_command<V: ToRedisArgs>(key: &str, value: V, expire: Duration, only_if_absent: bool) -> Cmd {
    let mut options = SetOptions::default();
    if only_if_absent {
        options = options.conditional_set(ExistenceCheck::NX);
    }
    if !expire.is_zero() {
        options = options.with_expiration(SetExpiry::PX(expire_millis(expire)));
    }
    Cmd::set_options(key, value, options)
}

/// Collects SSCAN pages, dropping members the server repeats across pages
#[derive(Default)]
struct ScanAccumulator {
    members: Vec<String>,
    seen: HashSet<String>,
}

impl ScanAccumulator {
    fn extend(&mut self, page: Vec<String>) {
        for member in page {
            if !self.seen.contains(&member) {
                self.seen.insert(member.clone());
                self.members.push(member);
            }
        }
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn into_members(self) -> Vec<String> {
        self.members
    }
}

/// Whole milliseconds for PX/PEXPIRE; a non-zero expiry is at least 1ms
fn expire_millis(ttl: Duration) -> u64 {
    if !ttl.is_zero() && ttl < Duration::from_millis(1) {
        return 1;
    }
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

fn parse_version(raw: &str) -> Result<i64, StoreError> {
    if raw.is_empty() {
        return Ok(0);
    }
    Ok(raw.parse::<i64>()?)
}

fn log_failure<T>(op: &str, key: &str, reply: &Reply<T>) {
    if let Reply::Failed(e) = reply {
        warn!(op = op, key = %key, "Redis call failed, returning empty result: {}", e);
    }
}

/// Value, or `T::default()` when missing or failed
fn swallow<T: Default>(op: &str, key: &str, reply: Reply<T>) -> T {
    log_failure(op, key, &reply);
    reply.unwrap_or_default()
}

/// Value, or `None` when missing or failed
fn swallow_opt<T>(op: &str, key: &str, reply: Reply<T>) -> Option<T> {
    log_failure(op, key, &reply);
    reply.found()
}

/// Whether the call went through at all
fn succeeded<T>(op: &str, key: &str, reply: Reply<T>) -> bool {
    log_failure(op, key, &reply);
    !reply.is_failed()
}
