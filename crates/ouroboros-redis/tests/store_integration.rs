//! Store integration tests - require Redis running
//!
//! Run with `cargo test -p ouroboros-redis -- --ignored`. The target is read
//! from `REDIS_HOSTS` (default `127.0.0.1:6379`).

use ouroboros_redis::redis::AsyncCommands;
use ouroboros_redis::{handler_fn, Message, RedisConfig, RedisStore, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

static KEY_SEQ: AtomicUsize = AtomicUsize::new(0);

async fn store() -> RedisStore {
    let config = RedisConfig::from_env()
        .unwrap()
        .call_timeout(Duration::from_secs(5));
    RedisStore::connect(config).await.unwrap()
}

fn unique_key(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!(
        "ob-redis-test:{}:{}:{}:{}",
        prefix,
        std::process::id(),
        nanos,
        KEY_SEQ.fetch_add(1, Ordering::SeqCst)
    )
}

#[tokio::test]
#[ignore]
async fn test_ping() {
    let store = store().await;
    assert_eq!(store.ping().await.unwrap(), "PONG");
}

#[tokio::test]
#[ignore]
async fn test_missing_hash_reads_empty() {
    let store = store().await;
    let key = unique_key("hash-missing");

    assert_eq!(store.hget(&key, "a").await, "");
    assert_eq!(store.hget(&key, "b").await, "");
    assert!(store.hgetall(&key).await.is_empty());

    // The tagged view keeps the distinction
    assert!(store.tagged().hget(&key, "a").await.is_missing());
}

#[tokio::test]
#[ignore]
async fn test_hash_operations() {
    let store = store().await;
    let key = unique_key("hash");

    assert!(store.hset(&key, "name", "alice").await);
    assert!(store.hmset(&key, &[("age", "30"), ("city", "paris")]).await);
    assert_eq!(store.hget(&key, "name").await, "alice");

    let values = store.hmget(&key, &["name", "nope", "city"]).await.unwrap();
    assert_eq!(
        values,
        vec![Some("alice".to_string()), None, Some("paris".to_string())]
    );

    assert_eq!(store.hincrby(&key, "age", 2).await, 32);

    let all = store.hgetall(&key).await;
    assert_eq!(all.len(), 3);
    assert_eq!(all.get("age").map(String::as_str), Some("32"));

    assert!(store.hdel(&key, &["city"]).await);
    assert_eq!(store.hgetall(&key).await.len(), 2);

    store.del(&[&key]).await;
}

#[tokio::test]
#[ignore]
async fn test_set_with_expiry_then_get() {
    let store = store().await;
    let key = unique_key("string");

    store
        .set(&key, "value", Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(store.get(&key).await.unwrap(), "value");

    let mut conn = store.connection().await.unwrap();
    let ttl: i64 = conn.pttl(&key).await.unwrap();
    assert!(ttl > 0 && ttl <= 10_000);

    store.del(&[&key]).await;
}

#[tokio::test]
#[ignore]
async fn test_set_without_expiry_persists() {
    let store = store().await;
    let key = unique_key("string-persist");

    store.set(&key, "value", Duration::ZERO).await.unwrap();

    let mut conn = store.connection().await.unwrap();
    let ttl: i64 = conn.pttl(&key).await.unwrap();
    assert_eq!(ttl, -1);

    store.del(&[&key]).await;
}

#[tokio::test]
#[ignore]
async fn test_get_missing_key_is_empty_string() {
    let store = store().await;
    assert_eq!(store.get(&unique_key("absent")).await.unwrap(), "");
}

#[tokio::test]
#[ignore]
async fn test_set_nx() {
    let store = store().await;
    let key = unique_key("lock");

    assert!(store.set_nx(&key, "first", Duration::from_secs(10)).await);
    assert!(!store.set_nx(&key, "second", Duration::from_secs(10)).await);
    assert_eq!(store.get(&key).await.unwrap(), "first");

    store.del(&[&key]).await;
}

#[tokio::test]
#[ignore]
async fn test_incr_version() {
    let store = store().await;
    let key = unique_key("version");

    assert_eq!(store.get_incr_version(&key).await.unwrap(), 0);
    for expected in 1..=5 {
        assert_eq!(store.incr_version(&key).await.unwrap(), expected);
    }
    assert_eq!(store.get_incr_version(&key).await.unwrap(), 5);

    store.set(&key, "not-a-number", Duration::ZERO).await.unwrap();
    assert!(matches!(
        store.get_incr_version(&key).await,
        Err(StoreError::Parse(_))
    ));

    store.del(&[&key]).await;
}

#[tokio::test]
#[ignore]
async fn test_set_membership() {
    let store = store().await;
    let key = unique_key("set");

    assert!(store.sadd(&key, &["a", "b", "c"]).await);
    assert_eq!(store.scard(&key).await, Some(3));

    assert!(store.srem(&key, &["b"]).await);
    assert_eq!(store.scard(&key).await, Some(2));
    assert!(!store.sismember(&key, "b").await);
    assert!(store.sismember(&key, "a").await);

    let mut members = store.smembers(&key).await;
    members.sort();
    assert_eq!(members, vec!["a", "c"]);

    store.del(&[&key]).await;
}

#[tokio::test]
#[ignore]
async fn test_sscan_all_returns_every_member_once() {
    let config = RedisConfig::from_env().unwrap().scan_count(7);
    let store = RedisStore::connect(config).await.unwrap();
    let key = unique_key("scan");

    let members: Vec<String> = (0..250).map(|i| format!("member-{}", i)).collect();
    assert!(store.sadd(&key, &members).await);

    let scanned = store.sscan_all(&key).await;
    assert_eq!(scanned.len(), 250);

    let mut sorted = scanned.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 250);

    assert!(store.sscan_all(&unique_key("scan-empty")).await.is_empty());

    store.del(&[&key]).await;
}

#[tokio::test]
#[ignore]
async fn test_list_push_pop() {
    let store = store().await;
    let key = unique_key("list");

    assert_eq!(store.lpush(&key, &["a", "b"]).await, Some(2));
    assert_eq!(store.rpop(&key).await.as_deref(), Some("a"));
    assert_eq!(store.rpop(&key).await.as_deref(), Some("b"));
    assert_eq!(store.rpop(&key).await, None);
}

#[tokio::test]
#[ignore]
async fn test_key_operations() {
    let store = store().await;
    let key = unique_key("key");

    assert!(store.del(&[unique_key("never-written")]).await);
    assert!(!store.exists(&key).await);
    assert!(!store.expire(&key, Duration::from_secs(5)).await);

    store.set(&key, "v", Duration::ZERO).await.unwrap();
    assert!(store.exists(&key).await);
    assert!(store.expire(&key, Duration::from_millis(50)).await);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!store.exists(&key).await);
}

#[tokio::test]
#[ignore]
async fn test_publish_without_subscriber() {
    let store = store().await;
    assert!(store.publish(&unique_key("channel"), "hello").await);
}

#[tokio::test]
#[ignore]
async fn test_subscribe_receives_and_cancels() {
    let store = store().await;
    let channel = unique_key("events");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let subscription = store
        .subscribe(
            &channel,
            handler_fn(move |message| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(message);
                }
            }),
        )
        .await
        .unwrap();

    assert_eq!(store.tagged().publish(&channel, "hello").await.found(), Some(1));

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.channel, channel);
    assert_eq!(received.payload, "hello");

    subscription.cancel();
    tokio::time::timeout(Duration::from_secs(2), subscription.wait())
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_cancelled_context_fails_calls() {
    let store = store().await;
    let token = CancellationToken::new();
    let scoped = store.with_cancellation(token.clone());

    token.cancel();
    assert!(matches!(scoped.ping().await, Err(StoreError::Cancelled)));
    assert!(scoped.tagged().get("anything").await.is_failed());
    assert_eq!(scoped.hget("anything", "f").await, "");

    // The unscoped handle is unaffected
    assert!(store.ping().await.is_ok());
}

#[tokio::test]
#[ignore]
async fn test_pipeline() {
    let store = store().await;
    let key = unique_key("pipe");

    let mut pipe = store.atomic_pipeline();
    pipe.cmd("SET").arg(&key).arg("1").ignore();
    pipe.cmd("INCR").arg(&key);
    pipe.cmd("GET").arg(&key);

    let (incremented, value): (i64, String) = store.query_pipeline(&pipe).await.unwrap();
    assert_eq!(incremented, 2);
    assert_eq!(value, "2");

    store.del(&[&key]).await;
}
