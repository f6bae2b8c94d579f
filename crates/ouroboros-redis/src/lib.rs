//! Redis store adapter
//!
//! One handle over standalone, sentinel-failover or cluster deployments with
//! a pooled connection, per-call timeout/cancellation and two flavors of
//! every operation:
//!
//! - [`RedisStore`] convenience calls that collapse failures into empty
//!   values (logged at `warn`), except the string get/set and version calls
//!   which return errors;
//! - [`TaggedStore`] calls returning a [`Reply`] that distinguishes found,
//!   missing and failed.
//!
//! # Example
//! ```rust,ignore
//! use ouroboros_redis::{handler_fn, RedisConfig, RedisStore};
//! use std::time::Duration;
//!
//! let store = RedisStore::connect(RedisConfig::from_env()?).await?;
//!
//! store.set("session:1", "alice", Duration::from_secs(60)).await?;
//! assert_eq!(store.get("session:1").await?, "alice");
//!
//! let sub = store
//!     .subscribe("events", handler_fn(|msg| async move {
//!         println!("{}: {}", msg.channel, msg.payload);
//!     }))
//!     .await?;
//! sub.cancel();
//! ```

pub mod config;
mod connection;
pub mod context;
pub mod error;
pub mod pubsub;
pub mod reply;
mod store;
pub mod topology;

pub use config::RedisConfig;
pub use connection::StoreConnection;
pub use context::CallContext;
pub use error::StoreError;
pub use pubsub::{handler_fn, FnHandler, Message, MessageHandler, Subscription};
pub use reply::Reply;
pub use store::{RedisStore, TaggedStore};
pub use topology::Topology;

// Native command access through `connection()` and pipelines
pub use redis;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
