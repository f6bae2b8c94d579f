//! Connection backends for each topology
//!
//! Every topology is backed by a deadpool-redis pool capped at `pool_size`:
//! a plain pool for a standalone node, a sentinel pool whose manager asks the
//! sentinels for the current master each time it opens a connection, and a
//! cluster pool of multiplexed cluster connections.

use deadpool_redis::{cluster, sentinel, Config as PoolConfig, Pool, Runtime};
use redis::aio::ConnectionLike;
use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use redis::{Cmd, ConnectionInfo, Pipeline, RedisFuture, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::topology::{node_info, redis_info, sentinel_info, Topology};
use crate::{RedisConfig, StoreError};

/// Shared client state behind a [`crate::RedisStore`]
pub(crate) enum Backend {
    Standalone {
        pool: Pool,
        /// Client for the same node, used for dedicated pub/sub connections
        client: redis::Client,
    },
    Failover {
        pool: sentinel::Pool,
        /// Resolves the current master for dedicated pub/sub connections
        sentinel: Mutex<Sentinel>,
        master_name: String,
        node_connection_info: SentinelNodeConnectionInfo,
    },
    Cluster {
        pool: cluster::Pool,
        /// Client for the first seed node; cluster PUBLISH reaches every node
        client: redis::Client,
    },
}

impl Backend {
    pub(crate) async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let topology = config.topology()?;

        debug!(
            "Creating Redis backend: topology={}, hosts={:?}, db={}, pool_size={}",
            topology.kind(),
            config.hosts,
            config.db,
            config.pool_size
        );

        match topology {
            Topology::Standalone { addr } => {
                let client = redis::Client::open(node_info(&addr, config)?)?;
                let pool = build_pool(&client, config.pool_size)?;
                Ok(Backend::Standalone { pool, client })
            }
            Topology::Failover {
                master_name,
                sentinels,
            } => {
                let infos = sentinels
                    .iter()
                    .map(|addr| sentinel_info(addr))
                    .collect::<Result<Vec<_>, _>>()?;
                let node_connection_info = SentinelNodeConnectionInfo {
                    tls_mode: None,
                    redis_connection_info: Some(redis_info(config)),
                };

                let pool = build_sentinel_pool(
                    infos.clone(),
                    &master_name,
                    node_connection_info.clone(),
                    config.pool_size,
                )?;

                info!(
                    "Master '{}' is resolved through {} sentinel(s) per connection",
                    master_name,
                    infos.len()
                );

                Ok(Backend::Failover {
                    pool,
                    sentinel: Mutex::new(Sentinel::build(infos)?),
                    master_name,
                    node_connection_info,
                })
            }
            Topology::Cluster { nodes } => {
                let infos = nodes
                    .iter()
                    .map(|addr| node_info(addr, config))
                    .collect::<Result<Vec<_>, _>>()?;
                let client = redis::Client::open(infos[0].clone())?;
                let pool = build_cluster_pool(infos, config.pool_size)?;

                Ok(Backend::Cluster { pool, client })
            }
        }
    }

    /// Check out a connection
    pub(crate) async fn get(&self) -> Result<StoreConnection, StoreError> {
        match self {
            Backend::Standalone { pool, .. } => Ok(StoreConnection::Standalone(pool.get().await?)),
            Backend::Failover { pool, .. } => Ok(StoreConnection::Failover(pool.get().await?)),
            Backend::Cluster { pool, .. } => Ok(StoreConnection::Cluster(pool.get().await?)),
        }
    }

    /// Open a dedicated pub/sub connection
    pub(crate) async fn pubsub(&self) -> Result<redis::aio::PubSub, StoreError> {
        let client = match self {
            Backend::Standalone { client, .. } | Backend::Cluster { client, .. } => client.clone(),
            Backend::Failover {
                sentinel,
                master_name,
                node_connection_info,
                ..
            } => {
                let client = sentinel
                    .lock()
                    .await
                    .async_master_for(master_name, Some(node_connection_info))
                    .await?;
                debug!(
                    "Subscribing on master '{}' at {}",
                    master_name,
                    client.get_connection_info().addr
                );
                client
            }
        };
        Ok(client.get_async_pubsub().await?)
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Backend::Standalone { .. } => "standalone",
            Backend::Failover { .. } => "failover",
            Backend::Cluster { .. } => "cluster",
        }
    }
}

fn build_pool(client: &redis::Client, max_size: usize) -> Result<Pool, StoreError> {
    PoolConfig::from_connection_info(client.get_connection_info().clone())
        .builder()
        .map_err(|e| StoreError::Pool(format!("Failed to create pool builder: {}", e)))?
        .max_size(max_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| StoreError::Pool(format!("Failed to create pool: {}", e)))
}

fn build_sentinel_pool(
    sentinels: Vec<ConnectionInfo>,
    master_name: &str,
    node_connection_info: SentinelNodeConnectionInfo,
    max_size: usize,
) -> Result<sentinel::Pool, StoreError> {
    let manager = sentinel::Manager::new(
        sentinels,
        master_name.to_string(),
        Some(node_connection_info),
        sentinel::SentinelServerType::Master,
    )?;

    sentinel::Pool::builder(manager)
        .max_size(max_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| StoreError::Pool(format!("Failed to create sentinel pool: {}", e)))
}

fn build_cluster_pool(
    nodes: Vec<ConnectionInfo>,
    max_size: usize,
) -> Result<cluster::Pool, StoreError> {
    // Every node carries the same credentials, so the builder accepts them
    let manager = cluster::Manager::new(nodes, false)?;

    cluster::Pool::builder(manager)
        .max_size(max_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| StoreError::Pool(format!("Failed to create cluster pool: {}", e)))
}

/// A checked-out connection
///
/// Implements [`ConnectionLike`], so every native command and
/// [`redis::AsyncCommands`] method works on it directly. Connections return
/// to their pool on drop.
pub enum StoreConnection {
    Standalone(deadpool_redis::Connection),
    Failover(sentinel::Connection),
    Cluster(cluster::Connection),
}

impl ConnectionLike for StoreConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            StoreConnection::Standalone(conn) => conn.req_packed_command(cmd),
            StoreConnection::Failover(conn) => conn.req_packed_command(cmd),
            StoreConnection::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            StoreConnection::Standalone(conn) => conn.req_packed_commands(cmd, offset, count),
            StoreConnection::Failover(conn) => conn.req_packed_commands(cmd, offset, count),
            StoreConnection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            StoreConnection::Standalone(conn) => conn.get_db(),
            StoreConnection::Failover(conn) => conn.get_db(),
            StoreConnection::Cluster(conn) => conn.get_db(),
        }
    }
}
