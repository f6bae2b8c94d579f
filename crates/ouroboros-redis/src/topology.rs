//! Deployment topology and per-node connection info

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::{RedisConfig, StoreError};

/// How the configured hosts are addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// One data node
    Standalone { addr: String },
    /// Master resolved through sentinels
    Failover {
        master_name: String,
        sentinels: Vec<String>,
    },
    /// Redis Cluster seed nodes
    Cluster { nodes: Vec<String> },
}

impl Topology {
    /// A non-empty master name selects failover, several hosts select
    /// cluster, a single host is standalone.
    pub fn from_config(config: &RedisConfig) -> Result<Self, StoreError> {
        if config.hosts.is_empty() {
            return Err(StoreError::Configuration(
                "At least one host is required".to_string(),
            ));
        }

        if !config.master_name.is_empty() {
            return Ok(Topology::Failover {
                master_name: config.master_name.clone(),
                sentinels: config.hosts.clone(),
            });
        }

        if config.hosts.len() > 1 {
            return Ok(Topology::Cluster {
                nodes: config.hosts.clone(),
            });
        }

        Ok(Topology::Standalone {
            addr: config.hosts[0].clone(),
        })
    }

    /// Topology name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Topology::Standalone { .. } => "standalone",
            Topology::Failover { .. } => "failover",
            Topology::Cluster { .. } => "cluster",
        }
    }
}

/// Split `host:port` (IPv6 hosts may be bracketed)
pub(crate) fn parse_host(addr: &str) -> Result<(String, u16), StoreError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| StoreError::Configuration(format!("Expected host:port, got '{}'", addr)))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(StoreError::Configuration(format!("Missing host in '{}'", addr)));
    }

    let port = port
        .parse::<u16>()
        .map_err(|e| StoreError::Configuration(format!("Invalid port in '{}': {}", addr, e)))?;

    Ok((host.to_string(), port))
}

/// Credentials and database applied to every data node connection
pub(crate) fn redis_info(config: &RedisConfig) -> RedisConnectionInfo {
    RedisConnectionInfo {
        db: config.db,
        password: (!config.password.is_empty()).then(|| config.password.clone()),
        ..Default::default()
    }
}

/// Connection info for a data node
pub(crate) fn node_info(addr: &str, config: &RedisConfig) -> Result<ConnectionInfo, StoreError> {
    let (host, port) = parse_host(addr)?;
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: redis_info(config),
    })
}

/// Connection info for a sentinel node (no data-node credentials)
pub(crate) fn sentinel_info(addr: &str) -> Result<ConnectionInfo, StoreError> {
    let (host, port) = parse_host(addr)?;
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: RedisConnectionInfo::default(),
    })
}
