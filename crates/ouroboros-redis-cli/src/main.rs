//! ob-redis - operator CLI for the Redis store adapter
//!
//! Usage:
//!   ob-redis ping                         Probe the deployment
//!   ob-redis get KEY                      Read a string value
//!   ob-redis set KEY VALUE --ttl-ms 5000  Write a string value
//!   ob-redis hgetall KEY                  Dump a hash as JSON
//!   ob-redis members KEY                  Scan a set as JSON
//!   ob-redis subscribe CHANNEL            Print messages until Ctrl-C
//!
//! The deployment comes from `--config FILE` (YAML) or the `REDIS_*`
//! environment variables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ouroboros_redis::{handler_fn, Message, RedisConfig, RedisStore};

#[derive(Parser, Debug)]
#[command(name = "ob-redis")]
#[command(about = "Run Redis store operations from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML config file (defaults to REDIS_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// PING the deployment
    Ping,
    /// Read a string value ("" when absent)
    Get { key: String },
    /// Write a string value
    Set {
        key: String,
        value: String,
        /// Expiry in milliseconds (0 = no expiry)
        #[arg(long, default_value = "0")]
        ttl_ms: u64,
    },
    /// Read one hash field
    Hget { key: String, field: String },
    /// Write one hash field
    Hset {
        key: String,
        field: String,
        value: String,
    },
    /// Print every hash field as JSON
    Hgetall { key: String },
    /// Print every set member as JSON (cursor scan)
    Members { key: String },
    /// Increment a version counter
    Incr { key: String },
    /// Publish a message
    Publish { channel: String, message: String },
    /// Print messages from a channel until Ctrl-C
    Subscribe { channel: String },
}

fn load_config(path: Option<&PathBuf>) -> Result<RedisConfig> {
    match path {
        Some(path) => RedisConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => RedisConfig::from_env().context("Failed to read REDIS_* environment"),
    }
}

fn format_message(message: &Message) -> String {
    format!("[{}] {}", message.channel, message.payload)
}

async fn run(store: RedisStore, command: Command) -> Result<()> {
    match command {
        Command::Ping => {
            println!("{}", store.ping().await?);
        }
        Command::Get { key } => {
            println!("{}", store.get(&key).await?);
        }
        Command::Set { key, value, ttl_ms } => {
            store
                .set(&key, value, Duration::from_millis(ttl_ms))
                .await?;
            println!("OK");
        }
        Command::Hget { key, field } => {
            println!("{}", store.hget(&key, &field).await);
        }
        Command::Hset { key, field, value } => {
            println!("{}", store.hset(&key, &field, value).await);
        }
        Command::Hgetall { key } => {
            let fields = store.hgetall(&key).await;
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        Command::Members { key } => {
            let members = store.sscan_all(&key).await;
            println!("{}", serde_json::to_string_pretty(&members)?);
        }
        Command::Incr { key } => {
            println!("{}", store.incr_version(&key).await?);
        }
        Command::Publish { channel, message } => {
            println!("{}", store.publish(&channel, message).await);
        }
        Command::Subscribe { channel } => {
            let subscription = store
                .subscribe(
                    &channel,
                    handler_fn(|message| async move {
                        println!("{}", format_message(&message));
                    }),
                )
                .await?;

            info!("Listening on {} (Ctrl-C to stop)", channel);
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;

            subscription.cancel();
            subscription.wait().await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_ref())?;
    let store = RedisStore::connect_or_exit(config).await;

    run(store, cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_with_ttl() {
        let cli = Cli::try_parse_from(["ob-redis", "set", "k", "v", "--ttl-ms", "1500"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Set {
                key: "k".to_string(),
                value: "v".to_string(),
                ttl_ms: 1500,
            }
        );
        assert_eq!(cli.log_level, Level::WARN);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_global_options() {
        let cli = Cli::try_parse_from([
            "ob-redis",
            "--config",
            "redis.yaml",
            "--log-level",
            "debug",
            "subscribe",
            "events",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("redis.yaml")));
        assert_eq!(cli.log_level, Level::DEBUG);
        assert_eq!(
            cli.command,
            Command::Subscribe {
                channel: "events".to_string()
            }
        );
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["ob-redis", "hget", "only-key"]).is_err());
        assert!(Cli::try_parse_from(["ob-redis"]).is_err());
    }

    #[test]
    fn test_load_config_from_missing_file() {
        let err = load_config(Some(&PathBuf::from("/nonexistent/redis.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/redis.yaml"));
    }

    #[test]
    fn test_format_message() {
        assert_eq!(format_message(&Message::new("news", "hi")), "[news] hi");
    }
}
