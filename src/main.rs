//! kvcell - command-line access to a kvcell database
//!
//! Opens the database file, runs one operation against it, and exits once
//! every queued write has completed.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use kvcell::{KvStore, ListOptions, StoreConfig, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "kvcell", version = kvcell::VERSION, about = "Embedded key-value store on SQLite")]
struct Cli {
    /// Database file
    #[arg(long, global = true, default_value = kvcell::DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Seconds between expiry sweeps
    #[arg(long, global = true, default_value_t = 86_400)]
    cleanup_interval: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the value stored under a key
    Get {
        key: String,
        /// Print the value as hex
        #[arg(long)]
        hex: bool,
    },
    /// Store a value
    Put(PutArgs),
    /// Remove a key
    Delete { key: String },
    /// Remove every key
    Clear,
    /// List keys with their expiration (0 = never)
    List {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        /// Include expired entries that have not been swept yet
        #[arg(long)]
        ignore_expiry: bool,
    },
    /// Remove expired entries now
    Sweep,
    /// Print operation counters for this run
    Stats,
    /// Print the current Unix time in seconds
    Now,
}

#[derive(Debug, Args)]
struct PutArgs {
    key: String,
    value: String,
    /// Treat the value as hex-encoded bytes
    #[arg(long)]
    hex: bool,
    /// Expire this many seconds from now
    #[arg(long, conflicts_with = "expires_at")]
    ttl: Option<u64>,
    /// Expire at this Unix time
    #[arg(long)]
    expires_at: Option<i64>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_value(value: &Value, as_hex: bool) {
    match value {
        Value::String(s) if !as_hex => println!("{s}"),
        other => println!("{}", hex::encode(other.as_bytes())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if cli.cleanup_interval == 0 {
        bail!("--cleanup-interval must be at least 1");
    }

    let config = StoreConfig::file(&cli.db)
        .with_cleanup_interval(Duration::from_secs(cli.cleanup_interval));
    let store = KvStore::open(config)
        .await
        .with_context(|| format!("failed to open {}", cli.db.display()))?;
    debug!(db = %cli.db.display(), "Store ready");

    match cli.command {
        Command::Get { key, hex } => match store.get(&key).await? {
            Some(value) => print_value(&value, hex),
            None => println!("(nil)"),
        },
        Command::Put(args) => {
            let value = if args.hex {
                Value::from(hex::decode(&args.value).context("value is not valid hex")?)
            } else {
                Value::from(args.value)
            };
            match args.ttl {
                Some(ttl) => {
                    store
                        .put_with_ttl(args.key, value, Duration::from_secs(ttl))
                        .await?
                }
                None => store.put(args.key, value, args.expires_at).await?,
            }
        }
        Command::Delete { key } => store.delete(key).await?,
        Command::Clear => store.clear().await?,
        Command::List {
            prefix,
            limit,
            ignore_expiry,
        } => {
            let options = ListOptions {
                prefix,
                limit,
                ignore_expiry,
            };
            for (key, expires_at) in store.list(options).await? {
                println!("{key}\t{expires_at}");
            }
        }
        Command::Sweep => {
            let removed = store.sweep_now().await?;
            println!("{removed}");
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!("{stats:#?}");
        }
        Command::Now => println!("{}", store.now()),
    }

    store.close().await.context("failed to complete queued writes")?;
    Ok(())
}
