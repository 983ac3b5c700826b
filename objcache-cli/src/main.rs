//! objcache CLI
//!
//! Demos and diagnostics for the objcache idle-expiring object cache.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use objcache::{CacheConfig, CacheError, CacheManager, Closable};

/// objcache - idle-expiring object cache
#[derive(Parser)]
#[command(name = "objcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (defaults to OBJCACHE_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Race many callers on one missing key and count factory runs
    Singleflight {
        /// Number of concurrent callers
        #[arg(short = 'n', long, default_value = "50")]
        callers: usize,
        /// Simulated construction time in milliseconds
        #[arg(short, long, default_value = "100")]
        delay_ms: u64,
    },

    /// Cache one resource, leave it idle, and watch the sweeper release it
    ///
    /// Periods come from --config when given, otherwise 1s live and 3s clean.
    /// --live and --clean override either source.
    Sweep {
        /// Idle seconds before eviction
        #[arg(long)]
        live: Option<u64>,
        /// Seconds between sweep passes
        #[arg(long)]
        clean: Option<u64>,
        /// Seconds to wait before checking
        #[arg(long, default_value = "7")]
        wait: u64,
    },

    /// Run a mixed workload and print cache statistics
    Stats {
        /// Number of distinct keys
        #[arg(short, long, default_value = "16")]
        keys: usize,
        /// Number of operations
        #[arg(short, long, default_value = "1000")]
        ops: usize,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

/// A stand-in for a pooled connection.
struct DemoConnection {
    id: u64,
    released: AtomicBool,
}

impl DemoConnection {
    fn open(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            released: AtomicBool::new(false),
        })
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Closable for DemoConnection {
    fn close(&self) -> objcache::Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(CacheError::release(format!("connection {} already released", self.id)));
        }
        info!(id = self.id, "Connection released");
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "objcache=debug,info"
    } else {
        "objcache=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Singleflight { callers, delay_ms } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_singleflight(&config, callers, delay_ms)
        }
        Commands::Sweep { live, clean, wait } => {
            let base = match cli.config.as_deref() {
                Some(path) => load_config(Some(path))?,
                None => CacheConfig::new(SWEEP_DEMO_LIVE, SWEEP_DEMO_CLEAN),
            };
            cmd_sweep(&sweep_config(base, live, clean), wait)
        }
        Commands::Stats { keys, ops, json } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_stats(&config, keys, ops, json)
        }
    }
}

// Short periods so the sweep demo finishes quickly without a config file
const SWEEP_DEMO_LIVE: u64 = 1;
const SWEEP_DEMO_CLEAN: u64 = 3;

/// Applies --live/--clean overrides to the base config
fn sweep_config(base: CacheConfig, live: Option<u64>, clean: Option<u64>) -> CacheConfig {
    CacheConfig::new(
        live.unwrap_or(base.live_seconds),
        clean.unwrap_or(base.clean_interval_seconds),
    )
}

fn load_config(path: Option<&Path>) -> Result<CacheConfig> {
    match path {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => CacheConfig::from_env().context("Invalid OBJCACHE_* environment"),
    }
}

/// Race callers on one key
fn cmd_singleflight(config: &CacheConfig, callers: usize, delay_ms: u64) -> Result<()> {
    if callers == 0 {
        bail!("--callers must be at least 1");
    }
    println!(
        "{} {} callers, {}ms factory",
        "🏁 Racing".cyan().bold(),
        callers,
        delay_ms
    );

    let manager = CacheManager::<Arc<DemoConnection>>::with_config_closable(config)
        .context("Failed to start cache")?;
    let builds = AtomicU64::new(0);

    let start = Instant::now();
    let outcomes: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                s.spawn(|| {
                    manager.get_or_create("primary", || {
                        let id = builds.fetch_add(1, Ordering::SeqCst) + 1;
                        thread::sleep(Duration::from_millis(delay_ms));
                        Ok::<_, CacheError>(DemoConnection::open(id))
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    let elapsed = start.elapsed();

    let mut results = Vec::with_capacity(callers);
    for outcome in outcomes {
        results.push(outcome.map_err(|_| anyhow!("caller thread panicked"))??);
    }

    let first = &results[0];
    let shared = results.iter().all(|conn| Arc::ptr_eq(conn, first));
    let builds = builds.load(Ordering::SeqCst);

    println!("\n{}", "📈 Results:".green().bold());
    println!("   Factory runs: {}", builds);
    println!("   Wall time: {:?}", elapsed);
    if builds == 1 && shared {
        println!("   {} All callers share connection #{}", "✅".green(), first.id);
    } else {
        println!("   {} {} builds, shared instance: {}", "❌".red(), builds, shared);
    }

    manager.close();
    Ok(())
}

/// Watch the sweeper evict an idle entry
fn cmd_sweep(config: &CacheConfig, wait: u64) -> Result<()> {
    let manager = CacheManager::<Arc<DemoConnection>>::with_config_closable(config)
        .context("Failed to start cache")?;

    let conn = manager.get_or_create("idle", || Ok::<_, CacheError>(DemoConnection::open(1)))?;
    println!(
        "{} live={}s clean={}s, waiting {}s without touching it...",
        "🧹 Cached connection #1:".cyan().bold(),
        config.live_seconds,
        config.clean_interval_seconds,
        wait
    );

    thread::sleep(Duration::from_secs(wait));

    let present = manager.cache().contains_key("idle");
    println!("\n{}", "📈 Results:".green().bold());
    println!("   Still cached: {}", present);
    println!("   Released: {}", conn.is_released());
    if !present && conn.is_released() {
        println!("   {} Sweeper evicted and released the idle entry", "✅".green());
    } else {
        println!(
            "   {} Entry survived; wait must exceed live + one sweep interval",
            "⚠️".yellow()
        );
    }

    manager.close();
    Ok(())
}

/// Mixed workload with statistics
fn cmd_stats(config: &CacheConfig, keys: usize, ops: usize, json: bool) -> Result<()> {
    if keys == 0 {
        bail!("--keys must be at least 1");
    }

    let manager = CacheManager::<Arc<DemoConnection>>::with_config_closable(config)
        .context("Failed to start cache")?;
    let next_id = AtomicU64::new(1);

    for op in 0..ops {
        let key = format!("conn-{}", op % keys);
        match op % 10 {
            // Occasional explicit teardown keeps the factory busy
            0 => manager.cache().delete(&key),
            _ => {
                manager.get_or_create(&key, || {
                    Ok::<_, CacheError>(DemoConnection::open(next_id.fetch_add(1, Ordering::SeqCst)))
                })?;
            }
        }
    }

    let stats = manager.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", "📊 Cache statistics:".cyan().bold());
        println!("   {} {}", "Entries:".dimmed(), stats.cache.entries);
        println!("   {} {}", "Hits:".dimmed(), stats.cache.hits);
        println!("   {} {}", "Misses:".dimmed(), stats.cache.misses);
        println!("   {} {}", "Deletions:".dimmed(), stats.cache.deletions);
        println!("   {} {}", "Evictions:".dimmed(), stats.cache.evictions);
        println!("   {} {}", "Release failures:".dimmed(), stats.cache.release_failures);
        println!("   {} {}", "Factory runs:".dimmed(), stats.factory_calls);
    }

    manager.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_uses_config_file_periods() {
        let config = sweep_config(CacheConfig::new(30, 10), None, None);
        assert_eq!(config.live_seconds, 30);
        assert_eq!(config.clean_interval_seconds, 10);
    }

    #[test]
    fn test_sweep_flags_override_config() {
        let config = sweep_config(CacheConfig::new(30, 10), Some(2), None);
        assert_eq!(config.live_seconds, 2);
        assert_eq!(config.clean_interval_seconds, 10);

        let config = sweep_config(CacheConfig::new(30, 10), None, Some(5));
        assert_eq!(config.live_seconds, 30);
        assert_eq!(config.clean_interval_seconds, 5);
    }

    #[test]
    fn test_sweep_cli_flags_are_optional() {
        let cli = Cli::try_parse_from(["objcache", "sweep", "--wait", "1"]).unwrap();
        match cli.command {
            Commands::Sweep { live, clean, wait } => {
                assert_eq!(live, None);
                assert_eq!(clean, None);
                assert_eq!(wait, 1);
            }
            _ => panic!("expected sweep"),
        }
    }
}
