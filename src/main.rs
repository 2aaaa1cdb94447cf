use anyhow::{Context, Result};
use clap::Parser;
use loop_bridge::{BridgePoolInner, Config};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

/// Delegate a sleeping work item to an isolated event loop while the outer
/// loop keeps ticking.
#[derive(Debug, Parser)]
#[command(name = "loop-bridge")]
struct Args {
    /// Pool configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the number of worker threads
    #[arg(long)]
    threads: Option<usize>,
    /// How long the delegated work item sleeps
    #[arg(long, default_value_t = 1_000)]
    delay_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(threads) = args.threads {
        config.num_threads = threads;
    }

    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the outer runtime")?;

    rt.block_on(async move {
        let pool = BridgePoolInner::with_config(config)?;
        let now = Instant::now();

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let delay = Duration::from_millis(args.delay_ms);
        let result = pool
            .run(move || async move {
                tokio::time::sleep(delay).await;
                "Expected Result"
            })
            .await?;
        ticker.abort();

        println!(
            "result: {result}, elapsed: {:?}, outer loop ticks meanwhile: {}",
            now.elapsed(),
            ticks.load(Ordering::Relaxed)
        );

        pool.shutdown().await;
        Ok::<_, anyhow::Error>(())
    })
}
