use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use confluence_trader::config::Config;
use confluence_trader::engine::Engine;
use confluence_trader::exchange::{PaperGateway, ReplayBarStore};
use confluence_trader::trading::performance_store::JsonFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let Some(instrument) = cfg.instruments.first().map(|i| i.symbol.clone()) else {
        bail!("no instruments configured");
    };
    let tf = cfg.entry_timeframe;
    let bars_file = PathBuf::from(
        std::env::var("BARS_FILE").unwrap_or_else(|_| format!("data/{}_{}.json", instrument, tf)),
    );

    let mut store = ReplayBarStore::new();
    let n = store.load_json_file(&bars_file, &instrument, tf)?;
    info!("Loaded {} {} bars for {} from {}", n, tf, instrument, bars_file.display());
    let timeline = store.timeline(&instrument, tf);

    let slippage = std::env::var("PAPER_SLIPPAGE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let perf = Box::new(JsonFileStore::new(&cfg.data_dir));
    let flush_every = cfg.flush_interval_secs.max(1);

    let mut engine = Engine::new(cfg, store, PaperGateway::new(slippage), perf);
    engine.start().await?;

    let mut last_flush = Instant::now();

    let replay = async {
        for t in &timeline {
            engine.bar_store_mut().set_time(*t);
            let bar = engine.bar_store_mut().bar_at(&instrument, tf, *t).cloned();
            if let Some(bar) = bar {
                engine.gateway_mut().mark(&instrument, &bar);
            }
            engine.on_bar(&instrument, *t).await;

            if last_flush.elapsed().as_secs() >= flush_every {
                engine.flush_performance();
                last_flush = Instant::now();
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping replay");
        }
        _ = replay => {
            info!("Replay finished ({} bars)", timeline.len());
        }
    }

    engine.shutdown().await;
    Ok(())
}

