// =============================================================================
// Pair Signals — Main Entry Point
// =============================================================================
//
// Loads the signal config, then runs two tasks side by side:
//   - the refresh loop: resolve symbols, run a batch, publish the report
//   - the read-only REST API
// until Ctrl+C.
// =============================================================================

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pair_signals::api;
use pair_signals::app_state::AppState;
use pair_signals::binance::BinanceClient;
use pair_signals::engine::{resolve_symbols, SignalEngine};
use pair_signals::market_data::SystemClock;
use pair_signals::runtime_config::SignalConfig;

const DEFAULT_CONFIG_PATH: &str = "signal_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Pair Signals starting up");

    let config_path =
        std::env::var("SIGNALS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = match SignalConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, path = %config_path, "Failed to load config, using defaults");
            let cfg = SignalConfig::default();
            if !std::path::Path::new(&config_path).exists() {
                if let Err(e) = cfg.save(&config_path) {
                    warn!(error = %e, "Failed to write default config template");
                }
            }
            cfg
        }
    };

    // Override symbols / bind address from env if available.
    if let Ok(syms) = std::env::var("SIGNALS_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(addr) = std::env::var("SIGNALS_BIND_ADDR") {
        config.bind_addr = addr;
    }

    info!(
        symbols = ?config.symbols,
        interval = %config.interval,
        refresh_secs = config.refresh_interval_secs,
        "Signal engine configured"
    );

    // ── 2. Build engine, data source and shared state ───────────────────
    let client = Arc::new(BinanceClient::from_config(&config)?);
    let engine = Arc::new(SignalEngine::new(config.clone(), Arc::new(SystemClock))?);
    let state = Arc::new(AppState::new(engine.clone()).with_rate_limit(client.rate_limit()));

    // ── 3. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 4. Refresh loop ──────────────────────────────────────────────────
    let loop_state = state.clone();
    let loop_client = client.clone();
    let loop_config = config.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            loop_config.refresh_interval_secs.max(1),
        ));
        loop {
            interval.tick().await;

            let symbols = match resolve_symbols(&loop_config, loop_client.as_ref()).await {
                Ok(s) if !s.is_empty() => s,
                Ok(_) => {
                    warn!("No symbols to scan, skipping refresh");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Symbol discovery failed, skipping refresh");
                    loop_state.push_error(format!("symbol discovery failed: {e}"));
                    continue;
                }
            };
            loop_state.set_symbols(symbols.clone());

            let report = engine.run_batch(loop_client.as_ref(), &symbols).await;
            loop_state.publish_batch(report);
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping");
    info!("Pair Signals shut down complete.");
    Ok(())
}
