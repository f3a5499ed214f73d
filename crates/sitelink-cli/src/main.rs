//! `sitelink-cli` – the SiteLink daemon.
//!
//! Boot sequence:
//!
//! 1. Initialise structured logging (and the optional OTLP exporter).
//! 2. Load `~/.sitelink/config.toml`, writing defaults on first run; apply
//!    `SITELINK_*` environment overrides.
//! 3. Open the model registry, build the ingest pipeline and pose hub, and
//!    start the HTTP/WebSocket gateway.
//! 4. Intercept **Ctrl-C** for a clean shutdown.

mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::{info, warn};

use sitelink_broadcast::PoseHub;
use sitelink_gateway::GatewayServer;
use sitelink_ingest::IngestPipeline;
use sitelink_registry::{ModelStore, SqliteCalibrationSource};

fn main() {
    // Hold the guard for the entire process lifetime so pending spans are
    // flushed on exit.
    let _telemetry_guard = telemetry::init_tracing("sitelink");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  First run – default config written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    if let Err(e) = run(cfg) {
        eprintln!("{} {e}", "sitelink failed:".red().bold());
        std::process::exit(1);
    }
}

fn run(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let _ = shutdown_tx.send(());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // The runtime is created only after `init_tracing` has run (see the
    // exporter note in `telemetry.rs`).
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let store = ModelStore::open(&cfg.db_path)?;
        let store = Arc::new(tokio::sync::Mutex::new(store));
        let source = SqliteCalibrationSource::new(Arc::clone(&store));
        let pipeline = Arc::new(IngestPipeline::new(
            Arc::new(source),
            Duration::from_millis(cfg.lookup_timeout_ms),
        ));
        let gateway =
            GatewayServer::new(pipeline, PoseHub::default(), store).with_port(cfg.http_port);

        println!("  Model registry at {}", cfg.db_path.bold());
        println!(
            "  Gateway listening on {}\n",
            format!("http://0.0.0.0:{}", cfg.http_port).bold().cyan()
        );
        info!(
            port = cfg.http_port,
            db_path = %cfg.db_path,
            lookup_timeout_ms = cfg.lookup_timeout_ms,
            "sitelink started"
        );

        tokio::select! {
            result = gateway.run() => result.map_err(Into::into),
            _ = shutdown_rx.recv() => {
                info!("shutdown requested, closing gateway");
                println!("{}", "  ✓ Exiting SiteLink.".green());
                Ok(())
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      SiteLink – live site poses      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
}
