//! `meshrelay` – mesh telemetry relay.
//!
//! 1. Loads `~/.meshrelay/config.toml` (or `--config <path>`) plus
//!    `MESHRELAY_*` overrides.
//! 2. Opens the packet source (stdin by default, fed decoded JSON lines by a
//!    radio host tool) and starts the producer thread.  If the source cannot
//!    be opened the relay keeps running without ingestion.
//! 3. Runs the relay consumer and the push-channel server on a
//!    single-threaded Tokio runtime until **Ctrl-C**.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use colored::Colorize;
use meshrelay_middleware::{HandoffBridge, JsonLinesInterface, Producer};
use meshrelay_runtime::Relay;
use meshrelay_runtime::telemetry::init_tracing;
use meshrelay_server::RelayServer;
use meshrelay_types::RelayError;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Mesh telemetry relay")]
struct Args {
    /// Read configuration from this file instead of ~/.meshrelay/config.toml
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the resolved configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _tracing = init_tracing("meshrelay");

    let path = args.config.unwrap_or_else(config::config_path);
    let cfg = match config::resolve(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            eprintln!("{}: {e}", "Config error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    if args.write_config {
        return match config::save_to(&cfg, &path) {
            Ok(()) => {
                println!("  {} Config saved to {}", "✓".green().bold(), path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", "Error saving config".red().bold());
                ExitCode::FAILURE
            }
        };
    }

    print_banner(&cfg);

    // ── Shutdown plumbing ─────────────────────────────────────────────────
    // `running` is polled by the producer thread; the watch wakes the
    // consumer and the server.
    let running = Arc::new(AtomicBool::new(true));
    let (stop_tx, stop_rx) = watch::channel(false);
    let stop = Arc::new(stop_tx);
    {
        let running = Arc::clone(&running);
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
            running.store(false, Ordering::SeqCst);
            stop.send_replace(true);
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler; stop the relay with SIGKILL");
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: failed to start runtime: {e}", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, running, stop, stop_rx)) {
        Ok(()) => {
            println!("{}", "  ✓ Relay stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "relay failed");
            eprintln!("{}: {e}", "fatal".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cfg: config::Config,
    running: Arc<AtomicBool>,
    stop: Arc<watch::Sender<bool>>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), RelayError> {
    let bridge = HandoffBridge::detached();
    let (relay, handle) = Relay::new(cfg.relay_config(), bridge.clone());
    let relay_task = tokio::spawn(relay.run(shutdown.clone()));

    // Let the consumer attach before the producer starts submitting.
    while !bridge.is_attached() && !relay_task.is_finished() {
        tokio::task::yield_now().await;
    }

    start_producer(&cfg.device_path, bridge, Arc::clone(&running));

    let served = RelayServer::new(handle)
        .with_port(cfg.listen_port)
        .run(shutdown)
        .await;
    if served.is_err() {
        running.store(false, Ordering::SeqCst);
        stop.send_replace(true);
    }

    match relay_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "relay consumer failed"),
        Err(e) => error!(error = %e, "relay consumer task panicked"),
    }
    served
}

/// Open the interface and spawn the producer thread.  Failures leave the
/// relay running without ingestion and are reported once.
fn start_producer(device_path: &str, bridge: HandoffBridge, running: Arc<AtomicBool>) {
    let interface = match JsonLinesInterface::open(device_path) {
        Ok(interface) => interface,
        Err(e) => {
            warn!(device = %device_path, error = %e, "mesh interface unavailable; relaying nothing");
            println!(
                "  {} {} – serving subscribers without ingestion",
                "⚠".yellow().bold(),
                e.to_string().yellow()
            );
            return;
        }
    };

    // The thread is not joined: a serial read blocks until the next packet,
    // and process exit reclaims it.
    match Producer::new(interface, bridge, running).spawn() {
        Ok(_) => info!(device = %device_path, "mesh producer started"),
        Err(e) => warn!(error = %e, "mesh producer did not start; relaying nothing"),
    }
}

fn print_banner(cfg: &config::Config) {
    println!();
    println!(
        "  {} {}",
        "meshrelay".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Mesh telemetry relay");
    println!();
    let source = if cfg.device_path == "-" {
        "stdin".to_string()
    } else {
        cfg.device_path.clone()
    };
    println!("  Packets     {} {}", source.bold(), "(decoded JSON, one per line)".dimmed());
    println!("  Push        ws://0.0.0.0:{}/ws", cfg.listen_port);
    println!("  Status      http://0.0.0.0:{}/", cfg.listen_port);
    println!(
        "  Debounce    {} ms, keep-alive {} s",
        cfg.debounce_ms, cfg.keepalive_secs
    );
    println!();
}
