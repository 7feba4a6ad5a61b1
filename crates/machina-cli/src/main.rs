//! `machina-cli` – drive an ActionExecuted node from the terminal
//!
//! 1. Loads `~/.machina/config.toml` (defaults when absent).
//! 2. With a file argument, **replays** a recorded bridge stream (one JSON
//!    message per line) and prints a summary.
//! 3. Without one, starts a [`GraphHost`] on a Tokio runtime and drops the
//!    user into an **interactive REPL** where each line is a bridge message.
//! 4. Intercepts **Ctrl-C**: the node is removed from the host, which turns
//!    any pending refresh into a no-op.

mod config;
mod render;
mod repl;
mod replay;

use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use machina_bridge::{ActionExecutedNode, GraphHost, HostCommand};
use tokio::sync::{broadcast, mpsc};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG picks the filter (default "info"); MACHINA_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("MACHINA_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    let (cfg, cfg_error) = config::load_or_default();
    if let Some(e) = cfg_error {
        println!("{}: {}", "Config error".red(), e);
        println!("  Using default configuration.");
    }
    info!(
        refresh_delay_ms = cfg.refresh_delay_ms,
        event_tag = %cfg.event_tag,
        "configuration loaded"
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start Tokio runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Replay mode ───────────────────────────────────────────────────────
    if let Some(path) = std::env::args().nth(1).map(PathBuf::from) {
        println!("  Replaying {}\n", path.display().to_string().bold());
        let result = runtime.block_on(replay::run_file(&path, cfg.driver_config(), cfg.update_capacity));
        match result {
            Ok(summary) => {
                println!();
                println!("{}", "Replay summary".bold().underline());
                println!("  messages   : {}", summary.messages);
                println!("  new events : {}", summary.new_events.to_string().green());
                println!("  duplicates : {}", summary.duplicates);
                println!("  ignored    : {}", summary.ignored);
                println!("  errors     : {}", summary.errors.to_string().red());
            }
            Err(e) => {
                eprintln!("{}: {}", "Replay failed".red(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Host + printer ────────────────────────────────────────────────────
    let mut host = GraphHost::new(cfg.update_capacity);
    let node = host.add_node(ActionExecutedNode::new(cfg.driver_config()));
    let mut updates = host.subscribe();
    let (commands, command_rx) = mpsc::channel::<HostCommand>(64);

    runtime.spawn(host.run(command_rx));
    runtime.spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => render::print_update(&update),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "terminal printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let commands_ctrlc = commands.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – removing node and shutting down …".yellow().bold());
        let _ = commands_ctrlc.try_send(HostCommand::Remove { node });
        let _ = commands_ctrlc.try_send(HostCommand::Shutdown);
        println!("{}", "  ✓ Pending refreshes cancelled. Press Enter to exit.".green());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    println!(
        "  Node {} listening for {} events.",
        node.to_string().dimmed(),
        cfg.event_tag.bold()
    );
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(commands, node, shutdown);
    runtime.shutdown_timeout(std::time::Duration::from_millis(200));
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "Machina Bridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  ActionExecuted node console");
    println!();
}
