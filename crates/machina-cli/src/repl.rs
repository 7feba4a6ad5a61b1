//! REPL – paste bridge messages, watch the node react.
//!
//! Supported slash-commands:
//!   /help         – show this list
//!   /state        – print the node's current outputs
//!   /node         – describe the node and its parameters
//!   /schema       – print the JSON Schema of an accepted bridge message
//!   /settings     – edit `~/.machina/config.toml`
//!   /quit | /exit – exit the CLI
//!
//! Any other non-empty line is delivered to the node as its input.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use machina_bridge::{BridgeMessage, HostCommand, NodeId};
use tokio::sync::{mpsc, oneshot};

use crate::config::{self, Config};
use crate::render;

/// Entry point for the interactive REPL.
///
/// Runs on a plain thread and talks to the host task through `commands`.
pub fn run(commands: mpsc::Sender<HostCommand>, node: NodeId, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut woken = false;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "machina>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/help" => cmd_help(),
            "/state" => cmd_state(&commands, node),
            "/node" => render::print_descriptor(),
            "/schema" => cmd_schema(),
            "/settings" => cmd_settings(),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                let _ = commands.blocking_send(HostCommand::Shutdown);
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other if other.starts_with('/') => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
            message => {
                // A fresh node's first pass only publishes; deliver the first
                // message twice so it is also classified.
                let sends = if woken { 1 } else { 2 };
                woken = true;
                for _ in 0..sends {
                    let cmd = HostCommand::Input {
                        node,
                        message: message.to_string(),
                    };
                    if commands.blocking_send(cmd).is_err() {
                        println!("{}", "Host is not running.".red());
                        return;
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Machina Bridge Commands".bold().underline());
    println!("  {}        – print the node's current outputs", "/state".bold().cyan());
    println!("  {}         – describe the node and its parameters", "/node".bold().cyan());
    println!("  {}       – JSON Schema of a bridge message", "/schema".bold().cyan());
    println!("  {}     – edit ~/.machina/config.toml", "/settings".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!("  Anything else is sent to the node as a bridge message, e.g.");
    println!(
        "    {}",
        r#"{"event":"action-executed","id":1,"last":"Move(0,0,100);"}"#.dimmed()
    );
    println!();
}

fn cmd_state(commands: &mpsc::Sender<HostCommand>, node: NodeId) {
    let (reply, rx) = oneshot::channel();
    if commands.blocking_send(HostCommand::Query { node, reply }).is_err() {
        println!("{}", "Host is not running.".red());
        return;
    }
    match rx.blocking_recv() {
        Ok(Some(outputs)) => {
            println!("{}", "Current outputs".bold().underline());
            render::print_outputs(&outputs);
        }
        Ok(None) => println!("  {}", "No outputs yet; send a bridge message first.".dimmed()),
        Err(_) => println!("{}", "Host dropped the query.".red()),
    }
}

fn cmd_schema() {
    let schema = schemars::schema_for!(BridgeMessage);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{json}"),
        Err(e) => println!("{}: {}", "Schema error".red(), e),
    }
}

fn cmd_settings() {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    let raw = prompt_str(
        &format!("  Refresh delay ms [{}]: ", cfg.refresh_delay_ms),
        &cfg.refresh_delay_ms.to_string(),
    );
    match raw.parse::<u64>() {
        Ok(ms) => cfg.refresh_delay_ms = ms,
        Err(_) => println!(
            "  {} '{}' is not a number, keeping {}",
            "Warning:".yellow(),
            raw,
            cfg.refresh_delay_ms
        ),
    }

    cfg.event_tag = prompt_str(&format!("  Event tag [{}]: ", cfg.event_tag), &cfg.event_tag);

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold(),
            "(applies on next start)".dimmed()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for a string value.  Returns `default` when the user presses Enter.
fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}
