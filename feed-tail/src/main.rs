use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tradefeed_socket::prelude::*;
use tradefeed_socket::{init_logging, init_logging_from_env, LoggingMode};

/// Tail a tradefeed socket
///
/// Connects with a bearer token, prints every connection state transition
/// and inbound message, and sends each line typed on stdin. Ctrl+C closes the
/// socket gracefully.
#[derive(Parser, Debug)]
#[command(name = "feed-tail")]
#[command(version, about)]
pub struct Args {
    /// Socket address (ws:// or wss://)
    pub address: String,

    /// Bearer token sent in the Authorization header
    #[arg(short, long, env = "TRADEFEED_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Delay before re-opening after a transient disconnection
    #[arg(long, default_value = "500")]
    pub reconnect_delay_ms: u64,

    /// Print message payloads exactly as received
    #[arg(long)]
    pub raw: bool,

    /// Verbose logging (overrides TRADEFEED_LOG_MODE)
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    fn manager_config(&self) -> Result<ManagerConfig> {
        let config = ManagerConfig::new(self.token.as_str())
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms));
        config.validate().context("Invalid connection settings")?;
        Ok(config)
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Pretty-print JSON payloads; anything else is shown verbatim.
fn render_message(text: &str, raw: bool) -> String {
    if raw {
        return text.to_string();
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| text.to_string())
}

async fn run(args: Args) -> Result<()> {
    let manager = ConnectionManager::websocket(args.manager_config()?)
        .context("Failed to create connection manager")?;

    let mut messages = manager.observe_messages();
    let mut states = manager
        .connect(&args.address)
        .with_context(|| format!("Cannot connect to '{}'", args.address))?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut shutting_down = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            state = states.recv() => {
                let Some(state) = state else { break };
                println!("[{}] state: {}", timestamp(), state);
                if shutting_down && state == ConnectionState::Disconnected {
                    break;
                }
            }

            message = messages.recv() => {
                let Some(message) = message else { break };
                println!("[{}] {}", timestamp(), render_message(&message, args.raw));
            }

            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if let Err(e) = manager.send(line) {
                        warn!("Message not sent: {}", e);
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Stopped reading stdin: {}", e);
                    stdin_open = false;
                }
            },

            _ = &mut ctrl_c, if !shutting_down => {
                info!("Ctrl+C received, disconnecting");
                shutting_down = true;
                if manager.status() == ConnectionState::Disconnected {
                    break;
                }
                manager.disconnect();
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        init_logging(LoggingMode::Debug)?;
    } else {
        init_logging_from_env()?;
    }

    run(args).await
}
