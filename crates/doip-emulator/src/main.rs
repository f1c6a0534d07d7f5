//! DoIP Server Emulator
//!
//! Emulates an ECU's DoIP (ISO 13400) gateway for tester development:
//! Vehicle Identification, Routing Activation, and UDS diagnostic messages
//! over TCP, plus Vehicle Identification over UDP/broadcast.
//!
//! # Usage
//!
//! ```bash
//! doip-emulator --port 13400
//! ```
//!
//! With a config file and a response catalog:
//! ```bash
//! doip-emulator --config doip-emulator.toml
//! ```

use anyhow::Result;
use clap::Parser;
use doip_emulator::{DoipServer, EmulatorConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "doip-emulator")]
#[command(about = "DoIP server emulator for automotive ECU diagnostics")]
struct Args {
    /// Configuration file path (TOML format). Overrides the other flags below.
    #[arg(short, long)]
    config: Option<String>,

    /// Interface address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP/UDP port.
    #[arg(short, long, default_value_t = 13400)]
    port: u16,

    /// Physical logical address this emulator answers to, e.g. "0x1001".
    #[arg(long, default_value = "0x1001")]
    server_addr: String,

    /// Functional (group) logical address, e.g. "0x1FFF".
    #[arg(long, default_value = "0x1FFF")]
    server_addr_func: String,

    /// Expected tester logical address, e.g. "0x0E80".
    #[arg(long, default_value = "0x0E80")]
    client_addr: String,

    /// Path to a JSON response catalog of request/response hex pairs.
    #[arg(long)]
    response_file: Option<String>,

    /// Broadcast three Vehicle Announcement Messages at startup.
    #[arg(long)]
    announce: bool,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "doip_emulator=debug" } else { "doip_emulator=info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = if let Some(path) = &args.config {
        info!(path = %path, "loading config");
        EmulatorConfig::load(path).map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?
    } else {
        let mut config = EmulatorConfig::default();
        config.host = args.host.clone();
        config.port = args.port;
        config.server_addr = parse_logical_addr(&args.server_addr)?;
        config.server_addr_func = parse_logical_addr(&args.server_addr_func)?;
        config.client_addr = parse_logical_addr(&args.client_addr)?;
        config.response_file = args.response_file.clone().map(Into::into);
        config.announce_on_start = args.announce;
        config
    };

    info!(
        host = %config.host,
        port = config.port,
        server_addr = format!("0x{:04X}", config.server_addr),
        server_addr_func = format!("0x{:04X}", config.server_addr_func),
        "starting DoIP server emulator"
    );

    let server = DoipServer::new(&config).map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    info!(entries = server.catalog_size(), "response catalog loaded");

    server.start().await.map_err(|e| anyhow::anyhow!("failed to start server: {e}"))?;

    info!("DoIP server ready - press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    server.stop().await;

    Ok(())
}

fn parse_logical_addr(s: &str) -> Result<u16> {
    let s = s.trim();
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u16::from_str_radix(s, 16).map_err(|e| anyhow::anyhow!("invalid logical address {s}: {e}"))
}
