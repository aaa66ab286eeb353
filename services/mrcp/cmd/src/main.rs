//! MRCPv2 control-plane server binary.
//!
//! Accepts MRCPv2 control connections over TCP and serves every configured
//! resource type with the loopback resources.

use clap::Parser;
use mrcp_session::{listen_tcp, serve, HandlerRegistry, SessionConfig};
use mrcp_wire::HeaderRegistry;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod loopback;

use config::{parse_resources, MrcpConfig};
use logging::MrcpLogFormatter;
use loopback::register_loopback;

/// MRCPv2 control-plane server
#[derive(Parser, Debug)]
#[command(name = "mrcp-server", version, about = "MRCPv2 control-plane server")]
struct Args {
    /// Listen address, e.g. 0.0.0.0:1544
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); MRCP_LOG_LEVEL or RUST_LOG otherwise
    #[arg(long)]
    log_level: Option<String>,

    /// Maximum message size in bytes
    #[arg(long)]
    max_message_size: Option<usize>,

    /// Comma-separated resource types to serve, e.g. speechsynth,speechrecog
    #[arg(long)]
    resources: Option<String>,
}

fn env_filter(log_level: Option<&str>) -> anyhow::Result<EnvFilter> {
    let level = match log_level {
        Some(level) => level.to_string(),
        None => match std::env::var("MRCP_LOG_LEVEL") {
            Ok(level) => level,
            Err(_) => {
                if let Ok(filter) = EnvFilter::try_from_default_env() {
                    return Ok(filter);
                }
                "info".to_string()
            }
        },
    };

    let mut filter = EnvFilter::new("warn");
    for target in ["mrcp_server", "mrcp_session", "mrcp_wire", "mrcp_client"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    Ok(filter)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(args.log_level.as_deref())?)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(MrcpLogFormatter::new("mrcp-server"))
        .init();

    info!("Starting MRCPv2 server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = MrcpConfig::load_from_file(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(size) = args.max_message_size {
        config.max_message_size = size;
    }
    if let Some(resources) = &args.resources {
        config.resources = parse_resources(resources)?;
    }

    let headers = Arc::new(HeaderRegistry::standard());
    if mrcp_wire::registry::install_global(headers.clone()).is_err() {
        warn!("Header registry already installed");
    }

    let mut handlers = HandlerRegistry::new();
    register_loopback(&mut handlers, &config.resources);
    info!("Serving resources: {}", config.resource_list());

    let session_config = SessionConfig {
        max_message_size: config.max_message_size,
        ..SessionConfig::default()
    };

    let listener = listen_tcp(config.listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    serve(
        listener,
        session_config,
        headers,
        Arc::new(handlers),
        async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received interrupt, shutting down"),
                Err(e) => warn!("Failed to listen for interrupt: {}", e),
            }
        },
    )
    .await?;

    info!("MRCPv2 server stopped");
    Ok(())
}
