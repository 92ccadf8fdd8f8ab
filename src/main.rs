use anyhow::Result;
use clap::Parser;
use dot_voice::{create_router, AppState, Config, NatsTransport};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dot-voice", about = "Realtime voice session service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/dot-voice")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let bind = args.bind.unwrap_or_else(|| cfg.service.http.bind.clone());
    let port = args.port.unwrap_or(cfg.service.http.port);

    info!("DOT Voice v0.1.0");
    info!("Loaded config: {}", cfg.service.name);
    info!("NATS transport: {}", cfg.transport.nats_url);

    let transport = Arc::new(NatsTransport::new(cfg.transport.nats_url.clone()));
    let state = AppState::new(Arc::new(cfg), transport);
    let router = create_router(state);

    let addr = format!("{}:{}", bind, port);
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
