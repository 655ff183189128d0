use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tinylink::api;
use tinylink::config::Config;
use tinylink::registry::{RandomCodeGenerator, Registry};
use tinylink::telemetry::{HttpSink, Telemetry, TelemetrySink, TracingSink};

#[derive(Parser)]
#[command(name = "tinylink")]
#[command(about = "In-memory URL shortener with click analytics", long_about = None)]
struct Cli {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    info!("Loaded configuration");

    let sink: Arc<dyn TelemetrySink> = match config.telemetry.endpoint.as_deref() {
        Some(endpoint) => {
            info!("📡 Forwarding telemetry to {}", endpoint);
            Arc::new(
                HttpSink::new(
                    endpoint,
                    config.telemetry.buffer_size,
                    config.telemetry.timeout(),
                )
                .context("failed to build telemetry client")?,
            )
        }
        None => {
            info!("📡 No TELEMETRY_ENDPOINT set, telemetry stays local");
            Arc::new(TracingSink)
        }
    };
    let telemetry = Telemetry::new(config.telemetry.stack.as_str(), sink);

    let registry = Arc::new(
        Registry::new(config.short_codes.registry_settings())
            .with_generator(Arc::new(RandomCodeGenerator::new(
                config.short_codes.random_bytes,
            )))
            .with_telemetry(telemetry.clone()),
    );

    let config = Arc::new(config);
    let router = api::create_router(Arc::clone(&registry), Arc::clone(&config), telemetry.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Server running on http://{}", addr);
    telemetry.info("server", format!("server listening on {addr}"));

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped, {} short links were registered", registry.len());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
