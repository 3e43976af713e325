//! relay-server: runs the correlation relay over HTTP.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use relay::{
    RelayConfig, RelayService,
    transport::{ServerConfig, serve},
};

/// Initialize tracing with RELAY_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("RELAY_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("trace") => "trace",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!(
            "relay={level},relay_server={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("relay {}", env!("CARGO_PKG_VERSION"));

    let relay_config = RelayConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    info!(
        wait_timeout_secs = relay_config.wait_timeout.as_secs_f64(),
        poll_interval_ms = relay_config.poll_interval.as_millis(),
        staleness_secs = relay_config.staleness_threshold.as_secs_f64(),
        reject_unknown_deposits = relay_config.reject_unknown_deposits,
        "Relay configured"
    );
    info!("Keep this running while the executor is active");

    let service = Arc::new(RelayService::new(relay_config));
    serve(server_config, service).await
}
