//! Bot gateway client entry point
//!
//! Run with:
//! ```bash
//! cargo run -p kook-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use kook_common::{try_init_tracing_with_config, AppConfig, AppResult, TracingConfig};
use kook_gateway::{frame_source, ClientContext, HttpGatewayApi, LoggingHandler};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, code = e.error_code(), "Gateway client stopped with an error");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> AppResult<()> {
    let config = AppConfig::from_env().inspect_err(|e| {
        eprintln!("Failed to load configuration: {e}");
    })?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        name = %config.app.name,
        env = ?config.app.env,
        mode = ?config.mode,
        "Configuration loaded"
    );

    let api = Arc::new(HttpGatewayApi::new(&config.api)?);
    let ctx = ClientContext::new(config, api, Arc::new(LoggingHandler));
    let source = frame_source(&ctx)?;

    info!("Starting frame source...");
    let started = tokio::select! {
        result = source.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted before the transport came up");
            source.stop().await;
            return Ok(());
        }
    };
    if let Err(e) = started {
        source.stop().await;
        return Err(e.into());
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
        () = ctx.wait_for_shutdown() => info!("Client shut down"),
    }

    source.stop().await;
    if ctx.session.sequence() > 0 {
        info!(sequence = ctx.session.sequence(), "Last delivered sequence number");
    }
    Ok(())
}
