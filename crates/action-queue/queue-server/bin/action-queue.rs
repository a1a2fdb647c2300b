use action_queue_server::Config;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize a tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(config.log_level.into())
                .from_env_lossy(),
        )
        .init();

    let server = config.build().await?;
    let cancellation_token = CancellationToken::new();

    let mut server_future = Box::pin(server.run(cancellation_token.clone()));

    tokio::select! {
        result = &mut server_future => {
            handle_server_result(result);
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C signal, initiating graceful shutdown");
            cancellation_token.cancel();
            handle_server_result(server_future.await);
        }
    }

    Ok(())
}

/// Handle the result of the server
fn handle_server_result(result: Result<()>) {
    match result {
        Ok(()) => tracing::info!("Server shutdown gracefully"),
        Err(e) => {
            tracing::error!("Server encountered an error: {}", e);
        }
    }
}
