//! numass-server
//!
//! Serves the numass envelope protocol over TCP:
//! - run control, device state, notes and data push services
//! - legacy and modern tag dialects on input
//! - graceful shutdown on ctrl-c
//!
//! Usage: `numass-server [CONFIG]` (defaults to `numass-server.yaml`).

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use numass_server::{app_state::AppState, config, transport};

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "numass-server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> numass_core::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "numass-server.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.server.listen_addr()?;

    let state = AppState::new(cfg)?;
    tracing::info!(%listen, storage = %state.store().root().display(), "numass-server starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;

    transport::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
