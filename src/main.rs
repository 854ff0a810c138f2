//! PyMaster · AI Python Challenge Backend
//!
//! - Axum HTTP + WebSocket API
//! - Timed game sessions over AI-generated Python challenges (OpenAI)
//! - Local account profile, in memory or persisted to a JSON file
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_MODEL        : default "gpt-4o"
//!   OPENAI_TIMEOUT_SECS : request timeout (default 60)
//!   STORE_PATH          : JSON file for accounts; in-memory when unset
//!   AGENT_CONFIG_PATH   : path to TOML prompt overrides
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod accounts;
mod config;
mod domain;
mod error;
mod game;
mod gateway;
mod openai;
mod protocol;
mod routes;
mod scoring;
mod session;
mod state;
mod store;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env();

  // Shared state: account store, OpenAI client, prompts.
  let state = Arc::new(AppState::new(&settings));

  let app = build_router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "pymaster_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "pymaster_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "pymaster_backend", "Shutdown signal received");
}
