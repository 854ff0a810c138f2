//! Error types, one enum per subsystem.
//!
//! Only account errors and syllabus generation failures ever reach a client.
//! Evaluation and hint failures are logged and degraded by the gateway.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;

/// Failures of the key-value store backing the accounts.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("store I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("store JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Login/signup failures. Rendered as inline form messages.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
  #[error("Invalid email or password")]
  InvalidCredentials,

  #[error("User already exists")]
  UserExists,

  #[error("{0} is required")]
  MissingField(&'static str),

  #[error("Not signed in")]
  NotSignedIn,

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("account worker failed: {0}")]
  Worker(#[from] tokio::task::JoinError),
}

impl AuthError {
  pub fn status(&self) -> StatusCode {
    match self {
      AuthError::InvalidCredentials | AuthError::NotSignedIn => StatusCode::UNAUTHORIZED,
      AuthError::UserExists => StatusCode::CONFLICT,
      AuthError::MissingField(_) => StatusCode::BAD_REQUEST,
      AuthError::Store(_) | AuthError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for AuthError {
  fn into_response(self) -> Response {
    let status = self.status();
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

/// Failures talking to the AI collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
  #[error("AI collaborator is not configured (OPENAI_API_KEY unset)")]
  Disabled,

  #[error("transport error: {0}")]
  Transport(String),

  #[error("AI HTTP {status}: {message}")]
  Http { status: u16, message: String },

  #[error("empty response from AI")]
  EmptyResponse,

  #[error("JSON parse error: {0}")]
  Parse(String),

  #[error("unexpected response shape: {0}")]
  InvalidShape(String),
}

impl From<reqwest::Error> for GatewayError {
  fn from(e: reqwest::Error) -> Self {
    GatewayError::Transport(e.to_string())
  }
}

/// Rejections produced by the game reducer.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
  #[error("syllabus generation failed: {0}")]
  GenerationFailed(#[source] GatewayError),

  #[error("cannot {action} while {from}")]
  InvalidTransition { from: &'static str, action: &'static str },

  #[error("game is paused")]
  Paused,

  #[error("a request for this challenge is already running")]
  Busy,

  #[error("hint limit reached ({max} per challenge)")]
  HintLimitReached { max: u32 },
}

impl GameError {
  pub fn invalid_transition(from: &'static str, action: &'static str) -> Self {
    GameError::InvalidTransition { from, action }
  }
}
