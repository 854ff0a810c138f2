//! HTTP endpoint handlers. These are thin wrappers over the account service.
//! Each handler is instrumented; credentials never reach the logs.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::domain::User;
use crate::error::AuthError;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, ai: state.gateway.is_enabled() })
}

#[instrument(level = "info", skip(state, body), fields(email = %body.email))]
pub async fn http_signup(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SignupIn>,
) -> Result<impl IntoResponse, AuthError> {
  let accounts = state.accounts.clone();
  let user = blocking(move || accounts.signup(&body.email, &body.password, &body.name)).await?;
  info!(target: "pymaster_backend", email = %user.email, "Account created");
  Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(level = "info", skip(state, body), fields(email = %body.email))]
pub async fn http_login(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LoginIn>,
) -> Result<impl IntoResponse, AuthError> {
  let accounts = state.accounts.clone();
  let user = blocking(move || accounts.login(&body.email, &body.password)).await?;
  info!(target: "pymaster_backend", email = %user.email, "Signed in");
  Ok(Json(user))
}

#[instrument(level = "info", skip(state))]
pub async fn http_logout(State(state): State<Arc<AppState>>) -> Result<StatusCode, AuthError> {
  let accounts = state.accounts.clone();
  blocking(move || Ok(accounts.logout()?)).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state))]
pub async fn http_me(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AuthError> {
  let user = signed_in_user(&state).await?;
  Ok(Json(user))
}

#[instrument(level = "info", skip(state))]
pub async fn http_dashboard(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AuthError> {
  let user = signed_in_user(&state).await?;
  Ok(Json(DashboardOut::from_user(user)))
}

async fn signed_in_user(state: &AppState) -> Result<User, AuthError> {
  let accounts = state.accounts.clone();
  blocking(move || accounts.current_user()?.ok_or(AuthError::NotSignedIn)).await
}

/// Account calls hash passwords and touch the store file; keep them off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, AuthError>
where
  F: FnOnce() -> Result<T, AuthError> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(work).await?
}
