//! WebSocket upgrade + message loop. Each connection owns one game session.
//! Client messages become session actions; session events are forwarded to
//! the client as they happen, so one request can produce several replies.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::game::Action;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::GameSession;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "pymaster_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "pymaster_backend", "WebSocket connected");
  let (tx, mut events) = mpsc::unbounded_channel();
  let session = GameSession::new(state.gateway.clone(), state.accounts.clone(), tx);

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => handle_client_ws(incoming, &session),
              Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
            };
            if let Some(reply) = reply {
              if send(&mut socket, &reply).await.is_err() {
                break;
              }
            }
          }
          Message::Ping(payload) => {
            let _ = socket.send(Message::Pong(payload)).await;
          }
          Message::Close(_) => break,
          _ => {}
        }
      }
      Some(event) = events.recv() => {
        if send(&mut socket, &ServerWsMessage::from(event)).await.is_err() {
          break;
        }
      }
    }
  }

  session.shutdown();
  info!(target: "pymaster_backend", "WebSocket disconnected");
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await.map_err(|e| {
    error!(target: "pymaster_backend", error = %e, "WS send error");
    e
  })
}

/// Map a client message onto the session. Accepted actions answer through
/// session events, so only immediate replies and rejections come back here.
fn handle_client_ws(msg: ClientWsMessage, session: &GameSession) -> Option<ServerWsMessage> {
  debug!(target: "pymaster_backend", "WS received: {:?}", &msg);
  let action = match msg {
    ClientWsMessage::Ping => return Some(ServerWsMessage::Pong),
    ClientWsMessage::GetState => return Some(ServerWsMessage::State { state: session.snapshot() }),
    ClientWsMessage::Start { difficulty, language } => Action::Start { difficulty, language },
    ClientWsMessage::Restart => Action::Restart,
    ClientWsMessage::Submit { code } => Action::Submit { code },
    ClientWsMessage::Hint { code } => Action::RequestHint { code },
    ClientWsMessage::Skip => Action::Skip,
    ClientWsMessage::Pause => Action::Pause,
    ClientWsMessage::Resume => Action::Resume,
    ClientWsMessage::Quit => Action::Quit,
    ClientWsMessage::Reset => Action::Reset,
  };

  match session.dispatch(action) {
    Ok(()) => None,
    Err(e) => {
      warn!(target: "game", error = %e, "Action rejected");
      Some(ServerWsMessage::Error { message: e.to_string() })
    }
  }
}
