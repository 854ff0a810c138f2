//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, EvaluationResult, Language, User};
use crate::game::GameState;
use crate::scoring::percentage;
use crate::session::SessionEvent;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  Start {
    difficulty: Difficulty,
    language: Language,
  },
  Restart,
  Submit {
    code: String,
  },
  Hint {
    #[serde(default)]
    code: String,
  },
  Skip,
  Pause,
  Resume,
  Quit,
  Reset,
  GetState,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  State {
    state: GameState,
  },
  Evaluation {
    result: EvaluationResult,
    #[serde(rename = "finalPoints")]
    final_points: Option<u32>,
    feedback: String,
  },
  Hint {
    text: String,
    #[serde(rename = "hintsUsed")]
    hints_used: u32,
  },
  Alert {
    message: String,
  },
  Completed {
    score: u64,
    #[serde(rename = "maxScore")]
    max_score: u64,
    percentage: u32,
    verdict: String,
    recorded: bool,
  },
  User {
    user: User,
  },
  Error {
    message: String,
  },
}

impl From<SessionEvent> for ServerWsMessage {
  fn from(ev: SessionEvent) -> Self {
    match ev {
      SessionEvent::State { state } => ServerWsMessage::State { state },
      SessionEvent::Alert { message } => ServerWsMessage::Alert { message },
      SessionEvent::Evaluated { result, final_points, feedback } => {
        ServerWsMessage::Evaluation { result, final_points, feedback }
      }
      SessionEvent::Hint { text, hints_used } => ServerWsMessage::Hint { text, hints_used },
      SessionEvent::Completed { score, max_score, percentage, verdict, recorded } => {
        ServerWsMessage::Completed { score, max_score, percentage, verdict: verdict.into(), recorded }
      }
      SessionEvent::UserUpdated { user } => ServerWsMessage::User { user },
    }
  }
}

//
// HTTP request/response DTOs
//

#[derive(Deserialize)]
pub struct SignupIn {
  pub email: String,
  pub password: String,
  pub name: String,
}

#[derive(Deserialize)]
pub struct LoginIn {
  pub email: String,
  pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOut {
  pub user: User,
  pub games_played: usize,
  pub best_score: u64,
  /// Mean of per-game percentages, rounded; 0 with no history.
  pub average_percentage: u32,
}

impl DashboardOut {
  pub fn from_user(user: User) -> Self {
    let games_played = user.history.len();
    let best_score = user.history.iter().map(|h| h.score).max().unwrap_or(0);
    let average_percentage = if games_played == 0 {
      0
    } else {
      let sum: u64 = user.history.iter().map(|h| u64::from(percentage(h.score, h.max_score))).sum();
      (sum as f64 / games_played as f64).round() as u32
    };
    Self { user, games_played, best_score, average_percentage }
  }
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
  /// Whether an AI collaborator is configured.
  pub ai: bool,
}
