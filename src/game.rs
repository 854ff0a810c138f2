//! Game state machine as a pure reducer.
//!
//! `reduce(&state, action)` never mutates its input: it returns the next state
//! plus a list of effects for the driver (`session.rs`) to carry out. Every
//! asynchronous effect carries the `epoch` it was issued under and its result
//! is dropped when the session has moved on since. Countdown ticks carry the
//! `timer_generation` of the timer that produced them.
//!
//! Status flow: idle -> loading -> {playing | idle} -> completed -> (reset) -> idle.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Challenge, Difficulty, EvaluationResult, Language};
use crate::error::GameError;
use crate::scoring::{final_points, max_score, MAX_HINTS};

pub const GENERATION_FAILED_ALERT: &str =
  "Failed to generate course content. Please check API Key or try again.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
  #[default]
  Idle,
  Loading,
  Playing,
  Completed,
}

impl GameStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      GameStatus::Idle => "idle",
      GameStatus::Loading => "loading",
      GameStatus::Playing => "playing",
      GameStatus::Completed => "completed",
    }
  }
}

/// Per-challenge bookkeeping; cleared whenever the active challenge changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeProgress {
  pub hints_used: u32,
  pub hint_pending: bool,
  pub evaluating: bool,
  pub last_result: Option<EvaluationResult>,
  pub last_hint: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
  pub status: GameStatus,
  pub current_question_index: usize,
  pub score: u64,
  pub syllabus: Vec<Challenge>,
  pub time_left: u32,
  pub language: Language,
  pub difficulty: Difficulty,
  pub is_paused: bool,
  pub progress: ChallengeProgress,
  #[serde(skip)]
  pub epoch: u64,
  #[serde(skip)]
  pub timer_generation: u64,
}

impl GameState {
  pub fn current_challenge(&self) -> Option<&Challenge> {
    match self.status {
      GameStatus::Playing => self.syllabus.get(self.current_question_index),
      _ => None,
    }
  }

  pub fn max_score(&self) -> u64 {
    max_score(&self.syllabus)
  }

  /// True while the countdown for the current challenge should be running.
  pub fn timer_running(&self) -> bool {
    self.status == GameStatus::Playing && !self.is_paused
  }
}

#[derive(Clone, Debug)]
pub enum Action {
  Start { difficulty: Difficulty, language: Language },
  /// Start again with the settings of the session that just completed.
  Restart,
  SyllabusLoaded { epoch: u64, syllabus: Vec<Challenge> },
  SyllabusFailed { epoch: u64, message: String },
  Tick { generation: u64 },
  Pause,
  Resume,
  Submit { code: String },
  EvaluationReceived { epoch: u64, result: EvaluationResult },
  RequestHint { code: String },
  HintReceived { epoch: u64, text: String },
  Skip,
  Quit,
  Reset,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
  GenerateSyllabus { epoch: u64, difficulty: Difficulty, language: Language },
  Evaluate { epoch: u64, challenge: Challenge, code: String, language: Language },
  FetchHint { epoch: u64, challenge: Challenge, code: String, language: Language },
  ArmTimer { generation: u64 },
  DisarmTimer,
  Alert { message: String },
  Evaluated { result: EvaluationResult, final_points: Option<u32>, feedback: String },
  HintShown { text: String, hints_used: u32 },
  /// The session reached `completed`. `record` is false for a forced quit.
  Completed { score: u64, max_score: u64, difficulty: Difficulty, language: Language, record: bool },
}

#[derive(Debug)]
pub struct Transition {
  pub state: GameState,
  pub effects: Vec<Effect>,
}

pub fn reduce(state: &GameState, action: Action) -> Result<Transition, GameError> {
  let mut next = state.clone();
  let mut effects = Vec::new();

  match action {
    Action::Start { difficulty, language } => {
      if !matches!(state.status, GameStatus::Idle | GameStatus::Completed) {
        return Err(GameError::invalid_transition(state.status.as_str(), "start"));
      }
      begin_loading(&mut next, difficulty, language, &mut effects);
    }

    Action::Restart => {
      if state.status != GameStatus::Completed {
        return Err(GameError::invalid_transition(state.status.as_str(), "restart"));
      }
      begin_loading(&mut next, state.difficulty, state.language, &mut effects);
    }

    Action::SyllabusLoaded { epoch, syllabus } => {
      if state.status != GameStatus::Loading || epoch != state.epoch {
        debug!(target: "game", epoch, current = state.epoch, "Dropping stale syllabus");
      } else if let Some(first) = syllabus.first() {
        next.status = GameStatus::Playing;
        next.time_left = first.time_limit;
        next.syllabus = syllabus;
        next.current_question_index = 0;
        next.score = 0;
        next.is_paused = false;
        next.progress = ChallengeProgress::default();
        next.epoch += 1;
        arm_timer(&mut next, &mut effects);
      } else {
        next.status = GameStatus::Idle;
        effects.push(Effect::Alert { message: GENERATION_FAILED_ALERT.into() });
      }
    }

    Action::SyllabusFailed { epoch, message } => {
      if state.status == GameStatus::Loading && epoch == state.epoch {
        debug!(target: "game", %message, "Syllabus generation failed");
        next.status = GameStatus::Idle;
        next.epoch += 1;
        effects.push(Effect::Alert { message: GENERATION_FAILED_ALERT.into() });
      }
    }

    Action::Tick { generation } => {
      if state.timer_running() && generation == state.timer_generation && state.time_left > 0 {
        next.time_left -= 1;
        if next.time_left == 0 {
          debug!(target: "game", index = state.current_question_index, "Time is up");
          advance(&mut next, 0, true, &mut effects);
        }
      }
    }

    Action::Pause => {
      require_playing(state, "pause")?;
      if !state.is_paused {
        next.is_paused = true;
        next.timer_generation += 1;
        effects.push(Effect::DisarmTimer);
      }
    }

    Action::Resume => {
      require_playing(state, "resume")?;
      if state.is_paused {
        next.is_paused = false;
        arm_timer(&mut next, &mut effects);
      }
    }

    Action::Submit { code } => {
      let challenge = require_active(state, "submit")?;
      if state.progress.evaluating {
        return Err(GameError::Busy);
      }
      next.progress.evaluating = true;
      effects.push(Effect::Evaluate {
        epoch: state.epoch,
        challenge: challenge.clone(),
        code,
        language: state.language,
      });
    }

    Action::EvaluationReceived { epoch, result } => {
      let fresh = epoch == state.epoch && state.progress.evaluating;
      match state.current_challenge() {
        Some(challenge) if fresh => {
          next.progress.evaluating = false;
          if result.correct {
            let points = final_points(result.points_awarded, state.progress.hints_used, challenge.points);
            effects.push(Effect::Evaluated {
              feedback: format!("Success! +{points} XP"),
              result,
              final_points: Some(points),
            });
            advance(&mut next, points, false, &mut effects);
          } else {
            effects.push(Effect::Evaluated {
              feedback: result.feedback.clone(),
              result: result.clone(),
              final_points: None,
            });
            next.progress.last_result = Some(result);
          }
        }
        _ => debug!(target: "game", epoch, current = state.epoch, "Dropping stale evaluation"),
      }
    }

    Action::RequestHint { code } => {
      let challenge = require_active(state, "request a hint")?;
      if state.progress.hints_used >= MAX_HINTS {
        return Err(GameError::HintLimitReached { max: MAX_HINTS });
      }
      if state.progress.hint_pending {
        return Err(GameError::Busy);
      }
      next.progress.hint_pending = true;
      effects.push(Effect::FetchHint {
        epoch: state.epoch,
        challenge: challenge.clone(),
        code,
        language: state.language,
      });
    }

    Action::HintReceived { epoch, text } => {
      if state.status == GameStatus::Playing && epoch == state.epoch && state.progress.hint_pending {
        next.progress.hint_pending = false;
        next.progress.hints_used += 1;
        next.progress.last_hint = Some(text.clone());
        effects.push(Effect::HintShown { text, hints_used: next.progress.hints_used });
      } else {
        debug!(target: "game", epoch, current = state.epoch, "Dropping stale hint");
      }
    }

    Action::Skip => {
      require_active(state, "skip")?;
      advance(&mut next, 0, true, &mut effects);
    }

    Action::Quit => {
      require_playing(state, "quit")?;
      next.status = GameStatus::Completed;
      next.time_left = 0;
      next.is_paused = false;
      next.progress = ChallengeProgress::default();
      next.epoch += 1;
      next.timer_generation += 1;
      effects.push(Effect::DisarmTimer);
      effects.push(Effect::Completed {
        score: next.score,
        max_score: next.max_score(),
        difficulty: next.difficulty,
        language: next.language,
        record: false,
      });
    }

    Action::Reset => {
      next = GameState {
        epoch: state.epoch + 1,
        timer_generation: state.timer_generation + 1,
        ..GameState::default()
      };
      effects.push(Effect::DisarmTimer);
    }
  }

  Ok(Transition { state: next, effects })
}

fn begin_loading(next: &mut GameState, difficulty: Difficulty, language: Language, effects: &mut Vec<Effect>) {
  next.status = GameStatus::Loading;
  next.difficulty = difficulty;
  next.language = language;
  next.syllabus.clear();
  next.current_question_index = 0;
  next.score = 0;
  next.time_left = 0;
  next.is_paused = false;
  next.progress = ChallengeProgress::default();
  next.epoch += 1;
  next.timer_generation += 1;
  effects.push(Effect::DisarmTimer);
  effects.push(Effect::GenerateSyllabus { epoch: next.epoch, difficulty, language });
}

fn arm_timer(next: &mut GameState, effects: &mut Vec<Effect>) {
  next.timer_generation += 1;
  effects.push(Effect::ArmTimer { generation: next.timer_generation });
}

/// Move past the current challenge, crediting `points`.
fn advance(next: &mut GameState, points: u32, skipped: bool, effects: &mut Vec<Effect>) {
  debug!(target: "game", index = next.current_question_index, points, skipped, "Advancing");
  next.score += u64::from(points);
  next.current_question_index += 1;
  next.progress = ChallengeProgress::default();
  next.is_paused = false;
  next.epoch += 1;

  if let Some(challenge) = next.syllabus.get(next.current_question_index) {
    next.time_left = challenge.time_limit;
    arm_timer(next, effects);
  } else {
    next.status = GameStatus::Completed;
    next.time_left = 0;
    next.timer_generation += 1;
    effects.push(Effect::DisarmTimer);
    effects.push(Effect::Completed {
      score: next.score,
      max_score: next.max_score(),
      difficulty: next.difficulty,
      language: next.language,
      record: true,
    });
  }
}

fn require_playing(state: &GameState, action: &'static str) -> Result<(), GameError> {
  if state.status == GameStatus::Playing {
    Ok(())
  } else {
    Err(GameError::invalid_transition(state.status.as_str(), action))
  }
}

/// The current challenge, if the player may act on it right now.
fn require_active<'a>(state: &'a GameState, action: &'static str) -> Result<&'a Challenge, GameError> {
  require_playing(state, action)?;
  if state.is_paused {
    return Err(GameError::Paused);
  }
  state
    .current_challenge()
    .ok_or_else(|| GameError::invalid_transition(state.status.as_str(), action))
}
