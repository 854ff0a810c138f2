//! Drives one play session: feeds actions through the reducer, carries out the
//! resulting effects, and reports what happened on an event channel.
//!
//! The state lock is a plain mutex and is never held across an `.await`:
//! gateway calls run in spawned tasks that re-enter through `dispatch` with
//! the epoch they were issued under. The countdown is a task ticking once per
//! second; it only holds a weak reference so a dropped session stops it.

use std::{
  sync::{Arc, Mutex, MutexGuard, Weak},
  time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle, time::{interval_at, Instant, MissedTickBehavior}};
use tracing::{debug, error, info, instrument, warn};

use crate::accounts::AccountService;
use crate::domain::{EvaluationResult, GameHistory, User};
use crate::error::GameError;
use crate::game::{reduce, Action, Effect, GameState};
use crate::gateway::ContentGateway;
use crate::scoring::{percentage, verdict};

const TICK: Duration = Duration::from_secs(1);

/// What the session reports back to its client.
#[derive(Clone, Debug)]
pub enum SessionEvent {
  State { state: GameState },
  Alert { message: String },
  Evaluated { result: EvaluationResult, final_points: Option<u32>, feedback: String },
  Hint { text: String, hints_used: u32 },
  Completed { score: u64, max_score: u64, percentage: u32, verdict: &'static str, recorded: bool },
  UserUpdated { user: User },
}

pub struct GameSession {
  state: Mutex<GameState>,
  timer: Mutex<Option<JoinHandle<()>>>,
  gateway: ContentGateway,
  accounts: AccountService,
  events: mpsc::UnboundedSender<SessionEvent>,
  this: Weak<GameSession>,
}

impl GameSession {
  pub fn new(
    gateway: ContentGateway,
    accounts: AccountService,
    events: mpsc::UnboundedSender<SessionEvent>,
  ) -> Arc<Self> {
    Arc::new_cyclic(|this| Self {
      state: Mutex::new(GameState::default()),
      timer: Mutex::new(None),
      gateway,
      accounts,
      events,
      this: this.clone(),
    })
  }

  fn lock_state(&self) -> MutexGuard<'_, GameState> {
    self.state.lock().unwrap_or_else(|p| p.into_inner())
  }

  pub fn snapshot(&self) -> GameState {
    self.lock_state().clone()
  }

  /// Apply `action`. Rejected player actions come back as `GameError`; stale
  /// async results are dropped silently by the reducer.
  #[instrument(level = "debug", skip(self, action), fields(action = action_name(&action)))]
  pub fn dispatch(&self, action: Action) -> Result<(), GameError> {
    let mut state = self.lock_state();
    let transition = reduce(&state, action)?;
    let changed = transition.state != *state;
    *state = transition.state;

    // Effects run under the lock so events leave in the order states were produced.
    for effect in transition.effects {
      self.run(effect, &state);
    }
    if changed {
      self.emit(SessionEvent::State { state: state.clone() });
    }
    Ok(())
  }

  /// Stop the countdown. In-flight gateway calls finish but their results
  /// go nowhere once the client is gone.
  pub fn shutdown(&self) {
    self.disarm_timer();
  }

  fn emit(&self, event: SessionEvent) {
    if self.events.send(event).is_err() {
      debug!(target: "game", "Session event dropped: client gone");
    }
  }

  fn run(&self, effect: Effect, state: &GameState) {
    match effect {
      Effect::GenerateSyllabus { epoch, difficulty, language } => {
        let gateway = self.gateway.clone();
        self.spawn_continuation(async move {
          match gateway.generate_syllabus(difficulty, language).await {
            Ok(syllabus) => Action::SyllabusLoaded { epoch, syllabus },
            Err(e) => {
              let e = GameError::GenerationFailed(e);
              error!(target: "game", error = %e, "Cannot start session");
              Action::SyllabusFailed { epoch, message: e.to_string() }
            }
          }
        });
      }

      Effect::Evaluate { epoch, challenge, code, language } => {
        let gateway = self.gateway.clone();
        self.spawn_continuation(async move {
          let result = gateway.evaluate_code(&challenge, &code, language).await;
          Action::EvaluationReceived { epoch, result }
        });
      }

      Effect::FetchHint { epoch, challenge, code, language } => {
        let gateway = self.gateway.clone();
        self.spawn_continuation(async move {
          let text = gateway.get_hint(&challenge, &code, language).await;
          Action::HintReceived { epoch, text }
        });
      }

      Effect::ArmTimer { generation } => self.arm_timer(generation),
      Effect::DisarmTimer => self.disarm_timer(),

      Effect::Alert { message } => self.emit(SessionEvent::Alert { message }),
      Effect::Evaluated { result, final_points, feedback } => {
        self.emit(SessionEvent::Evaluated { result, final_points, feedback })
      }
      Effect::HintShown { text, hints_used } => self.emit(SessionEvent::Hint { text, hints_used }),

      Effect::Completed { score, max_score, difficulty, language, record } => {
        let pct = percentage(score, max_score);
        info!(target: "game", score, max_score, record, syllabus = state.syllabus.len(), "Session completed");
        let completed = move |recorded| SessionEvent::Completed {
          score,
          max_score,
          percentage: pct,
          verdict: verdict(pct),
          recorded,
        };
        if !record {
          self.emit(completed(false));
          return;
        }
        // The store may hit the disk: record off the state lock and the async workers.
        let item = GameHistory::new(score, max_score, difficulty, language);
        let this = self.this.clone();
        tokio::task::spawn_blocking(move || {
          let Some(session) = this.upgrade() else { return };
          let recorded = session.record_result(item);
          session.emit(completed(recorded));
        });
      }
    }
  }

  /// Persist a finished session for the signed-in user, if any.
  fn record_result(&self, item: GameHistory) -> bool {
    match self.accounts.current_user() {
      Ok(Some(_)) => {}
      Ok(None) => return false,
      Err(e) => {
        error!(target: "game", error = %e, "Cannot read session pointer; result not recorded");
        return false;
      }
    }
    if let Err(e) = self.accounts.save_game_result(item) {
      error!(target: "game", error = %e, "Failed to record game result");
      return false;
    }
    match self.accounts.current_user() {
      Ok(Some(user)) => self.emit(SessionEvent::UserUpdated { user }),
      Ok(None) => {}
      Err(e) => warn!(target: "game", error = %e, "Recorded result but could not refresh user"),
    }
    true
  }

  fn spawn_continuation<F>(&self, work: F)
  where
    F: std::future::Future<Output = Action> + Send + 'static,
  {
    let this = self.this.clone();
    tokio::spawn(async move {
      let action = work.await;
      let Some(session) = this.upgrade() else { return };
      if let Err(e) = session.dispatch(action) {
        warn!(target: "game", error = %e, "Async result rejected");
      }
    });
  }

  fn arm_timer(&self, generation: u64) {
    let this = self.this.clone();
    let handle = tokio::spawn(async move {
      let mut ticker = interval_at(Instant::now() + TICK, TICK);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let Some(session) = this.upgrade() else { break };
        if let Err(e) = session.dispatch(Action::Tick { generation }) {
          warn!(target: "game", error = %e, "Tick rejected");
        }
        let state = session.lock_state();
        if !state.timer_running() || state.timer_generation != generation {
          break;
        }
      }
    });
    let previous = self.timer.lock().unwrap_or_else(|p| p.into_inner()).replace(handle);
    if let Some(previous) = previous {
      previous.abort();
    }
  }

  fn disarm_timer(&self) {
    if let Some(handle) = self.timer.lock().unwrap_or_else(|p| p.into_inner()).take() {
      handle.abort();
    }
  }
}

impl Drop for GameSession {
  fn drop(&mut self) {
    self.disarm_timer();
  }
}

fn action_name(action: &Action) -> &'static str {
  match action {
    Action::Start { .. } => "start",
    Action::Restart => "restart",
    Action::SyllabusLoaded { .. } => "syllabus_loaded",
    Action::SyllabusFailed { .. } => "syllabus_failed",
    Action::Tick { .. } => "tick",
    Action::Pause => "pause",
    Action::Resume => "resume",
    Action::Submit { .. } => "submit",
    Action::EvaluationReceived { .. } => "evaluation_received",
    Action::RequestHint { .. } => "request_hint",
    Action::HintReceived { .. } => "hint_received",
    Action::Skip => "skip",
    Action::Quit => "quit",
    Action::Reset => "reset",
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::domain::{Difficulty, Language};
  use crate::game::GameStatus;
  use crate::gateway::testing::{gateway, syllabus_json, Reply, ScriptedModel};
  use crate::error::StoreError;
  use crate::store::{KeyValueStore, MemoryStore};

  /// Memory store whose next write blocks until the test lets it through.
  #[derive(Default)]
  struct GatedStore {
    inner: MemoryStore,
    gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
  }

  impl GatedStore {
    fn close(&self) -> std::sync::mpsc::Sender<()> {
      let (tx, rx) = std::sync::mpsc::channel();
      *self.gate.lock().unwrap() = Some(rx);
      tx
    }
  }

  impl KeyValueStore for GatedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
      let gate = self.gate.lock().unwrap().take();
      if let Some(rx) = gate {
        rx.recv().unwrap();
      }
      self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
      self.inner.remove(key)
    }
  }

  struct Harness {
    session: Arc<GameSession>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    accounts: AccountService,
    model: Arc<ScriptedModel>,
  }

  fn harness(replies: Vec<Reply>) -> Harness {
    harness_over(replies, Arc::new(MemoryStore::new()))
  }

  fn harness_over(replies: Vec<Reply>, store: Arc<dyn KeyValueStore>) -> Harness {
    let model = ScriptedModel::new(replies);
    let accounts = AccountService::new(store);
    let (tx, rx) = mpsc::unbounded_channel();
    let session = GameSession::new(gateway(model.clone()), accounts.clone(), tx);
    Harness { session, events: rx, accounts, model }
  }

  impl Harness {
    /// Wait for the first event matching `pred`, skipping the rest.
    async fn until(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
      loop {
        let ev = tokio::time::timeout(Duration::from_secs(3600), self.events.recv())
          .await
          .expect("timed out waiting for event")
          .expect("channel closed");
        if pred(&ev) {
          return ev;
        }
      }
    }

    async fn until_status(&mut self, status: GameStatus) -> GameState {
      match self.until(|e| matches!(e, SessionEvent::State { state } if state.status == status)).await {
        SessionEvent::State { state } => state,
        _ => unreachable!(),
      }
    }

    async fn start(&mut self) -> GameState {
      self.session
        .dispatch(Action::Start { difficulty: Difficulty::Beginner, language: Language::English })
        .unwrap();
      self.until_status(GameStatus::Playing).await
    }
  }

  fn verdict_json(correct: bool, points: u32) -> Reply {
    Reply::Json(json!({ "correct": correct, "output": "", "feedback": "fb", "pointsAwarded": points }))
  }

  #[tokio::test(start_paused = true)]
  async fn full_session_records_history_for_signed_in_user() {
    let mut h = harness(vec![Reply::Json(syllabus_json(2, 100, 60)), verdict_json(true, 100), verdict_json(true, 100)]);
    h.accounts.signup("ada@example.com", "secret", "Ada").unwrap();
    h.start().await;

    for _ in 0..2 {
      h.session.dispatch(Action::Submit { code: "def f(): ...".into() }).unwrap();
      h.until(|e| matches!(e, SessionEvent::Evaluated { .. })).await;
    }
    let done = h.until(|e| matches!(e, SessionEvent::Completed { .. })).await;
    assert!(matches!(done, SessionEvent::Completed { score: 200, max_score: 200, recorded: true, verdict: "Python Master!", .. }));

    let user = h.accounts.current_user().unwrap().unwrap();
    assert_eq!(user.total_points, 200);
    assert_eq!(user.history.len(), 1);
    assert_eq!(user.history[0].max_score, 200);
  }

  #[tokio::test(start_paused = true)]
  async fn slow_store_does_not_hold_the_session() {
    let store = Arc::new(GatedStore::default());
    let mut h = harness_over(vec![Reply::Json(syllabus_json(1, 100, 60)), verdict_json(true, 100)], store.clone());
    h.accounts.signup("ada@example.com", "secret", "Ada").unwrap();
    h.start().await;

    let release = store.close();
    h.session.dispatch(Action::Submit { code: "def f(): ...".into() }).unwrap();
    h.until_status(GameStatus::Completed).await;

    // The result write is parked, yet the session still answers.
    assert_eq!(h.session.snapshot().status, GameStatus::Completed);
    h.session.dispatch(Action::Reset).unwrap();

    release.send(()).unwrap();
    let done = h.until(|e| matches!(e, SessionEvent::Completed { .. })).await;
    assert!(matches!(done, SessionEvent::Completed { score: 100, recorded: true, .. }));
    assert_eq!(h.accounts.current_user().unwrap().unwrap().total_points, 100);
  }

  #[tokio::test(start_paused = true)]
  async fn anonymous_sessions_are_not_recorded() {
    let mut h = harness(vec![Reply::Json(syllabus_json(1, 100, 60))]);
    h.start().await;
    h.session.dispatch(Action::Skip).unwrap();
    let done = h.until(|e| matches!(e, SessionEvent::Completed { .. })).await;
    assert!(matches!(done, SessionEvent::Completed { recorded: false, .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn quitting_records_nothing_even_when_signed_in() {
    let mut h = harness(vec![Reply::Json(syllabus_json(3, 100, 60))]);
    h.accounts.signup("ada@example.com", "secret", "Ada").unwrap();
    h.start().await;
    h.session.dispatch(Action::Quit).unwrap();
    let done = h.until(|e| matches!(e, SessionEvent::Completed { .. })).await;
    assert!(matches!(done, SessionEvent::Completed { recorded: false, .. }));
    assert!(h.accounts.current_user().unwrap().unwrap().history.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn generation_failure_alerts_and_returns_to_idle() {
    let mut h = harness(vec![Reply::Json(json!({ "challenges": [] }))]);
    h.session
      .dispatch(Action::Start { difficulty: Difficulty::Beginner, language: Language::English })
      .unwrap();
    let alert = h.until(|e| matches!(e, SessionEvent::Alert { .. })).await;
    assert!(matches!(alert, SessionEvent::Alert { message } if message.contains("Failed to generate")));
    assert_eq!(h.until_status(GameStatus::Idle).await.syllabus.len(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn countdown_skips_exactly_once_on_timeout() {
    let mut h = harness(vec![Reply::Json(syllabus_json(2, 100, 3))]);
    h.start().await;

    // Paused clock auto-advances while we wait.
    let next = h.until(|e| matches!(e, SessionEvent::State { state } if state.current_question_index == 1)).await;
    let SessionEvent::State { state } = next else { unreachable!() };
    assert_eq!(state.time_left, 3);
    assert_eq!(state.status, GameStatus::Playing);

    let done = h.until_status(GameStatus::Completed).await;
    assert_eq!(done.current_question_index, 2);
    assert_eq!(done.score, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn pause_holds_the_clock() {
    let mut h = harness(vec![Reply::Json(syllabus_json(1, 100, 5))]);
    h.start().await;
    h.session.dispatch(Action::Pause).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    let s = h.session.snapshot();
    assert_eq!(s.status, GameStatus::Playing);
    assert_eq!(s.time_left, 5);

    h.session.dispatch(Action::Resume).unwrap();
    h.until_status(GameStatus::Completed).await;
  }

  #[tokio::test(start_paused = true)]
  async fn hint_limit_is_enforced_before_contacting_the_model() {
    let mut h = harness(vec![
      Reply::Json(syllabus_json(1, 100, 600)),
      Reply::Text("one".into()),
      Reply::Text("two".into()),
      Reply::Text("three".into()),
    ]);
    h.start().await;
    for _ in 0..3 {
      h.session.dispatch(Action::RequestHint { code: String::new() }).unwrap();
      h.until(|e| matches!(e, SessionEvent::Hint { .. })).await;
    }
    let calls = h.model.calls();
    let err = h.session.dispatch(Action::RequestHint { code: String::new() }).unwrap_err();
    assert!(matches!(err, GameError::HintLimitReached { .. }));
    assert_eq!(h.model.calls(), calls);
  }

  #[tokio::test(start_paused = true)]
  async fn evaluation_outage_keeps_the_session_alive() {
    let mut h = harness(vec![Reply::Json(syllabus_json(2, 100, 600))]);
    h.start().await;
    h.session.dispatch(Action::Submit { code: "x".into() }).unwrap();
    let ev = h.until(|e| matches!(e, SessionEvent::Evaluated { .. })).await;
    assert!(matches!(ev, SessionEvent::Evaluated { final_points: None, result, .. } if result == EvaluationResult::system_error()));
    let s = h.session.snapshot();
    assert_eq!(s.status, GameStatus::Playing);
    assert_eq!(s.current_question_index, 0);
    assert!(!s.progress.evaluating);
  }
}
