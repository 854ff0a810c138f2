//! Content gateway: builds prompts for the AI collaborator and turns its
//! untrusted replies into typed records.
//!
//! This includes:
//!   - Syllabus generation (fails loudly: the session cannot start without it)
//!   - Code evaluation (never fails: degrades to a system-error verdict)
//!   - Hints (never fail: degrade to a fixed fallback text)
//!
//! Grading is delegated to a sampled language model, so identical submissions
//! may receive different verdicts across runs.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{Challenge, Difficulty, EvaluationResult, Language};
use crate::error::GatewayError;
use crate::util::fill_template;

/// Challenges requested per session.
pub const SYLLABUS_SIZE: usize = 5;

pub const NO_HINT: &str = "No hint available.";

const SYLLABUS_TEMPERATURE: f32 = 0.7;
const EVALUATION_TEMPERATURE: f32 = 0.2;
const HINT_TEMPERATURE: f32 = 0.7;

/// The external model. Implemented by `openai::OpenAI` and by test doubles.
#[async_trait]
pub trait ContentModel: Send + Sync {
  async fn complete_json(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<serde_json::Value, GatewayError>;

  async fn complete_text(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, GatewayError>;
}

#[derive(Clone)]
pub struct ContentGateway {
  model: Option<Arc<dyn ContentModel>>,
  prompts: Prompts,
}

#[derive(Deserialize)]
struct SyllabusWire {
  challenges: Vec<ChallengeWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeWire {
  #[serde(default)]
  id: Option<serde_json::Value>,
  title: String,
  description: String,
  #[serde(default)]
  starter_code: String,
  points: f64,
  #[serde(default)]
  test_cases: Vec<String>,
  time_limit: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationWire {
  correct: bool,
  #[serde(default)]
  output: String,
  #[serde(default)]
  feedback: String,
  #[serde(default)]
  points_awarded: f64,
}

impl ContentGateway {
  pub fn new(model: Option<Arc<dyn ContentModel>>, prompts: Prompts) -> Self {
    Self { model, prompts }
  }

  pub fn is_enabled(&self) -> bool {
    self.model.is_some()
  }

  fn model(&self) -> Result<&dyn ContentModel, GatewayError> {
    self.model.as_deref().ok_or(GatewayError::Disabled)
  }

  /// Ask for a fresh syllabus of `SYLLABUS_SIZE` challenges.
  #[instrument(level = "info", skip(self), fields(%difficulty, %language))]
  pub async fn generate_syllabus(
    &self,
    difficulty: Difficulty,
    language: Language,
  ) -> Result<Vec<Challenge>, GatewayError> {
    let model = self.model()?;
    let count = SYLLABUS_SIZE.to_string();
    let user = fill_template(
      &self.prompts.syllabus_user_template,
      &[
        ("count", &count),
        ("difficulty", &difficulty.to_string()),
        ("language_instruction", language.content_instruction()),
        ("level_guidance", difficulty.level_guidance()),
      ],
    );
    let value = model
      .complete_json(&self.prompts.syllabus_system, &user, SYLLABUS_TEMPERATURE)
      .await?;
    let syllabus = parse_syllabus(value, difficulty)?;
    info!(target: "game", count = syllabus.len(), "Syllabus generated");
    Ok(syllabus)
  }

  /// Grade `code` against `challenge`. Any failure becomes a non-fatal
  /// system-error verdict.
  #[instrument(level = "info", skip(self, challenge, code), fields(challenge_id = %challenge.id, code_len = code.len(), %language))]
  pub async fn evaluate_code(
    &self,
    challenge: &Challenge,
    code: &str,
    language: Language,
  ) -> EvaluationResult {
    match self.try_evaluate(challenge, code, language).await {
      Ok(r) => {
        info!(target: "game", correct = r.correct, points = r.points_awarded, "Submission graded");
        r
      }
      Err(e) => {
        error!(target: "game", error = %e, "Evaluation failed; returning system error verdict");
        EvaluationResult::system_error()
      }
    }
  }

  async fn try_evaluate(
    &self,
    challenge: &Challenge,
    code: &str,
    language: Language,
  ) -> Result<EvaluationResult, GatewayError> {
    let model = self.model()?;
    let points = challenge.points.to_string();
    let user = fill_template(
      &self.prompts.evaluation_user_template,
      &[
        ("points", &points),
        ("language", &language.to_string()),
        ("title", &challenge.title),
        ("description", &challenge.description),
        ("code", code),
      ],
    );
    let value = model
      .complete_json(&self.prompts.evaluation_system, &user, EVALUATION_TEMPERATURE)
      .await?;
    parse_evaluation(value, challenge.points)
  }

  /// A short hint for `challenge`. Falls back to `NO_HINT`.
  #[instrument(level = "info", skip(self, challenge, code), fields(challenge_id = %challenge.id, code_len = code.len(), %language))]
  pub async fn get_hint(&self, challenge: &Challenge, code: &str, language: Language) -> String {
    let model = match self.model() {
      Ok(m) => m,
      Err(_) => return NO_HINT.into(),
    };
    let user = fill_template(
      &self.prompts.hint_user_template,
      &[
        ("language", &language.to_string()),
        ("description", &challenge.description),
        ("code", code),
      ],
    );
    match model.complete_text(&self.prompts.hint_system, &user, HINT_TEMPERATURE).await {
      Ok(t) if !t.trim().is_empty() => t.trim().to_string(),
      Ok(_) => {
        warn!(target: "game", "Empty hint from model; using fallback");
        NO_HINT.into()
      }
      Err(e) => {
        error!(target: "game", error = %e, "Hint request failed; using fallback");
        NO_HINT.into()
      }
    }
  }
}

/// Accepts `{"challenges": [...]}` or a bare array.
fn parse_syllabus(value: serde_json::Value, difficulty: Difficulty) -> Result<Vec<Challenge>, GatewayError> {
  let items = if value.is_array() {
    serde_json::from_value::<Vec<ChallengeWire>>(value)
  } else {
    serde_json::from_value::<SyllabusWire>(value).map(|w| w.challenges)
  }
  .map_err(|e| GatewayError::InvalidShape(e.to_string()))?;

  if items.is_empty() {
    return Err(GatewayError::InvalidShape("syllabus contains no challenges".into()));
  }

  let mut seen = HashSet::new();
  let mut out = Vec::with_capacity(SYLLABUS_SIZE);
  for (i, w) in items.into_iter().take(SYLLABUS_SIZE).enumerate() {
    if w.title.trim().is_empty() {
      return Err(GatewayError::InvalidShape(format!("challenge {i} has no title")));
    }
    if !(w.points >= 1.0) {
      return Err(GatewayError::InvalidShape(format!("challenge {i} has non-positive points")));
    }
    if !(w.time_limit >= 1.0) {
      return Err(GatewayError::InvalidShape(format!("challenge {i} has non-positive time limit")));
    }
    let id = match w.id {
      Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
      Some(serde_json::Value::Number(n)) => n.to_string(),
      _ => Uuid::new_v4().to_string(),
    };
    let id = if seen.insert(id.clone()) { id } else {
      let fresh = Uuid::new_v4().to_string();
      seen.insert(fresh.clone());
      fresh
    };
    out.push(Challenge {
      id,
      title: w.title,
      description: w.description,
      starter_code: w.starter_code,
      difficulty,
      points: w.points.floor().min(u32::MAX as f64) as u32,
      test_cases: w.test_cases,
      time_limit: w.time_limit.floor().min(u32::MAX as f64) as u32,
    });
  }
  Ok(out)
}

/// Wrong answers award nothing; right ones at most the challenge's value.
fn parse_evaluation(value: serde_json::Value, max_points: u32) -> Result<EvaluationResult, GatewayError> {
  let w: EvaluationWire =
    serde_json::from_value(value).map_err(|e| GatewayError::InvalidShape(e.to_string()))?;
  let points_awarded = if w.correct && w.points_awarded.is_finite() {
    w.points_awarded.floor().clamp(0.0, max_points as f64) as u32
  } else {
    0
  };
  Ok(EvaluationResult {
    correct: w.correct,
    output: w.output,
    feedback: w.feedback,
    points_awarded,
  })
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted stand-in for the AI collaborator.

  use std::collections::VecDeque;
  use std::sync::Mutex;

  use super::*;

  pub enum Reply {
    Json(serde_json::Value),
    Text(String),
    Fail(GatewayError),
  }

  #[derive(Default)]
  pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    pub prompts: Mutex<Vec<String>>,
  }

  impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
      Arc::new(Self { replies: Mutex::new(replies.into()), prompts: Mutex::default() })
    }

    pub fn push(&self, reply: Reply) {
      self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
      self.prompts.lock().unwrap().len()
    }

    fn next(&self, user: &str) -> Reply {
      self.prompts.lock().unwrap().push(user.to_string());
      self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Fail(GatewayError::EmptyResponse))
    }
  }

  #[async_trait]
  impl ContentModel for ScriptedModel {
    async fn complete_json(&self, _: &str, user: &str, _: f32) -> Result<serde_json::Value, GatewayError> {
      match self.next(user) {
        Reply::Json(v) => Ok(v),
        Reply::Text(t) => serde_json::from_str(&t).map_err(|e| GatewayError::Parse(e.to_string())),
        Reply::Fail(e) => Err(e),
      }
    }

    async fn complete_text(&self, _: &str, user: &str, _: f32) -> Result<String, GatewayError> {
      match self.next(user) {
        Reply::Json(v) => Ok(v.to_string()),
        Reply::Text(t) => Ok(t),
        Reply::Fail(e) => Err(e),
      }
    }
  }

  pub fn challenge_json(id: &str, points: u32, time_limit: u32) -> serde_json::Value {
    serde_json::json!({
      "id": id,
      "title": format!("Challenge {id}"),
      "description": "Return the square of n.",
      "starterCode": "def square(n):\n    pass",
      "points": points,
      "testCases": ["Input: 5 -> Output: 25"],
      "timeLimit": time_limit,
    })
  }

  pub fn syllabus_json(n: usize, points: u32, time_limit: u32) -> serde_json::Value {
    let items: Vec<_> = (0..n).map(|i| challenge_json(&format!("c{i}"), points, time_limit)).collect();
    serde_json::json!({ "challenges": items })
  }

  pub fn gateway(model: Arc<ScriptedModel>) -> ContentGateway {
    ContentGateway::new(Some(model), Prompts::default())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::testing::*;
  use super::*;

  fn sample_challenge() -> Challenge {
    Challenge {
      id: "c0".into(),
      title: "Square".into(),
      description: "Return the square of n.".into(),
      starter_code: "def square(n):\n    pass".into(),
      difficulty: Difficulty::Beginner,
      points: 100,
      test_cases: vec![],
      time_limit: 60,
    }
  }

  #[tokio::test]
  async fn syllabus_is_typed_and_tagged_with_requested_difficulty() {
    let model = ScriptedModel::new(vec![Reply::Json(syllabus_json(5, 150, 90))]);
    let gw = gateway(model.clone());
    let syllabus = gw.generate_syllabus(Difficulty::Advanced, Language::Hindi).await.unwrap();
    assert_eq!(syllabus.len(), 5);
    assert!(syllabus.iter().all(|c| c.difficulty == Difficulty::Advanced));
    assert_eq!(syllabus[0].points, 150);
    assert_eq!(syllabus[0].time_limit, 90);

    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("5 Python coding challenges"));
    assert!(prompt.contains("Advanced"));
    assert!(prompt.contains("Hindi"));
    assert!(prompt.contains("Recursion"));
  }

  #[tokio::test]
  async fn syllabus_accepts_bare_arrays_and_truncates() {
    let items: Vec<_> = (0..7).map(|i| challenge_json(&format!("c{i}"), 100, 60)).collect();
    let model = ScriptedModel::new(vec![Reply::Json(json!(items))]);
    let syllabus = gateway(model).generate_syllabus(Difficulty::Beginner, Language::English).await.unwrap();
    assert_eq!(syllabus.len(), SYLLABUS_SIZE);
  }

  #[tokio::test]
  async fn syllabus_failures_are_reported() {
    let model = ScriptedModel::new(vec![
      Reply::Fail(GatewayError::Transport("connection refused".into())),
      Reply::Json(json!({ "challenges": [] })),
      Reply::Json(json!({ "lessons": "nope" })),
      Reply::Json(json!({ "challenges": [challenge_json("a", 0, 60)] })),
      Reply::Text("not json at all".into()),
    ]);
    let gw = gateway(model);
    for _ in 0..5 {
      assert!(gw.generate_syllabus(Difficulty::Beginner, Language::English).await.is_err());
    }
  }

  #[tokio::test]
  async fn disabled_gateway_cannot_generate() {
    let gw = ContentGateway::new(None, Prompts::default());
    let err = gw.generate_syllabus(Difficulty::Beginner, Language::English).await.unwrap_err();
    assert!(matches!(err, GatewayError::Disabled));
  }

  #[test]
  fn duplicate_and_missing_ids_are_replaced() {
    let mut a = challenge_json("dup", 100, 60);
    let b = challenge_json("dup", 100, 60);
    a.as_object_mut().unwrap().remove("id");
    let out = parse_syllabus(json!([a, b.clone(), b]), Difficulty::Beginner).unwrap();
    let ids: HashSet<_> = out.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains("dup"));
  }

  #[tokio::test]
  async fn evaluation_clamps_awarded_points() {
    let model = ScriptedModel::new(vec![
      Reply::Json(json!({ "correct": true, "output": "25", "feedback": "ok", "pointsAwarded": 999 })),
      Reply::Json(json!({ "correct": false, "output": "", "feedback": "wrong", "pointsAwarded": 100 })),
      Reply::Json(json!({ "correct": true, "output": "", "feedback": "", "pointsAwarded": -5 })),
    ]);
    let gw = gateway(model);
    let ch = sample_challenge();
    assert_eq!(gw.evaluate_code(&ch, "x", Language::English).await.points_awarded, 100);
    assert_eq!(gw.evaluate_code(&ch, "x", Language::English).await.points_awarded, 0);
    assert_eq!(gw.evaluate_code(&ch, "x", Language::English).await.points_awarded, 0);
  }

  #[tokio::test]
  async fn evaluation_failures_degrade_to_system_error() {
    let model = ScriptedModel::new(vec![
      Reply::Fail(GatewayError::Http { status: 500, message: "boom".into() }),
      Reply::Json(json!({ "verdict": "yes" })),
    ]);
    let gw = gateway(model);
    let ch = sample_challenge();
    assert_eq!(gw.evaluate_code(&ch, "x", Language::English).await, EvaluationResult::system_error());
    assert_eq!(gw.evaluate_code(&ch, "x", Language::English).await, EvaluationResult::system_error());

    let disabled = ContentGateway::new(None, Prompts::default());
    assert_eq!(disabled.evaluate_code(&ch, "x", Language::English).await, EvaluationResult::system_error());
  }

  #[tokio::test]
  async fn user_code_is_embedded_verbatim() {
    let model = ScriptedModel::new(vec![Reply::Json(json!({ "correct": true, "pointsAwarded": 100 }))]);
    let gw = gateway(model.clone());
    gw.evaluate_code(&sample_challenge(), "print('{title}')", Language::English).await;
    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("print('{title}')"));
    assert!(prompt.contains("Award 100 points"));
  }

  #[tokio::test]
  async fn hints_fall_back_when_empty_or_failing() {
    let model = ScriptedModel::new(vec![
      Reply::Text("  Use the ** operator.  ".into()),
      Reply::Text("   ".into()),
      Reply::Fail(GatewayError::EmptyResponse),
    ]);
    let gw = gateway(model);
    let ch = sample_challenge();
    assert_eq!(gw.get_hint(&ch, "", Language::English).await, "Use the ** operator.");
    assert_eq!(gw.get_hint(&ch, "", Language::English).await, NO_HINT);
    assert_eq!(gw.get_hint(&ch, "", Language::English).await, NO_HINT);
  }
}
