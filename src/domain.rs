//! Domain models: difficulty tiers, content languages, challenges, evaluation
//! results, game history and the sanitized user record.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Difficulty tier chosen on the welcome screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
}

impl Difficulty {
  /// Topics the syllabus generator is steered towards for this tier.
  pub fn level_guidance(&self) -> &'static str {
    match self {
      Difficulty::Beginner => "Variables, Loops, Basic Functions.",
      Difficulty::Intermediate => "Lists, Dictionaries, String Manipulation, Basic Classes.",
      Difficulty::Advanced => "Complex Algorithms, OOP, Recursion, Error Handling.",
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Difficulty::Beginner => write!(f, "Beginner"),
      Difficulty::Intermediate => write!(f, "Intermediate"),
      Difficulty::Advanced => write!(f, "Advanced"),
    }
  }
}

/// Language used for challenge prose, feedback and hints.
/// Code and technical terms always stay in English/Python.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
  #[default]
  English,
  Hindi,
}

impl Language {
  pub fn content_instruction(&self) -> &'static str {
    match self {
      Language::English => "The content should be in English.",
      Language::Hindi => "The descriptions and titles should be in Hindi, but keep technical terms (like function names, class names, syntax) in English/Python.",
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Language::English => write!(f, "English"),
      Language::Hindi => write!(f, "Hindi"),
    }
  }
}

/// One coding challenge of a syllabus. Immutable once issued to a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
  pub id: String,
  pub title: String,
  pub description: String,
  pub starter_code: String,
  pub difficulty: Difficulty,
  pub points: u32,
  /// Human-readable test case descriptions, e.g. "Input: 5 -> Output: 25".
  pub test_cases: Vec<String>,
  /// Seconds.
  pub time_limit: u32,
}

/// Verdict for one run attempt. Not persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
  pub correct: bool,
  pub output: String,
  pub feedback: String,
  pub points_awarded: u32,
}

impl EvaluationResult {
  /// Result used when the grader could not be reached or answered garbage.
  pub fn system_error() -> Self {
    Self {
      correct: false,
      output: "System Error: Could not evaluate code.".into(),
      feedback: "Please try again.".into(),
      points_awarded: 0,
    }
  }
}

/// Record of one fully completed session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameHistory {
  pub id: String,
  /// RFC 3339, UTC.
  pub date: String,
  pub score: u64,
  pub difficulty: Difficulty,
  pub language: Language,
  pub max_score: u64,
}

impl GameHistory {
  pub fn new(score: u64, max_score: u64, difficulty: Difficulty, language: Language) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      date: Utc::now().to_rfc3339(),
      score,
      difficulty,
      language,
      max_score,
    }
  }
}

/// User record as handed out to callers. Never carries credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub email: String,
  pub name: String,
  pub total_points: u64,
  /// Most recent first.
  pub history: Vec<GameHistory>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn challenge_uses_camel_case_on_the_wire() {
    let ch = Challenge {
      id: "c1".into(),
      title: "Square".into(),
      description: "Return n squared".into(),
      starter_code: "def square(n):\n    pass".into(),
      difficulty: Difficulty::Beginner,
      points: 100,
      test_cases: vec!["Input: 5 -> Output: 25".into()],
      time_limit: 120,
    };
    let v = serde_json::to_value(&ch).unwrap();
    assert_eq!(v["starterCode"], "def square(n):\n    pass");
    assert_eq!(v["testCases"][0], "Input: 5 -> Output: 25");
    assert_eq!(v["timeLimit"], 120);
    assert_eq!(v["difficulty"], "Beginner");
  }

  #[test]
  fn system_error_result_awards_nothing() {
    let r = EvaluationResult::system_error();
    assert!(!r.correct);
    assert_eq!(r.points_awarded, 0);
    assert_eq!(r.feedback, "Please try again.");
  }

  #[test]
  fn history_entries_get_unique_ids() {
    let a = GameHistory::new(10, 100, Difficulty::Advanced, Language::Hindi);
    let b = GameHistory::new(10, 100, Difficulty::Advanced, Language::Hindi);
    assert_ne!(a.id, b.id);
    assert!(chrono::DateTime::parse_from_rfc3339(&a.date).is_ok());
  }
}
