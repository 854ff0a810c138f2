//! Runtime configuration: environment settings plus optional prompt overrides
//! loaded from TOML.
//!
//! See `Settings` for the environment variables and `Prompts` for the TOML schema.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{error, info};

/// Process settings read from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  /// JSON file backing the account store. In-memory when unset.
  pub store_path: Option<PathBuf>,
  pub openai: Option<OpenAISettings>,
}

#[derive(Clone, Debug)]
pub struct OpenAISettings {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub timeout: Duration,
}

impl Settings {
  pub fn from_env() -> Self {
    let port = std::env::var("PORT")
      .ok()
      .and_then(|p| p.parse::<u16>().ok())
      .unwrap_or(3000);
    let store_path = std::env::var("STORE_PATH").ok().filter(|p| !p.is_empty()).map(PathBuf::from);
    Self { port, store_path, openai: OpenAISettings::from_env() }
  }
}

impl OpenAISettings {
  /// None when OPENAI_API_KEY is absent: the game then runs without an AI collaborator.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let timeout = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .map(Duration::from_secs)
      .unwrap_or(Duration::from_secs(60));
    Some(Self { api_key, base_url, model, timeout })
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts sent to the AI collaborator. Every field can be overridden in TOML;
/// missing fields keep their defaults.
///
/// Placeholders:
///   - syllabus: `{count}`, `{difficulty}`, `{language_instruction}`, `{level_guidance}`
///   - evaluation: `{title}`, `{description}`, `{code}`, `{points}`, `{language}`
///   - hint: `{description}`, `{code}`, `{language}`
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub syllabus_system: String,
  pub syllabus_user_template: String,
  pub evaluation_system: String,
  pub evaluation_user_template: String,
  pub hint_system: String,
  pub hint_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      syllabus_system: "You are a Python teacher designing coding exercises. Respond ONLY with strict JSON.".into(),
      syllabus_user_template: "Generate a syllabus of {count} Python coding challenges for a {difficulty} level student.\n{language_instruction}\n\nLevel Guidance for {difficulty}: {level_guidance}\n\nEach challenge should have:\n- A unique ID.\n- A clear description of the task.\n- Starter code (def function_name(): pass).\n- Points (100-300 based on difficulty).\n- 3-5 descriptive test cases (e.g., \"Input: 5 -> Output: 25\").\n- A reasonable time limit in seconds (60-300).\n\nReturn JSON: {\"challenges\": [{\"id\": string, \"title\": string, \"description\": string, \"starterCode\": string, \"points\": integer, \"testCases\": [string], \"timeLimit\": integer}]}".into(),
      evaluation_system: "Act as a Python code judge. Reply as compact JSON.".into(),
      evaluation_user_template: "Challenge: {title}\nDescription: {description}\nUser Code:\n```python\n{code}\n```\n\nTask:\n1. Check if the code runs without syntax errors.\n2. Check if it solves the problem described.\n3. Run strictly against hidden logical test cases based on the description.\n4. Return the simulated output of the code.\n\nIf Correct: Award {points} points.\nIf Incorrect: Award 0 points.\n\nFeedback Language: {language}.\n\nReturn JSON: {\"correct\": boolean, \"output\": string, \"feedback\": string, \"pointsAwarded\": integer}".into(),
      hint_system: "You are a patient Python tutor. Keep hints short and never give the full solution.".into(),
      hint_user_template: "The user is stuck on this Python challenge: \"{description}\".\nUser's current code:\n{code}\n\nProvide a short, helpful hint in {language}.\nDo not give the full solution.\nFocus on the logic or syntax error.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "pymaster_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "pymaster_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "pymaster_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_default_prompts() {
    let cfg: AgentConfig = toml::from_str(
      r#"
        [prompts]
        hint_system = "Be brief."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.hint_system, "Be brief.");
    assert_eq!(cfg.prompts.evaluation_system, Prompts::default().evaluation_system);
  }

  #[test]
  fn default_templates_carry_their_placeholders() {
    let p = Prompts::default();
    for key in ["{count}", "{difficulty}", "{language_instruction}", "{level_guidance}"] {
      assert!(p.syllabus_user_template.contains(key), "{key}");
    }
    for key in ["{title}", "{description}", "{code}", "{points}", "{language}"] {
      assert!(p.evaluation_user_template.contains(key), "{key}");
    }
    for key in ["{description}", "{code}", "{language}"] {
      assert!(p.hint_user_template.contains(key), "{key}");
    }
  }

  #[test]
  fn empty_config_is_valid() {
    let cfg: AgentConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.prompts.syllabus_system, Prompts::default().syllabus_system);
  }
}
