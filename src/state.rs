//! Application state shared by every handler: the account service over the
//! configured store, and the content gateway (with or without an AI model).

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::accounts::AccountService;
use crate::config::{load_agent_config_from_env, Settings};
use crate::gateway::{ContentGateway, ContentModel};
use crate::openai::OpenAI;
use crate::store::{FileStore, KeyValueStore, MemoryStore};

#[derive(Clone)]
pub struct AppState {
  pub accounts: AccountService,
  pub gateway: ContentGateway,
}

impl AppState {
  /// Build state from settings: pick the store, load prompts, init the AI client.
  #[instrument(level = "info", skip_all)]
  pub fn new(settings: &Settings) -> Self {
    let prompts = load_agent_config_from_env()
      .map(|c| c.prompts)
      .unwrap_or_default();

    let store: Arc<dyn KeyValueStore> = match &settings.store_path {
      Some(path) => {
        let fs = FileStore::new(path);
        info!(target: "pymaster_backend", path = %fs.path().display(), "Using file-backed account store");
        Arc::new(fs)
      }
      None => {
        info!(target: "pymaster_backend", "STORE_PATH not set; accounts live in memory only");
        Arc::new(MemoryStore::new())
      }
    };

    let model: Option<Arc<dyn ContentModel>> = match &settings.openai {
      Some(cfg) => match OpenAI::new(cfg) {
        Ok(oa) => {
          info!(target: "pymaster_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
          Some(Arc::new(oa))
        }
        Err(e) => {
          error!(target: "pymaster_backend", error = %e, "Failed to build OpenAI client; running without AI.");
          None
        }
      },
      None => {
        info!(target: "pymaster_backend", "OpenAI disabled (no OPENAI_API_KEY). Games cannot start until it is set.");
        None
      }
    };

    Self::from_parts(AccountService::new(store), ContentGateway::new(model, prompts))
  }

  pub fn from_parts(accounts: AccountService, gateway: ContentGateway) -> Self {
    Self { accounts, gateway }
  }
}
