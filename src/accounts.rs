//! Account shim over a key-value store: signup/login/logout, the current
//! session pointer, and recording finished games.
//!
//! Layout inside the store (fixed keys, no versioning):
//!   - `pymaster_users`        : JSON object, email -> stored user (with credentials)
//!   - `pymaster_current_user` : email of the signed-in user
//!
//! Nothing is cached; every call re-reads the store. Writers that read the user
//! table and write it back hold `write_lock` for the whole round trip, so
//! concurrent sessions never overwrite each other's results. Stored
//! credentials never leave this module: callers only ever see `domain::User`.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex, MutexGuard},
};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::domain::{GameHistory, User};
use crate::error::{AuthError, StoreError};
use crate::store::KeyValueStore;

const STORAGE_KEY_USERS: &str = "pymaster_users";
const STORAGE_KEY_CURRENT: &str = "pymaster_current_user";

const SALT_LEN: usize = 16;
const HASH_ROUNDS: u32 = 10_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUser {
  email: String,
  name: String,
  password_hash: String,
  salt: String,
  #[serde(default)]
  total_points: u64,
  #[serde(default)]
  history: Vec<GameHistory>,
}

impl StoredUser {
  fn sanitized(&self) -> User {
    User {
      email: self.email.clone(),
      name: self.name.clone(),
      total_points: self.total_points,
      history: self.history.clone(),
    }
  }
}

type UserTable = BTreeMap<String, StoredUser>;

#[derive(Clone)]
pub struct AccountService {
  store: Arc<dyn KeyValueStore>,
  write_lock: Arc<Mutex<()>>,
}

impl AccountService {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store, write_lock: Arc::new(Mutex::new(())) }
  }

  fn lock_writes(&self) -> MutexGuard<'_, ()> {
    self.write_lock.lock().unwrap_or_else(|p| p.into_inner())
  }

  fn load_users(&self) -> Result<UserTable, StoreError> {
    match self.store.get(STORAGE_KEY_USERS)? {
      Some(raw) => Ok(serde_json::from_str(&raw)?),
      None => Ok(UserTable::new()),
    }
  }

  fn save_users(&self, users: &UserTable) -> Result<(), StoreError> {
    self.store.set(STORAGE_KEY_USERS, &serde_json::to_string(users)?)
  }

  fn current_email(&self) -> Result<Option<String>, StoreError> {
    Ok(self.store.get(STORAGE_KEY_CURRENT)?.filter(|e| !e.is_empty()))
  }

  /// Signed-in user, if the session pointer resolves to an existing record.
  #[instrument(level = "debug", skip(self))]
  pub fn current_user(&self) -> Result<Option<User>, StoreError> {
    let Some(email) = self.current_email()? else { return Ok(None) };
    Ok(self.load_users()?.get(&email).map(StoredUser::sanitized))
  }

  #[instrument(level = "info", skip(self, password), fields(email = %email.trim()))]
  pub fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
    let email = email.trim();
    let users = self.load_users()?;
    let user = users.get(email).ok_or(AuthError::InvalidCredentials)?;
    let candidate = hash_password(password, &user.salt);
    if !constant_time_eq(candidate.as_bytes(), user.password_hash.as_bytes()) {
      warn!(target: "auth", %email, "Login rejected");
      return Err(AuthError::InvalidCredentials);
    }
    {
      let _guard = self.lock_writes();
      self.store.set(STORAGE_KEY_CURRENT, email)?;
    }
    info!(target: "auth", %email, "User signed in");
    Ok(user.sanitized())
  }

  #[instrument(level = "info", skip(self, password, name), fields(email = %email.trim()))]
  pub fn signup(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
    let email = email.trim();
    let name = name.trim();
    if email.is_empty() {
      return Err(AuthError::MissingField("email"));
    }
    if password.is_empty() {
      return Err(AuthError::MissingField("password"));
    }
    if name.is_empty() {
      return Err(AuthError::MissingField("name"));
    }

    // Hash before locking; the table check below decides who wins.
    let salt = new_salt();
    let stored = StoredUser {
      email: email.to_string(),
      name: name.to_string(),
      password_hash: hash_password(password, &salt),
      salt,
      total_points: 0,
      history: Vec::new(),
    };
    let out = stored.sanitized();

    let _guard = self.lock_writes();
    let mut users = self.load_users()?;
    if users.contains_key(email) {
      return Err(AuthError::UserExists);
    }
    users.insert(email.to_string(), stored);
    self.save_users(&users)?;
    self.store.set(STORAGE_KEY_CURRENT, email)?;
    info!(target: "auth", %email, "User signed up");
    Ok(out)
  }

  /// Clears the session pointer. Safe to call when nobody is signed in.
  #[instrument(level = "info", skip(self))]
  pub fn logout(&self) -> Result<(), StoreError> {
    let _guard = self.lock_writes();
    self.store.remove(STORAGE_KEY_CURRENT)
  }

  /// Prepends `item` to the signed-in user's history and adds its score to
  /// their total. Does nothing when nobody is signed in.
  #[instrument(level = "info", skip(self, item), fields(score = item.score, max_score = item.max_score))]
  pub fn save_game_result(&self, item: GameHistory) -> Result<(), StoreError> {
    let _guard = self.lock_writes();
    let Some(email) = self.current_email()? else { return Ok(()) };
    let mut users = self.load_users()?;
    let Some(user) = users.get_mut(&email) else {
      warn!(target: "auth", %email, "Session points at a missing user; result dropped");
      return Ok(());
    };
    user.total_points += item.score;
    user.history.insert(0, item);
    self.save_users(&users)?;
    info!(target: "auth", %email, "Game result recorded");
    Ok(())
  }
}

fn new_salt() -> String {
  let mut salt = [0u8; SALT_LEN];
  rand::thread_rng().fill_bytes(&mut salt);
  hex::encode(salt)
}

/// Iterated, salted SHA-256, hex encoded.
fn hash_password(password: &str, salt: &str) -> String {
  let mut digest = Sha256::new()
    .chain_update(salt.as_bytes())
    .chain_update(password.as_bytes())
    .finalize();
  for _ in 1..HASH_ROUNDS {
    digest = Sha256::new()
      .chain_update(digest)
      .chain_update(password.as_bytes())
      .finalize();
  }
  hex::encode(digest)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
