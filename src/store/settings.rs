//! Settings store: per-user preferences with optimistic writes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::cache::{AppCaches, Generations};
use crate::error::Result;

use super::{LoadState, SessionStore};

/// Bounds the quantity stepper keeps `quantity_req_batch` within.
pub const QUANTITY_MIN: i32 = 1;
pub const QUANTITY_MAX: i32 = 50;

/// One user's preferences, as stored in the `settings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
  pub require_brief_description: bool,
  pub batch_mode: bool,
  pub quantity_req_batch: i32,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      require_brief_description: true,
      batch_mode: true,
      quantity_req_batch: 5,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
  RequireBriefDescription,
  BatchMode,
  QuantityReqBatch,
}

impl SettingsField {
  pub const ALL: [SettingsField; 3] = [
    SettingsField::RequireBriefDescription,
    SettingsField::BatchMode,
    SettingsField::QuantityReqBatch,
  ];

  /// Column name in the settings table
  pub fn column(&self) -> &'static str {
    match self {
      SettingsField::RequireBriefDescription => "require_brief_description",
      SettingsField::BatchMode => "batch_mode",
      SettingsField::QuantityReqBatch => "quantity_req_batch",
    }
  }
}

/// Whether a field's local value is confirmed by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldStatus {
  #[default]
  Applied,
  Pending,
  Failed,
}

/// A partial update; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
  pub require_brief_description: Option<bool>,
  pub batch_mode: Option<bool>,
  pub quantity_req_batch: Option<i32>,
}

impl SettingsPatch {
  pub fn is_empty(&self) -> bool {
    self.touched().is_empty()
  }

  pub fn touched(&self) -> Vec<SettingsField> {
    let mut fields = Vec::new();
    if self.require_brief_description.is_some() {
      fields.push(SettingsField::RequireBriefDescription);
    }
    if self.batch_mode.is_some() {
      fields.push(SettingsField::BatchMode);
    }
    if self.quantity_req_batch.is_some() {
      fields.push(SettingsField::QuantityReqBatch);
    }
    fields
  }

  fn apply(&self, settings: &mut Settings) {
    if let Some(v) = self.require_brief_description {
      settings.require_brief_description = v;
    }
    if let Some(v) = self.batch_mode {
      settings.batch_mode = v;
    }
    if let Some(v) = self.quantity_req_batch {
      settings.quantity_req_batch = v;
    }
  }
}

/// Where settings rows live.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
  /// The user's row, or `None` if they never saved settings.
  async fn select(&self, session: &Session) -> Result<Option<Settings>>;

  /// Insert or update the user's row; returns the row as stored.
  async fn upsert(&self, session: &Session, settings: &Settings) -> Result<Settings>;
}

#[derive(Debug, Default)]
struct SettingsState {
  user_id: Option<String>,
  settings: Settings,
  load: LoadState,
  status: HashMap<SettingsField, FieldStatus>,
  error: Option<String>,
}

impl SettingsState {
  fn reset_for(&mut self, user_id: Option<String>) {
    *self = SettingsState {
      user_id,
      ..SettingsState::default()
    };
  }

  fn confirm(&mut self, settings: Settings) {
    self.settings = settings;
    self.status.clear();
    self.load = LoadState::Loaded;
    self.error = None;
  }

  fn mark(&mut self, fields: &[SettingsField], from: Option<FieldStatus>, to: FieldStatus) {
    for field in fields {
      let current = self.status.get(field).copied().unwrap_or_default();
      if from.map_or(true, |f| f == current) {
        self.status.insert(*field, to);
      }
    }
  }

  /// A failed request settles every field still waiting on one. Each write
  /// sends the whole record, so the newest write also carries the values of
  /// older writes it overtook.
  fn fail_pending(&mut self) {
    self.mark(&SettingsField::ALL, Some(FieldStatus::Pending), FieldStatus::Failed);
  }
}

/// Settings of the signed-in user.
///
/// Writes are applied locally before the backend call so `get` reflects them
/// at once. The backend's answer then replaces the local record. Reads and
/// writes share one generation counter, so a response from an older request
/// never lands on top of a newer one.
pub struct SettingsStore {
  backend: Arc<dyn SettingsBackend>,
  session: Arc<SessionStore>,
  caches: Arc<AppCaches>,
  generations: Generations<String>,
  state: Mutex<SettingsState>,
}

impl SettingsStore {
  pub fn new(
    backend: Arc<dyn SettingsBackend>,
    session: Arc<SessionStore>,
    caches: Arc<AppCaches>,
  ) -> Self {
    Self {
      backend,
      session,
      caches,
      generations: Generations::new(),
      state: Mutex::new(SettingsState::default()),
    }
  }

  /// Current local value; defaults until loaded.
  pub fn get(&self) -> Settings {
    self
      .state
      .lock()
      .map(|s| s.settings.clone())
      .unwrap_or_default()
  }

  pub fn field_status(&self, field: SettingsField) -> FieldStatus {
    self
      .state
      .lock()
      .ok()
      .and_then(|s| s.status.get(&field).copied())
      .unwrap_or_default()
  }

  pub fn error(&self) -> Option<String> {
    self.state.lock().ok().and_then(|s| s.error.clone())
  }

  pub fn is_loading(&self) -> bool {
    self
      .state
      .lock()
      .map(|s| s.load.is_loading())
      .unwrap_or(false)
  }

  /// Bring the store in line with the signed-in user, reading if needed.
  pub async fn sync(&self) -> Result<Settings> {
    let Some(session) = self.session.get_session() else {
      self.generations.invalidate_all();
      self.state.lock()?.reset_for(None);
      return Ok(Settings::default());
    };
    let user_id = session.id().to_string();

    {
      let mut state = self.state.lock()?;
      if state.user_id.as_deref() == Some(user_id.as_str()) && state.load != LoadState::Unloaded {
        return Ok(state.settings.clone());
      }

      if state.user_id.as_deref() != Some(user_id.as_str()) {
        state.reset_for(Some(user_id.clone()));
      }

      if let Some(entry) = self.caches.settings.get_valid(&user_id)? {
        debug!(%user_id, "Settings served from cache");
        state.confirm(entry.value.clone());
        return Ok(entry.value);
      }
    }

    self.fetch(&session).await
  }

  /// Re-read from the backend, discarding unconfirmed local changes.
  pub async fn refresh(&self) -> Result<Settings> {
    let session = self.session.require_session()?;
    {
      let mut state = self.state.lock()?;
      if state.user_id.as_deref() != Some(session.id()) {
        state.reset_for(Some(session.id().to_string()));
      }
    }
    self.fetch(&session).await
  }

  async fn fetch(&self, session: &Session) -> Result<Settings> {
    let user_id = session.id().to_string();
    let ticket = self.generations.begin(user_id.clone());
    {
      let mut state = self.state.lock()?;
      state.load = LoadState::Loading;
      state.error = None;
    }

    info!(%user_id, "Loading settings");
    let result = self.backend.select(session).await;

    let mut state = self.state.lock()?;
    if !self.generations.is_current(&ticket) {
      warn!(%user_id, "Discarding stale settings read");
      return Ok(state.settings.clone());
    }

    match result {
      Ok(row) => {
        if row.is_none() {
          debug!(%user_id, "No settings row, using defaults");
        }
        let settings = row.unwrap_or_default();
        self.caches.settings.put(user_id, settings.clone())?;
        state.confirm(settings.clone());
        Ok(settings)
      }
      Err(e) => {
        warn!(error = %e, "Failed to load settings");
        // Whatever is held already belongs to this user
        state.error = Some(format!("Failed to load settings: {}", e));
        state.load = LoadState::Unloaded;
        state.fail_pending();
        Err(e)
      }
    }
  }

  /// Apply `patch` locally, then write the whole record through.
  ///
  /// The patched value is visible through `get` before the backend answers.
  /// On failure the local value is kept and every field still pending is
  /// marked `Failed` until a later read or write confirms it.
  pub async fn set(&self, patch: SettingsPatch) -> Result<Settings> {
    self.sync().await?;
    let session = self.session.require_session()?;
    let user_id = session.id().to_string();
    let fields = patch.touched();

    let (snapshot, ticket) = {
      let mut state = self.state.lock()?;
      patch.apply(&mut state.settings);
      state.mark(&fields, None, FieldStatus::Pending);
      (state.settings.clone(), self.generations.begin(user_id.clone()))
    };

    info!(%user_id, ?fields, "Saving settings");
    let result = self.backend.upsert(&session, &snapshot).await;

    let mut state = self.state.lock()?;
    if !self.generations.is_current(&ticket) {
      debug!(%user_id, "Newer settings request in flight, not applying write response");
      return result.map(|_| state.settings.clone());
    }

    match result {
      Ok(stored) => {
        if stored != snapshot {
          debug!(%user_id, ?stored, "Backend adjusted saved settings");
        }
        self.caches.settings.put(user_id, stored.clone())?;
        state.confirm(stored.clone());
        Ok(stored)
      }
      Err(e) => {
        warn!(error = %e, "Failed to save settings");
        state.fail_pending();
        state.error = Some(format!("Failed to save settings: {}", e));
        Err(e)
      }
    }
  }

  /// Step the batch quantity up by one, staying within bounds.
  pub async fn increment_quantity(&self) -> Result<Settings> {
    self.step_quantity(1).await
  }

  /// Step the batch quantity down by one, staying within bounds.
  pub async fn decrement_quantity(&self) -> Result<Settings> {
    self.step_quantity(-1).await
  }

  async fn step_quantity(&self, delta: i32) -> Result<Settings> {
    let current = self.sync().await?.quantity_req_batch;
    let next = current.saturating_add(delta).clamp(QUANTITY_MIN, QUANTITY_MAX);
    self
      .set(SettingsPatch {
        quantity_req_batch: Some(next),
        ..SettingsPatch::default()
      })
      .await
  }
}
