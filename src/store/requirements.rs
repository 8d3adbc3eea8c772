//! Requirement store: the requirements of one project at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::api::api_types::ApiRequirement;
use crate::api::types::Requirement;
use crate::api::RequirementsApi;
use crate::cache::{AppCaches, Fetched, Generations, RequirementsEntry};
use crate::error::{AssistError, Result};

use super::SessionStore;

#[derive(Debug, Default)]
struct RequirementState {
  requirements: Vec<Requirement>,
  /// Project every held requirement belongs to
  project_id: Option<String>,
  /// Author label the held requirements were built with
  author: Option<String>,
  loading: bool,
  error: Option<String>,
  /// Deleted on the server; responses read before the delete still carry them
  deleted: HashSet<String>,
}

impl RequirementState {
  fn show(&mut self, project_id: &str, entry: RequirementsEntry) {
    self.requirements = entry.requirements;
    self.project_id = Some(project_id.to_string());
    self.author = Some(entry.author);
  }

  fn without_deleted(&self, mut rows: Vec<ApiRequirement>) -> Vec<ApiRequirement> {
    rows.retain(|r| !self.deleted.contains(&r.id));
    rows
  }
}

/// Requirements for the project being viewed, cached per project id.
pub struct RequirementStore {
  api: Arc<dyn RequirementsApi>,
  session: Arc<SessionStore>,
  caches: Arc<AppCaches>,
  generations: Generations<String>,
  state: Mutex<RequirementState>,
}

impl RequirementStore {
  /// Create the store, showing whatever the shared cache holds.
  pub fn new(
    api: Arc<dyn RequirementsApi>,
    session: Arc<SessionStore>,
    caches: Arc<AppCaches>,
  ) -> Self {
    let mut state = RequirementState::default();
    if let Ok(Some(entry)) = caches.requirements.peek() {
      state.show(&entry.tag, entry.value);
    }

    Self {
      api,
      session,
      caches,
      generations: Generations::new(),
      state: Mutex::new(state),
    }
  }

  /// Load the requirements of `project_id`, labelling each with `author`.
  ///
  /// A cache hit for the project returns without a network call unless
  /// `force_refresh` is set. When fetches for several projects overlap only
  /// the most recently requested one is shown; earlier responses are
  /// returned to their callers but not applied.
  pub async fn fetch_requirements(
    &self,
    project_id: &str,
    author: &str,
    force_refresh: bool,
  ) -> Result<Fetched<Vec<Requirement>>> {
    let Some(session) = self.session.get_session() else {
      self.generations.invalidate_all();
      let mut state = self.state.lock()?;
      state.requirements.clear();
      state.project_id = None;
      state.author = None;
      state.loading = false;
      return Err(AssistError::Unauthenticated);
    };

    let key = project_id.to_string();
    if !force_refresh {
      if let Some(entry) = self.caches.requirements.get_valid(&key)? {
        debug!(%project_id, count = entry.value.requirements.len(), "Requirements served from cache");
        // Any older in-flight fetch must not replace what is shown now
        self.generations.begin(key);
        let mut state = self.state.lock()?;
        state.show(project_id, entry.value.clone());
        state.loading = false;
        return Ok(Fetched::from_cache(
          entry.value.requirements,
          entry.cached_at,
        ));
      }
    }

    let ticket = self.generations.begin(key.clone());
    {
      let mut state = self.state.lock()?;
      state.loading = true;
      state.error = None;
    }

    info!(%project_id, force_refresh, "Fetching requirements");
    let result = self.load(session.id(), project_id).await;

    let mut state = self.state.lock()?;
    let result = result.map(|rows| state.without_deleted(rows));
    if !self.generations.is_current(&ticket) {
      warn!(%project_id, generation = ticket.generation(), "Discarding stale requirements response");
      return result.map(|rows| Fetched::from_network(label(rows, author)));
    }

    state.loading = false;
    match result {
      Ok(rows) => {
        let entry = RequirementsEntry {
          requirements: label(rows, author),
          author: author.to_string(),
        };
        self.caches.requirements.put(key, entry.clone())?;
        let requirements = entry.requirements.clone();
        state.show(project_id, entry);
        Ok(Fetched::from_network(requirements))
      }
      Err(e) => {
        warn!(%project_id, error = %e, "Failed to fetch requirements");
        state.error = Some(format!("Failed to load requirements: {}", e));
        Err(e)
      }
    }
  }

  /// Fill the cache for `project_id` without touching what is shown.
  ///
  /// Skipped when the cache already holds that project or a visible fetch is
  /// in flight. Failures are logged only.
  pub async fn prefetch(&self, project_id: &str, author: &str) -> Result<()> {
    let Some(session) = self.session.get_session() else {
      return Ok(());
    };

    let key = project_id.to_string();
    if self.caches.requirements.valid_for(&key)? || self.is_loading() {
      return Ok(());
    }

    match self.load(session.id(), project_id).await {
      Ok(rows) => {
        let rows = {
          let state = self.state.lock()?;
          // A visible fetch that started meanwhile owns the slot
          if state.loading {
            return Ok(());
          }
          state.without_deleted(rows)
        };
        debug!(%project_id, count = rows.len(), "Prefetched requirements");
        self.caches.requirements.put(
          key,
          RequirementsEntry {
            requirements: label(rows, author),
            author: author.to_string(),
          },
        )
      }
      Err(e) => {
        warn!(%project_id, error = %e, "Failed to prefetch requirements");
        Ok(())
      }
    }
  }

  /// Fetch rows for one project; a 404 means the project has none.
  async fn load(&self, user_id: &str, project_id: &str) -> Result<Vec<ApiRequirement>> {
    match self.api.list_for_project(user_id, project_id).await {
      Ok(rows) => {
        let (rows, foreign): (Vec<_>, Vec<_>) =
          rows.into_iter().partition(|r| r.project_id == project_id);
        if !foreign.is_empty() {
          warn!(%project_id, dropped = foreign.len(), "Dropping requirements of another project");
        }
        Ok(rows)
      }
      Err(e) if e.is_not_found() => {
        debug!(%project_id, "No requirements for project");
        Ok(Vec::new())
      }
      Err(e) => Err(e),
    }
  }

  /// Delete one requirement on the server, then drop it locally.
  ///
  /// Returns `Ok(false)` when the server rejects the delete; the error is
  /// recorded and nothing local changes.
  pub async fn delete_requirement(&self, id: &str) -> Result<bool> {
    let session = self.session.require_session()?;

    if let Err(e) = self.api.delete_requirement(session.id(), id).await {
      warn!(%id, error = %e, "Failed to delete requirement");
      self.state.lock()?.error = Some(format!("Failed to delete requirement: {}", e));
      return Ok(false);
    }
    info!(%id, "Requirement deleted");

    {
      let mut state = self.state.lock()?;
      state.requirements.retain(|r| r.id != id);
      state.deleted.insert(id.to_string());
    }
    if let Some(tag) = self.caches.requirements.tag()? {
      self
        .caches
        .requirements
        .update_if(&tag, |entry| entry.requirements.retain(|r| r.id != id))?;
    }
    Ok(true)
  }

  /// Forget everything: visible state, cache slot and in-flight fetches.
  pub fn clear(&self) -> Result<()> {
    self.generations.invalidate_all();
    self.caches.requirements.clear()?;
    *self.state.lock()? = RequirementState::default();
    Ok(())
  }

  /// Re-fetch the current project with the author it was loaded with.
  ///
  /// Does nothing when no project is loaded.
  pub async fn refresh(&self) -> Result<Option<Vec<Requirement>>> {
    let current = {
      let state = self.state.lock()?;
      state.project_id.clone().zip(state.author.clone())
    };

    match current {
      Some((project_id, author)) => self
        .fetch_requirements(&project_id, &author, true)
        .await
        .map(|fetched| Some(fetched.data)),
      None => Ok(None),
    }
  }

  pub fn requirements(&self) -> Vec<Requirement> {
    self
      .state
      .lock()
      .map(|s| s.requirements.clone())
      .unwrap_or_default()
  }

  pub fn current_project_id(&self) -> Option<String> {
    self.state.lock().ok().and_then(|s| s.project_id.clone())
  }

  pub fn is_loading(&self) -> bool {
    self.state.lock().map(|s| s.loading).unwrap_or(false)
  }

  pub fn error(&self) -> Option<String> {
    self.state.lock().ok().and_then(|s| s.error.clone())
  }
}

fn label(rows: Vec<ApiRequirement>, author: &str) -> Vec<Requirement> {
  rows
    .into_iter()
    .map(|row| row.into_requirement(author))
    .collect()
}
