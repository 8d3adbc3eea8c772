//! Project store: the signed-in user's projects and the current selection.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::api::types::{
  Document, DocumentKind, NewProject, Project, ProjectCreated, ProjectDetails,
};
use crate::api::ProjectsApi;
use crate::auth::Session;
use crate::cache::{AppCaches, Fetched, Generations};
use crate::error::{AssistError, Result};
use crate::view;

use super::{LoadState, SessionStore};

#[derive(Debug, Default)]
struct ProjectState {
  /// User the list belongs to
  user_id: Option<String>,
  projects: Vec<Project>,
  selected: Option<Project>,
  load: LoadState,
  /// Whether any load for `user_id` has succeeded
  has_data: bool,
  error: Option<String>,
}

impl ProjectState {
  fn reset_for(&mut self, user_id: Option<String>) {
    *self = ProjectState {
      user_id,
      ..ProjectState::default()
    };
  }

  /// Replace the list wholesale and keep the selection consistent with it.
  fn apply_list(&mut self, projects: Vec<Project>) {
    let previous = self.selected.take();
    self.selected = previous.and_then(|s| projects.iter().find(|p| p.id == s.id).cloned());

    // First-in-list wins, but never over an existing selection
    if self.selected.is_none() {
      self.selected = projects.first().cloned();
    }

    self.projects = projects;
    self.load = LoadState::Loaded;
    self.has_data = true;
    self.error = None;
  }
}

/// Projects owned by the current user, cached per user id.
pub struct ProjectStore {
  api: Arc<dyn ProjectsApi>,
  session: Arc<SessionStore>,
  caches: Arc<AppCaches>,
  generations: Generations<String>,
  state: Mutex<ProjectState>,
}

impl ProjectStore {
  pub fn new(api: Arc<dyn ProjectsApi>, session: Arc<SessionStore>, caches: Arc<AppCaches>) -> Self {
    Self {
      api,
      session,
      caches,
      generations: Generations::new(),
      state: Mutex::new(ProjectState::default()),
    }
  }

  /// Bring the store in line with the signed-in user.
  ///
  /// Without a user the list and selection are cleared. For a user whose list
  /// is loaded (or loading) nothing happens. A valid cache slot is adopted
  /// without a network call; otherwise the list is fetched. Returns `None`
  /// when nothing was read.
  pub async fn sync(&self) -> Result<Option<Fetched<Vec<Project>>>> {
    let Some(session) = self.session.get_session() else {
      self.generations.invalidate_all();
      self.state.lock()?.reset_for(None);
      return Ok(None);
    };
    let user_id = session.id().to_string();

    {
      let mut state = self.state.lock()?;
      if state.user_id.as_deref() == Some(user_id.as_str()) && state.load != LoadState::Unloaded {
        return Ok(None);
      }

      if state.user_id.as_deref() != Some(user_id.as_str()) {
        state.reset_for(Some(user_id.clone()));
      }

      if let Some(entry) = self.caches.projects.get_valid(&user_id)? {
        debug!(%user_id, count = entry.value.len(), "Projects served from cache");
        state.apply_list(entry.value.clone());
        return Ok(Some(Fetched::from_cache(entry.value, entry.cached_at)));
      }
    }

    self.fetch(&session).await.map(|projects| Some(Fetched::from_network(projects)))
  }

  /// Re-fetch the list for the signed-in user, bypassing the cache.
  pub async fn refresh(&self) -> Result<Vec<Project>> {
    let session = self.session.require_session()?;
    let user_id = session.id().to_string();

    {
      let mut state = self.state.lock()?;
      if state.user_id.as_deref() != Some(user_id.as_str()) {
        state.reset_for(Some(user_id.clone()));
      }
    }

    self.fetch(&session).await
  }

  async fn fetch(&self, session: &Session) -> Result<Vec<Project>> {
    let user_id = session.id().to_string();
    let ticket = self.generations.begin(user_id.clone());
    {
      let mut state = self.state.lock()?;
      state.load = LoadState::Loading;
      state.error = None;
    }

    info!(%user_id, "Fetching projects");
    let result = self.api.list_projects(session.id()).await;

    if !self.generations.is_current(&ticket) {
      warn!(%user_id, generation = ticket.generation(), "Discarding stale project list response");
      return result;
    }

    let mut state = self.state.lock()?;
    match result {
      Ok(projects) => {
        self.caches.projects.put(user_id, projects.clone())?;
        state.apply_list(projects.clone());
        Ok(projects)
      }
      Err(e) => {
        warn!(error = %e, "Failed to fetch projects");
        // Keep whatever was loaded before
        state.error = Some(format!("Failed to load projects: {}", e));
        state.load = if state.has_data {
          LoadState::Loaded
        } else {
          LoadState::Unloaded
        };
        Err(e)
      }
    }
  }

  pub fn list_projects(&self) -> Vec<Project> {
    self
      .state
      .lock()
      .map(|s| s.projects.clone())
      .unwrap_or_default()
  }

  pub fn selected(&self) -> Option<Project> {
    self.state.lock().ok().and_then(|s| s.selected.clone())
  }

  /// Select a project from the loaded list, or clear the selection.
  ///
  /// A project that is not in the loaded list clears the selection.
  pub fn select(&self, project: Option<&Project>) -> Result<Option<Project>> {
    match project {
      Some(p) => self.select_by_id(&p.id),
      None => {
        self.state.lock()?.selected = None;
        Ok(None)
      }
    }
  }

  /// Select by id; an id missing from the loaded list clears the selection.
  pub fn select_by_id(&self, id: &str) -> Result<Option<Project>> {
    let mut state = self.state.lock()?;
    state.selected = state.projects.iter().find(|p| p.id == id).cloned();
    if state.selected.is_none() {
      debug!(%id, "Project not in loaded list, selection cleared");
    }
    Ok(state.selected.clone())
  }

  pub fn load_state(&self) -> LoadState {
    self.state.lock().map(|s| s.load).unwrap_or_default()
  }

  pub fn is_loading(&self) -> bool {
    self.load_state().is_loading()
  }

  pub fn error(&self) -> Option<String> {
    self.state.lock().ok().and_then(|s| s.error.clone())
  }

  /// Loaded projects whose title or description contains `query`.
  pub fn search(&self, query: &str) -> Vec<Project> {
    view::search_projects(&self.list_projects(), query)
  }

  pub async fn project_details(&self, id: &str) -> Result<ProjectDetails> {
    let session = self.session.require_session()?;
    self.api.get_project_details(session.id(), id).await
  }

  /// Create a project, then reload the list so it shows up.
  pub async fn create_project(&self, project: &NewProject) -> Result<ProjectCreated> {
    if project.title.trim().is_empty() {
      return Err(AssistError::Invalid("Project title is required".to_string()));
    }

    let session = self.session.require_session()?;
    let created = self.api.create_project(session.id(), project).await?;
    info!(project_id = %created.project_id, requirements = created.requirements_count, "Project created");

    if let Err(e) = self.refresh().await {
      warn!(error = %e, "Project created but list refresh failed");
    }
    Ok(created)
  }

  /// Delete a project, then reload the list.
  ///
  /// Returns the new selection, which moves off the deleted project.
  pub async fn delete_project(&self, id: &str) -> Result<Option<Project>> {
    let session = self.session.require_session()?;
    self.api.delete_project(session.id(), id).await?;
    info!(%id, "Project deleted");

    {
      // Drop it locally first so the cache never serves it again
      let mut state = self.state.lock()?;
      state.projects.retain(|p| p.id != id);
      if state.selected.as_ref().is_some_and(|p| p.id == id) {
        state.selected = None;
      }
      let user_id = session.id().to_string();
      self
        .caches
        .projects
        .update_if(&user_id, |projects| projects.retain(|p| p.id != id))?;
    }

    if let Err(e) = self.refresh().await {
      warn!(error = %e, "Project deleted but list refresh failed");
    }
    Ok(self.selected())
  }

  pub async fn download_document(&self, id: &str, kind: DocumentKind) -> Result<Document> {
    let session = self.session.require_session()?;
    self.api.download_document(session.id(), id, kind).await
  }
}
