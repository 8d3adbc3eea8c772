//! In-memory collaborators for store tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

use crate::api::api_types::ApiRequirement;
use crate::api::types::{
  BackendRequirementType, Document, DocumentKind, NewProject, Project, ProjectCreated,
  ProjectDetails, RequirementCounts,
};
use crate::api::{ProjectsApi, RequirementsApi};
use crate::auth::{AuthEvent, AuthProvider, NewAccount, OtpType, Session, SessionUser};
use crate::cache::AppCaches;
use crate::error::{AssistError, Result};

use super::settings::{Settings, SettingsBackend};
use super::SessionStore;

pub fn session_for(user_id: &str) -> Session {
  Session {
    access_token: format!("jwt-{}", user_id),
    refresh_token: None,
    expires_at: None,
    user: SessionUser {
      id: user_id.to_string(),
      email: None,
    },
  }
}

/// A loaded session store signed in as `user_id`.
pub async fn signed_in_session(user_id: &str, caches: Arc<AppCaches>) -> Arc<SessionStore> {
  let auth = Arc::new(FakeAuth::with_session(session_for(user_id)));
  let store = Arc::new(SessionStore::new(auth, caches));
  store.load().await.unwrap();
  store
}

pub fn project(id: &str) -> Project {
  Project {
    id: id.to_string(),
    user_id: None,
    project_id: None,
    title: format!("Project {}", id),
    description: None,
    author_first_name: Some("Ada".to_string()),
    author_last_name: Some("Lovelace".to_string()),
    vision_document_name: None,
    vision_extracted_text: None,
    requirements_document_name: None,
    created_at: None,
    updated_at: None,
  }
}

pub fn api_requirement(id: &str, project_id: &str, backend_type: &str) -> ApiRequirement {
  ApiRequirement {
    id: id.to_string(),
    project_id: project_id.to_string(),
    requirement_id: format!("REQ-{}", id),
    requirement_type: BackendRequirementType::from(backend_type.to_string()),
    description: format!("Requirement {}", id),
    category: None,
    created_at: None,
    updated_at: None,
  }
}

fn server_error() -> AssistError {
  AssistError::Status {
    status: 500,
    body: "internal error".to_string(),
  }
}

/// Take a one-shot gate and wait on it if one was armed.
async fn pass(gate: &Mutex<Option<Arc<Notify>>>) {
  let gate = gate.lock().unwrap().take();
  if let Some(gate) = gate {
    gate.notified().await;
  }
}

fn arm(gate: &Mutex<Option<Arc<Notify>>>) -> Arc<Notify> {
  let notify = Arc::new(Notify::new());
  *gate.lock().unwrap() = Some(Arc::clone(&notify));
  notify
}

// ============================================================================
// Auth
// ============================================================================

pub struct FakeAuth {
  session: Mutex<Option<Session>>,
  fail: bool,
  events: broadcast::Sender<AuthEvent>,
  get_session_calls: AtomicUsize,
  sign_out_calls: AtomicUsize,
  auto_confirm: AtomicBool,
  signups: Mutex<Vec<String>>,
  password_resets: Mutex<Vec<String>>,
}

impl FakeAuth {
  fn build(session: Option<Session>, fail: bool) -> Self {
    let (events, _) = broadcast::channel(8);
    Self {
      session: Mutex::new(session),
      fail,
      events,
      get_session_calls: AtomicUsize::new(0),
      sign_out_calls: AtomicUsize::new(0),
      auto_confirm: AtomicBool::new(false),
      signups: Mutex::new(Vec::new()),
      password_resets: Mutex::new(Vec::new()),
    }
  }

  pub fn with_session(session: Session) -> Self {
    Self::build(Some(session), false)
  }

  pub fn signed_out() -> Self {
    Self::build(None, false)
  }

  pub fn failing() -> Self {
    Self::build(None, true)
  }

  pub fn emit(&self, event: AuthEvent) {
    let _ = self.events.send(event);
  }

  pub fn set_session(&self, session: Option<Session>) {
    *self.session.lock().unwrap() = session;
  }

  /// Sign new accounts in without waiting for email confirmation.
  pub fn auto_confirm(&self, on: bool) {
    self.auto_confirm.store(on, Ordering::SeqCst);
  }

  pub fn signups(&self) -> Vec<String> {
    self.signups.lock().unwrap().clone()
  }

  pub fn password_resets(&self) -> Vec<String> {
    self.password_resets.lock().unwrap().clone()
  }

  pub fn get_session_calls(&self) -> usize {
    self.get_session_calls.load(Ordering::SeqCst)
  }

  pub fn sign_out_calls(&self) -> usize {
    self.sign_out_calls.load(Ordering::SeqCst)
  }

  fn adopt(&self, session: Session) -> Session {
    *self.session.lock().unwrap() = Some(session.clone());
    session
  }
}

#[async_trait]
impl AuthProvider for FakeAuth {
  async fn get_session(&self) -> Result<Option<Session>> {
    self.get_session_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail {
      return Err(AssistError::Auth("provider unavailable".to_string()));
    }
    Ok(self.session.lock().unwrap().clone())
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
    self.events.subscribe()
  }

  async fn sign_out(&self) -> Result<()> {
    self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
    *self.session.lock().unwrap() = None;
    Ok(())
  }

  async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Session> {
    Ok(self.adopt(session_for(email)))
  }

  async fn sign_up(&self, account: &NewAccount) -> Result<Option<Session>> {
    self.signups.lock().unwrap().push(account.email.clone());
    if self.auto_confirm.load(Ordering::SeqCst) {
      return Ok(Some(self.adopt(session_for(&account.email))));
    }
    Ok(None)
  }

  async fn reset_password(&self, email: &str) -> Result<()> {
    self.password_resets.lock().unwrap().push(email.to_string());
    Ok(())
  }

  async fn exchange_code_for_session(&self, _code: &str) -> Result<Session> {
    Ok(self.adopt(session_for("confirmed-user")))
  }

  async fn verify_otp(&self, _otp_type: OtpType, _token_hash: &str) -> Result<Session> {
    Ok(self.adopt(session_for("confirmed-user")))
  }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Default)]
pub struct FakeProjectsApi {
  /// Project lists keyed by the bearer token (user id)
  projects: Mutex<HashMap<String, Vec<Project>>>,
  fail_list: AtomicBool,
  list_calls: AtomicUsize,
  created: AtomicUsize,
  list_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeProjectsApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_projects(&self, user_id: &str, projects: Vec<Project>) {
    self
      .projects
      .lock()
      .unwrap()
      .insert(user_id.to_string(), projects);
  }

  pub fn fail_list(&self, fail: bool) {
    self.fail_list.store(fail, Ordering::SeqCst);
  }

  pub fn list_calls(&self) -> usize {
    self.list_calls.load(Ordering::SeqCst)
  }

  /// Hold the next list call (after it has read its data) until notified.
  pub fn gate_next_list(&self) -> Arc<Notify> {
    arm(&self.list_gate)
  }

  fn find(&self, token: &str, id: &str) -> Result<Project> {
    self
      .projects
      .lock()
      .unwrap()
      .get(token)
      .and_then(|list| list.iter().find(|p| p.id == id).cloned())
      .ok_or_else(|| AssistError::NotFound(format!("projects/{}", id)))
  }
}

#[async_trait]
impl ProjectsApi for FakeProjectsApi {
  async fn list_projects(&self, token: &str) -> Result<Vec<Project>> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    let result = if self.fail_list.load(Ordering::SeqCst) {
      Err(server_error())
    } else {
      Ok(
        self
          .projects
          .lock()
          .unwrap()
          .get(token)
          .cloned()
          .unwrap_or_default(),
      )
    };
    pass(&self.list_gate).await;
    result
  }

  async fn get_project_details(&self, token: &str, id: &str) -> Result<ProjectDetails> {
    Ok(ProjectDetails {
      project: self.find(token, id)?,
      requirement_counts: RequirementCounts {
        functional: 2,
        non_functional: 1,
        conjectural: 0,
      },
    })
  }

  async fn create_project(&self, token: &str, new: &NewProject) -> Result<ProjectCreated> {
    let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
    let mut created = project(&format!("created-{}", n));
    created.title = new.title.clone();
    created.project_id = new.project_id.clone();
    created.description = new.description.clone();
    let id = created.id.clone();

    self
      .projects
      .lock()
      .unwrap()
      .entry(token.to_string())
      .or_default()
      .push(created);

    Ok(ProjectCreated {
      success: true,
      project_id: id,
      message: "Project created".to_string(),
      requirements_count: 0,
    })
  }

  async fn delete_project(&self, token: &str, id: &str) -> Result<()> {
    self.find(token, id)?;
    if let Some(list) = self.projects.lock().unwrap().get_mut(token) {
      list.retain(|p| p.id != id);
    }
    Ok(())
  }

  async fn download_document(&self, token: &str, id: &str, kind: DocumentKind) -> Result<Document> {
    self.find(token, id)?;
    Ok(Document {
      file_name: format!("{}-{}.pdf", id, kind.path_segment()),
      bytes: b"%PDF-1.4".to_vec(),
    })
  }
}

// ============================================================================
// Requirements
// ============================================================================

#[derive(Default)]
pub struct FakeRequirementsApi {
  /// Rows per project; a project missing here answers 404
  rows: Mutex<HashMap<String, Vec<ApiRequirement>>>,
  failing_projects: Mutex<HashSet<String>>,
  failing_deletes: Mutex<HashSet<String>>,
  gates: Mutex<HashMap<String, Arc<Notify>>>,
  calls: Mutex<HashMap<String, usize>>,
}

impl FakeRequirementsApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_rows(&self, project_id: &str, rows: Vec<ApiRequirement>) {
    self
      .rows
      .lock()
      .unwrap()
      .insert(project_id.to_string(), rows);
  }

  pub fn fail_project(&self, project_id: &str) {
    self
      .failing_projects
      .lock()
      .unwrap()
      .insert(project_id.to_string());
  }

  pub fn fail_delete(&self, id: &str) {
    self.failing_deletes.lock().unwrap().insert(id.to_string());
  }

  /// Hold the next listing of `project_id` until notified.
  pub fn gate(&self, project_id: &str) -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    self
      .gates
      .lock()
      .unwrap()
      .insert(project_id.to_string(), Arc::clone(&notify));
    notify
  }

  pub fn list_calls(&self, project_id: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .get(project_id)
      .copied()
      .unwrap_or(0)
  }
}

#[async_trait]
impl RequirementsApi for FakeRequirementsApi {
  async fn list_for_project(&self, _token: &str, project_id: &str) -> Result<Vec<ApiRequirement>> {
    *self
      .calls
      .lock()
      .unwrap()
      .entry(project_id.to_string())
      .or_default() += 1;

    let result = if self.failing_projects.lock().unwrap().contains(project_id) {
      Err(server_error())
    } else {
      self
        .rows
        .lock()
        .unwrap()
        .get(project_id)
        .cloned()
        .ok_or_else(|| AssistError::NotFound(format!("requirements/project/{}", project_id)))
    };

    let gate = self.gates.lock().unwrap().remove(project_id);
    if let Some(gate) = gate {
      gate.notified().await;
    }
    result
  }

  async fn delete_requirement(&self, _token: &str, id: &str) -> Result<()> {
    if self.failing_deletes.lock().unwrap().contains(id) {
      return Err(server_error());
    }
    for rows in self.rows.lock().unwrap().values_mut() {
      rows.retain(|r| r.id != id);
    }
    Ok(())
  }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Default)]
pub struct FakeSettingsBackend {
  rows: Mutex<HashMap<String, Settings>>,
  fail_select: AtomicBool,
  fail_upsert: AtomicBool,
  /// Stored quantity is capped at this value, like a server-side check
  quantity_cap: Mutex<Option<i32>>,
  select_calls: AtomicUsize,
  upsert_calls: AtomicUsize,
  upsert_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeSettingsBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_row(&self, user_id: &str, settings: Settings) {
    self
      .rows
      .lock()
      .unwrap()
      .insert(user_id.to_string(), settings);
  }

  pub fn row(&self, user_id: &str) -> Option<Settings> {
    self.rows.lock().unwrap().get(user_id).cloned()
  }

  pub fn fail_select(&self, fail: bool) {
    self.fail_select.store(fail, Ordering::SeqCst);
  }

  pub fn fail_upsert(&self, fail: bool) {
    self.fail_upsert.store(fail, Ordering::SeqCst);
  }

  pub fn clamp_quantity_to(&self, cap: i32) {
    *self.quantity_cap.lock().unwrap() = Some(cap);
  }

  pub fn select_calls(&self) -> usize {
    self.select_calls.load(Ordering::SeqCst)
  }

  pub fn upsert_calls(&self) -> usize {
    self.upsert_calls.load(Ordering::SeqCst)
  }

  /// Hold the next upsert until notified.
  pub fn gate_upsert(&self) -> Arc<Notify> {
    arm(&self.upsert_gate)
  }
}

#[async_trait]
impl SettingsBackend for FakeSettingsBackend {
  async fn select(&self, session: &Session) -> Result<Option<Settings>> {
    self.select_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_select.load(Ordering::SeqCst) {
      return Err(server_error());
    }
    Ok(self.row(session.id()))
  }

  async fn upsert(&self, session: &Session, settings: &Settings) -> Result<Settings> {
    self.upsert_calls.fetch_add(1, Ordering::SeqCst);
    pass(&self.upsert_gate).await;
    if self.fail_upsert.load(Ordering::SeqCst) {
      return Err(server_error());
    }

    let mut stored = settings.clone();
    if let Some(cap) = *self.quantity_cap.lock().unwrap() {
      stored.quantity_req_batch = stored.quantity_req_batch.min(cap);
    }
    self.set_row(session.id(), stored.clone());
    Ok(stored)
  }
}
