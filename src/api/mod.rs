//! Project and requirement HTTP API.

pub mod api_types;
pub mod client;
pub mod settings;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

use api_types::ApiRequirement;
use types::{Document, DocumentKind, NewProject, Project, ProjectCreated, ProjectDetails};

pub use client::ApiClient;
pub use settings::PostgrestSettings;

/// Project endpoints. Every call is authenticated with `token` as bearer.
#[async_trait]
pub trait ProjectsApi: Send + Sync {
  /// `GET /projects`
  async fn list_projects(&self, token: &str) -> Result<Vec<Project>>;

  /// `GET /projects/{id}/details`
  async fn get_project_details(&self, token: &str, id: &str) -> Result<ProjectDetails>;

  /// `POST /projects` (multipart)
  async fn create_project(&self, token: &str, project: &NewProject) -> Result<ProjectCreated>;

  /// `DELETE /projects/{id}`
  async fn delete_project(&self, token: &str, id: &str) -> Result<()>;

  /// `GET /projects/{id}/documents/{kind}`
  async fn download_document(&self, token: &str, id: &str, kind: DocumentKind)
    -> Result<Document>;
}

/// Requirement endpoints. Every call is authenticated with `token` as bearer.
#[async_trait]
pub trait RequirementsApi: Send + Sync {
  /// `GET /requirements/project/{project_id}`; 404 means the project has none.
  async fn list_for_project(&self, token: &str, project_id: &str) -> Result<Vec<ApiRequirement>>;

  /// `DELETE /requirements/{id}`
  async fn delete_requirement(&self, token: &str, id: &str) -> Result<()>;
}
