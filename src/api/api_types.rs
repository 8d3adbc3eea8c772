//! Serde-deserializable types matching the project/requirement API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{
  BackendRequirementType, NfrCategory, Project, ProjectDetails, Requirement, RequirementCounts,
  RequirementKind,
};

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  pub id: String,
  pub user_id: Option<String>,
  pub project_id: Option<String>,
  #[serde(default)]
  pub title: String,
  pub description: Option<String>,
  pub author_first_name: Option<String>,
  pub author_last_name: Option<String>,
  pub vision_document_name: Option<String>,
  pub vision_extracted_text: Option<String>,
  pub requirements_document_name: Option<String>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiProjectDetails {
  #[serde(flatten)]
  pub project: ApiProject,
  #[serde(default)]
  pub requirement_counts: RequirementCounts,
}

// ============================================================================
// Requirements
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRequirement {
  pub id: String,
  pub project_id: String,
  pub requirement_id: String,
  #[serde(rename = "type")]
  pub requirement_type: BackendRequirementType,
  #[serde(default)]
  pub description: String,
  pub category: Option<NfrCategory>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub detail: Option<serde_json::Value>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiProject> for Project {
  fn from(p: ApiProject) -> Self {
    Project {
      id: p.id,
      user_id: p.user_id,
      project_id: p.project_id,
      title: p.title,
      description: p.description,
      author_first_name: p.author_first_name,
      author_last_name: p.author_last_name,
      vision_document_name: p.vision_document_name,
      vision_extracted_text: p.vision_extracted_text,
      requirements_document_name: p.requirements_document_name,
      created_at: p.created_at.as_deref().and_then(parse_timestamp),
      updated_at: p.updated_at.as_deref().and_then(parse_timestamp),
    }
  }
}

impl From<ApiProjectDetails> for ProjectDetails {
  fn from(d: ApiProjectDetails) -> Self {
    ProjectDetails {
      project: d.project.into(),
      requirement_counts: d.requirement_counts,
    }
  }
}

impl ApiRequirement {
  /// Convert to the display form, labelled with the owning project's author.
  pub fn into_requirement(self, author: &str) -> Requirement {
    Requirement {
      kind: RequirementKind::from_backend(&self.requirement_type),
      title: self.requirement_id.clone(),
      id: self.id,
      requirement_id: self.requirement_id,
      project_id: self.project_id,
      description: self.description,
      category: self.category,
      author: author.to_string(),
      created_at: self.created_at.as_deref().and_then(parse_timestamp),
      updated_at: self.updated_at.as_deref().and_then(parse_timestamp),
    }
  }
}

impl ApiErrorBody {
  /// Best-effort human readable message from a FastAPI error body.
  pub fn message(&self) -> Option<String> {
    match self.detail.as_ref()? {
      serde_json::Value::String(s) => Some(s.clone()),
      other => Some(other.to_string()),
    }
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse an API timestamp.
///
/// The backend emits RFC 3339 with an offset, but naive timestamps (no
/// offset) show up for rows written directly to the database; those are UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .map(|dt| dt.and_utc())
    .ok()
}
