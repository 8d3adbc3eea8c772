use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Project owned by the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  pub user_id: Option<String>,
  /// Human-facing project code (e.g. "CA-01")
  pub project_id: Option<String>,
  pub title: String,
  pub description: Option<String>,
  pub author_first_name: Option<String>,
  pub author_last_name: Option<String>,
  pub vision_document_name: Option<String>,
  pub vision_extracted_text: Option<String>,
  pub requirements_document_name: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
  /// Author display name, "First Last" with missing parts skipped.
  pub fn author(&self) -> String {
    [&self.author_first_name, &self.author_last_name]
      .iter()
      .filter_map(|part| part.as_deref())
      .map(str::trim)
      .filter(|part| !part.is_empty())
      .collect::<Vec<_>>()
      .join(" ")
  }

  /// Code shown in listings, falling back to the title.
  pub fn display_code(&self) -> &str {
    self
      .project_id
      .as_deref()
      .filter(|c| !c.is_empty())
      .unwrap_or(&self.title)
  }
}

/// Requirement counts per kind for a single project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCounts {
  #[serde(default)]
  pub functional: u32,
  #[serde(default)]
  pub non_functional: u32,
  #[serde(default)]
  pub conjectural: u32,
}

impl RequirementCounts {
  pub fn total(&self) -> u32 {
    self.functional + self.non_functional + self.conjectural
  }
}

/// Project metadata with requirement counts
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDetails {
  pub project: Project,
  pub requirement_counts: RequirementCounts,
}

/// Requirement formatted for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
  pub id: String,
  pub requirement_id: String,
  pub project_id: String,
  pub title: String,
  pub description: String,
  pub kind: RequirementKind,
  pub category: Option<NfrCategory>,
  pub author: String,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

/// Requirement type as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementKind {
  Functional,
  NonFunctional,
  Conjectural,
}

impl RequirementKind {
  pub const ALL: [RequirementKind; 3] = [
    RequirementKind::Functional,
    RequirementKind::NonFunctional,
    RequirementKind::Conjectural,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      RequirementKind::Functional => "Functional",
      RequirementKind::NonFunctional => "Non-Functional",
      RequirementKind::Conjectural => "Conjectural",
    }
  }

  /// Map the wire type to the display type.
  ///
  /// Unrecognized wire values fall back to `Functional` so a listing never
  /// fails on one odd row; the fallback is logged so the data issue is visible.
  pub fn from_backend(backend: &BackendRequirementType) -> Self {
    match backend {
      BackendRequirementType::Functional => RequirementKind::Functional,
      BackendRequirementType::NonFunctional => RequirementKind::NonFunctional,
      BackendRequirementType::Conjectural => RequirementKind::Conjectural,
      BackendRequirementType::Other(raw) => {
        warn!(requirement_type = %raw, "Unrecognized requirement type, showing as Functional");
        RequirementKind::Functional
      }
    }
  }

  pub fn to_backend(self) -> BackendRequirementType {
    match self {
      RequirementKind::Functional => BackendRequirementType::Functional,
      RequirementKind::NonFunctional => BackendRequirementType::NonFunctional,
      RequirementKind::Conjectural => BackendRequirementType::Conjectural,
    }
  }
}

impl fmt::Display for RequirementKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for RequirementKind {
  type Err = String;

  /// Accepts display labels and wire spellings, case-insensitive.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
      "functional" | "f" => Ok(RequirementKind::Functional),
      "non_functional" | "nonfunctional" | "nf" => Ok(RequirementKind::NonFunctional),
      "conjectural" | "c" => Ok(RequirementKind::Conjectural),
      other => Err(format!(
        "unknown requirement type '{}' (expected functional, non-functional or conjectural)",
        other
      )),
    }
  }
}

/// Requirement type as stored by the backend (snake_case on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackendRequirementType {
  Functional,
  NonFunctional,
  Conjectural,
  /// Any value this client does not know about
  Other(String),
}

impl BackendRequirementType {
  pub fn as_str(&self) -> &str {
    match self {
      BackendRequirementType::Functional => "functional",
      BackendRequirementType::NonFunctional => "non_functional",
      BackendRequirementType::Conjectural => "conjectural",
      BackendRequirementType::Other(raw) => raw,
    }
  }
}

impl From<String> for BackendRequirementType {
  fn from(raw: String) -> Self {
    match raw.as_str() {
      "functional" => BackendRequirementType::Functional,
      "non_functional" => BackendRequirementType::NonFunctional,
      "conjectural" => BackendRequirementType::Conjectural,
      _ => BackendRequirementType::Other(raw),
    }
  }
}

impl From<BackendRequirementType> for String {
  fn from(t: BackendRequirementType) -> Self {
    t.as_str().to_string()
  }
}

/// Classification of a non-functional requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NfrCategory {
  Interoperability,
  Reliability,
  Performance,
  Availability,
  Scalability,
  Maintainability,
  Portability,
  Security,
  Usability,
  Regulatory,
  Constraint,
  #[serde(other)]
  Other,
}

impl NfrCategory {
  pub fn label(&self) -> &'static str {
    match self {
      NfrCategory::Interoperability => "interoperability",
      NfrCategory::Reliability => "reliability",
      NfrCategory::Performance => "performance",
      NfrCategory::Availability => "availability",
      NfrCategory::Scalability => "scalability",
      NfrCategory::Maintainability => "maintainability",
      NfrCategory::Portability => "portability",
      NfrCategory::Security => "security",
      NfrCategory::Usability => "usability",
      NfrCategory::Regulatory => "regulatory",
      NfrCategory::Constraint => "constraint",
      NfrCategory::Other => "other",
    }
  }
}

/// Stored project document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
  Vision,
  Requirements,
}

impl DocumentKind {
  pub fn path_segment(&self) -> &'static str {
    match self {
      DocumentKind::Vision => "vision",
      DocumentKind::Requirements => "requirements",
    }
  }
}

impl FromStr for DocumentKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "vision" => Ok(DocumentKind::Vision),
      "requirements" => Ok(DocumentKind::Requirements),
      other => Err(format!(
        "unknown document type '{}' (expected vision or requirements)",
        other
      )),
    }
  }
}

/// Downloaded document payload
#[derive(Debug, Clone)]
pub struct Document {
  pub file_name: String,
  pub bytes: Vec<u8>,
}

/// Functional requirement extracted from a requirements document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFunctional {
  pub id: String,
  pub description: String,
}

/// Non-functional requirement extracted from a requirements document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedNonFunctional {
  pub id: String,
  pub description: String,
  pub category: NfrCategory,
}

/// Requirements to attach to a new project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRequirements {
  #[serde(default)]
  pub functional: Vec<ExtractedFunctional>,
  #[serde(default)]
  pub non_functional: Vec<ExtractedNonFunctional>,
}

/// Input for project creation
#[derive(Debug, Clone, Default)]
pub struct NewProject {
  pub title: String,
  pub project_id: Option<String>,
  pub description: Option<String>,
  pub vision_file: Option<PathBuf>,
  pub vision_extracted_text: Option<String>,
  pub requirements_file: Option<PathBuf>,
  pub requirements: Option<ExtractedRequirements>,
}

/// Result of project creation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectCreated {
  #[serde(default)]
  pub success: bool,
  pub project_id: String,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub requirements_count: u32,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn project(first: Option<&str>, last: Option<&str>) -> Project {
    Project {
      id: "p1".to_string(),
      user_id: None,
      project_id: None,
      title: "Alpha".to_string(),
      description: None,
      author_first_name: first.map(String::from),
      author_last_name: last.map(String::from),
      vision_document_name: None,
      vision_extracted_text: None,
      requirements_document_name: None,
      created_at: None,
      updated_at: None,
    }
  }

  #[test]
  fn test_author_joins_names() {
    assert_eq!(project(Some("Ada"), Some("Lovelace")).author(), "Ada Lovelace");
    assert_eq!(project(Some("Ada"), None).author(), "Ada");
    assert_eq!(project(None, Some(" ")).author(), "");
  }

  #[test]
  fn test_display_code_falls_back_to_title() {
    let mut p = project(None, None);
    assert_eq!(p.display_code(), "Alpha");
    p.project_id = Some("CA-01".to_string());
    assert_eq!(p.display_code(), "CA-01");
  }

  #[test]
  fn test_backend_frontend_backend_round_trip() {
    for raw in ["functional", "non_functional", "conjectural"] {
      let backend = BackendRequirementType::from(raw.to_string());
      let kind = RequirementKind::from_backend(&backend);
      assert_eq!(kind.to_backend(), backend);
      assert_eq!(kind.to_backend().as_str(), raw);
    }
  }

  #[test]
  fn test_unrecognized_backend_type_falls_back_to_functional() {
    let backend: BackendRequirementType = serde_json::from_str("\"legacy\"").unwrap();
    assert_eq!(backend, BackendRequirementType::Other("legacy".to_string()));
    assert_eq!(
      RequirementKind::from_backend(&backend),
      RequirementKind::Functional
    );
  }

  #[test]
  fn test_kind_from_str_accepts_labels_and_wire_names() {
    assert_eq!(
      "Non-Functional".parse::<RequirementKind>(),
      Ok(RequirementKind::NonFunctional)
    );
    assert_eq!(
      "non_functional".parse::<RequirementKind>(),
      Ok(RequirementKind::NonFunctional)
    );
    assert_eq!(
      "CONJECTURAL".parse::<RequirementKind>(),
      Ok(RequirementKind::Conjectural)
    );
    assert!("epic".parse::<RequirementKind>().is_err());
  }

  #[test]
  fn test_unknown_category_deserializes_as_other() {
    let c: NfrCategory = serde_json::from_str("\"security\"").unwrap();
    assert_eq!(c, NfrCategory::Security);
    let c: NfrCategory = serde_json::from_str("\"compliance\"").unwrap();
    assert_eq!(c, NfrCategory::Other);
  }
}
