//! Error types for the store and API layers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistError {
  #[error("Not signed in")]
  Unauthenticated,

  #[error("Authentication rejected by the API")]
  Unauthorized,

  #[error("Resource not found: {0}")]
  NotFound(String),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Auth provider error: {0}")]
  Auth(String),

  #[error("JSON parsing error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Lock poisoned: {0}")]
  Lock(String),

  #[error("{0}")]
  Invalid(String),
}

impl AssistError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, AssistError::NotFound(_))
  }
}

impl<T> From<std::sync::PoisonError<T>> for AssistError {
  fn from(e: std::sync::PoisonError<T>) -> Self {
    AssistError::Lock(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, AssistError>;
