// Session persistence between runs.
// Plays the part of the browser storage the hosted auth client keeps its session in.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AssistError, Result};

use super::Session;

/// JSON file holding the last signed-in session
#[derive(Debug, Clone)]
pub struct SessionFile {
  path: PathBuf,
}

impl SessionFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Session file at the default location.
  pub fn open_default() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| AssistError::Invalid("Could not determine data directory".to_string()))?;

    Ok(Self::new(data_dir.join("cassist").join("session.json")))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn load(&self) -> Result<Option<Session>> {
    if !self.path.exists() {
      return Ok(None);
    }

    let contents = fs::read_to_string(&self.path)?;
    Ok(Some(serde_json::from_str(&contents)?))
  }

  pub fn save(&self, session: &Session) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(session)?;

    // Write atomically via temp file
    let temp_path = self.path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp_path, &self.path)?;

    Ok(())
  }

  pub fn clear(&self) -> Result<()> {
    if self.path.exists() {
      fs::remove_file(&self.path)?;
    }
    Ok(())
  }
}
