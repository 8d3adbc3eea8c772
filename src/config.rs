use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  pub supabase: SupabaseConfig,
  /// Project to open when none is given on the command line
  pub default_project: Option<String>,
  /// Rows per page in requirement listings
  #[serde(default = "default_page_size")]
  pub page_size: usize,
  /// Log filter used when CASSIST_LOG is not set (e.g. "debug", "cassist=trace")
  pub log_level: Option<String>,
}

fn default_page_size() -> usize {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  #[serde(default = "default_api_prefix")]
  pub prefix: String,
}

fn default_api_url() -> String {
  "http://localhost:8000".to_string()
}

fn default_api_prefix() -> String {
  "/api".to_string()
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      prefix: default_api_prefix(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
  pub url: String,
  /// Public anon key. Prefer CASSIST_SUPABASE_ANON_KEY over putting it here.
  pub anon_key: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cassist.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cassist/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/cassist/config.yaml\n\
                 with at least:\n\n  supabase:\n    url: https://<project>.supabase.co\n"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("cassist.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cassist").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub(crate) fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.page_size == 0 {
      return Err(eyre!("page_size must be at least 1"));
    }
    Ok(config)
  }

  /// Get the Supabase anon key.
  ///
  /// Checks CASSIST_SUPABASE_ANON_KEY first, then the config file.
  pub fn anon_key(&self) -> Result<String> {
    std::env::var("CASSIST_SUPABASE_ANON_KEY")
      .ok()
      .or_else(|| self.supabase.anon_key.clone())
      .ok_or_else(|| {
        eyre!("Supabase anon key not found. Set CASSIST_SUPABASE_ANON_KEY or supabase.anon_key.")
      })
  }
}
