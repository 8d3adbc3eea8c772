//! Settings rows over the hosted REST interface (PostgREST).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::auth::{supabase::service_url, Session};
use crate::error::{AssistError, Result};
use crate::store::settings::{Settings, SettingsBackend, SettingsField};

use super::client::check_response;

const TABLE: &str = "settings";

#[derive(Debug, Serialize)]
struct SettingsRow<'a> {
  user_id: &'a str,
  #[serde(flatten)]
  settings: &'a Settings,
}

/// `settings` table keyed by `user_id`, one row per user.
pub struct PostgrestSettings {
  client: Client,
  rest_url: Url,
  anon_key: String,
}

impl PostgrestSettings {
  pub fn new(project_url: &str, anon_key: String) -> Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("cassist/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      client,
      rest_url: service_url(project_url, "rest/v1/")?,
      anon_key,
    })
  }

  fn table_url(&self) -> Result<Url> {
    self
      .rest_url
      .join(TABLE)
      .map_err(|e| AssistError::Invalid(format!("Invalid settings endpoint: {}", e)))
  }

  /// Row-level security needs the user's own access token.
  fn authorize(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
    request
      .header("apikey", &self.anon_key)
      .bearer_auth(&session.access_token)
  }
}

fn select_columns() -> String {
  SettingsField::ALL
    .iter()
    .map(|f| f.column())
    .collect::<Vec<_>>()
    .join(",")
}

#[async_trait]
impl SettingsBackend for PostgrestSettings {
  async fn select(&self, session: &Session) -> Result<Option<Settings>> {
    let mut url = self.table_url()?;
    url
      .query_pairs_mut()
      .append_pair("user_id", &format!("eq.{}", session.id()))
      .append_pair("select", &select_columns())
      .append_pair("limit", "1");

    let request = self.authorize(self.client.get(url), session);
    let response = check_response(request.send().await?).await?;
    let mut rows: Vec<Settings> = response.json().await?;
    debug!(user_id = %session.id(), found = !rows.is_empty(), "Selected settings row");
    Ok(rows.pop())
  }

  async fn upsert(&self, session: &Session, settings: &Settings) -> Result<Settings> {
    let mut url = self.table_url()?;
    url.query_pairs_mut().append_pair("on_conflict", "user_id");

    let row = SettingsRow {
      user_id: session.id(),
      settings,
    };
    let request = self
      .authorize(self.client.post(url), session)
      .header("Prefer", "resolution=merge-duplicates,return=representation")
      .json(&row);

    let response = check_response(request.send().await?).await?;
    let mut rows: Vec<Settings> = response.json().await?;
    Ok(rows.pop().unwrap_or_else(|| settings.clone()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_table_url() {
    let backend = PostgrestSettings::new("https://abc.supabase.co", "anon".to_string()).unwrap();
    assert_eq!(
      backend.table_url().unwrap().as_str(),
      "https://abc.supabase.co/rest/v1/settings"
    );
  }

  #[test]
  fn test_select_columns() {
    assert_eq!(
      select_columns(),
      "require_brief_description,batch_mode,quantity_req_batch"
    );
  }

  #[test]
  fn test_row_flattens_settings() {
    let settings = Settings::default();
    let row = SettingsRow {
      user_id: "u1",
      settings: &settings,
    };
    assert_eq!(
      serde_json::to_value(&row).unwrap(),
      serde_json::json!({
        "user_id": "u1",
        "require_brief_description": true,
        "batch_mode": true,
        "quantity_req_batch": 5
      })
    );
  }
}
