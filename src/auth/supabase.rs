//! Hosted auth provider client (GoTrue REST API).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

use crate::error::{AssistError, Result};

use super::{AuthEvent, AuthProvider, NewAccount, OtpType, Session, SessionFile, SessionUser};

/// Capacity of the auth event channel; slow subscribers skip old events.
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  refresh_token: Option<String>,
  expires_in: Option<i64>,
  expires_at: Option<i64>,
  user: SessionUser,
}

impl TokenResponse {
  fn into_session(self) -> Session {
    let expires_at = self
      .expires_at
      .and_then(|secs| DateTime::from_timestamp(secs, 0))
      .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));

    Session {
      access_token: self.access_token,
      refresh_token: self.refresh_token,
      expires_at,
      user: self.user,
    }
  }
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
  error_description: Option<String>,
  msg: Option<String>,
  message: Option<String>,
  error: Option<String>,
}

impl AuthErrorBody {
  fn into_message(self) -> Option<String> {
    self
      .error_description
      .or(self.msg)
      .or(self.message)
      .or(self.error)
  }
}

/// Auth provider backed by the hosted GoTrue service.
///
/// The session is kept in memory and mirrored to a `SessionFile` so that the
/// next run starts signed in.
pub struct SupabaseAuth {
  client: Client,
  auth_url: Url,
  anon_key: String,
  session_file: SessionFile,
  current: Mutex<Option<Session>>,
  events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuth {
  pub fn new(project_url: &str, anon_key: String, session_file: SessionFile) -> Result<Self> {
    let auth_url = service_url(project_url, "auth/v1/")?;
    let client = Client::builder()
      .user_agent(concat!("cassist/", env!("CARGO_PKG_VERSION")))
      .build()?;
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    Ok(Self {
      client,
      auth_url,
      anon_key,
      session_file,
      current: Mutex::new(None),
      events,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .auth_url
      .join(path)
      .map_err(|e| AssistError::Invalid(format!("Invalid auth endpoint {}: {}", path, e)))
  }

  async fn send(&self, request: RequestBuilder) -> Result<Response> {
    let response = request.header("apikey", &self.anon_key).send().await?;
    if response.status().is_success() {
      return Ok(response);
    }

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<AuthErrorBody>(&text)
      .ok()
      .and_then(AuthErrorBody::into_message)
      .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), text));
    Err(AssistError::Auth(message))
  }

  async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
    let mut url = self.endpoint("token")?;
    url.query_pairs_mut().append_pair("grant_type", grant_type);

    let response = self.send(self.client.post(url).json(&body)).await?;
    let token: TokenResponse = response.json().await?;
    Ok(token.into_session())
  }

  /// Make `session` current, persist it and notify subscribers.
  fn adopt(&self, session: Session, event: fn(Session) -> AuthEvent) -> Result<Session> {
    self.session_file.save(&session)?;
    *self.current.lock()? = Some(session.clone());
    let _ = self.events.send(event(session.clone()));
    Ok(session)
  }

  fn forget(&self) -> Result<()> {
    *self.current.lock()? = None;
    self.session_file.clear()?;
    let _ = self.events.send(AuthEvent::SignedOut);
    Ok(())
  }

  async fn refresh(&self, refresh_token: &str) -> Result<Session> {
    let session = self
      .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
      .await?;
    info!(user_id = %session.id(), "Refreshed session");
    self.adopt(session, AuthEvent::TokenRefreshed)
  }

  fn stored_session(&self) -> Result<Option<Session>> {
    if let Some(session) = self.current.lock()?.clone() {
      return Ok(Some(session));
    }

    match self.session_file.load() {
      Ok(session) => {
        *self.current.lock()? = session.clone();
        Ok(session)
      }
      Err(e) => {
        warn!(path = %self.session_file.path().display(), error = %e, "Ignoring unreadable session file");
        Ok(None)
      }
    }
  }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
  async fn get_session(&self) -> Result<Option<Session>> {
    let Some(session) = self.stored_session()? else {
      return Ok(None);
    };

    if !session.is_expired() {
      return Ok(Some(session));
    }

    let Some(refresh_token) = session.refresh_token.clone() else {
      self.forget()?;
      return Ok(None);
    };

    match self.refresh(&refresh_token).await {
      Ok(session) => Ok(Some(session)),
      Err(e) => {
        warn!(error = %e, "Session expired and could not be refreshed");
        self.forget()?;
        Ok(None)
      }
    }
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
    self.events.subscribe()
  }

  async fn sign_out(&self) -> Result<()> {
    let session = self.current.lock()?.clone();

    // Revoke remotely, but always drop the local session
    let remote = match session {
      Some(session) => {
        let url = self.endpoint("logout")?;
        self
          .send(self.client.post(url).bearer_auth(&session.access_token))
          .await
          .map(|_| ())
      }
      None => Ok(()),
    };

    self.forget()?;
    remote
  }

  async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
    let session = self
      .token_grant("password", json!({ "email": email, "password": password }))
      .await?;
    info!(user_id = %session.id(), "Signed in");
    self.adopt(session, AuthEvent::SignedIn)
  }

  async fn sign_up(&self, account: &NewAccount) -> Result<Option<Session>> {
    let url = self.endpoint("signup")?;
    let body = json!({
      "email": account.email,
      "password": account.password,
      "data": {
        "first_name": account.first_name,
        "last_name": account.last_name,
      },
    });

    let response = self.send(self.client.post(url).json(&body)).await?;
    let value: serde_json::Value = response.json().await?;
    match signup_session(value)? {
      Some(session) => {
        info!(user_id = %session.id(), "Signed up and signed in");
        self.adopt(session, AuthEvent::SignedIn).map(Some)
      }
      None => {
        info!("Signed up, awaiting email confirmation");
        Ok(None)
      }
    }
  }

  async fn reset_password(&self, email: &str) -> Result<()> {
    let url = self.endpoint("recover")?;
    self
      .send(self.client.post(url).json(&json!({ "email": email })))
      .await?;
    info!("Password recovery requested");
    Ok(())
  }

  async fn exchange_code_for_session(&self, code: &str) -> Result<Session> {
    let session = self
      .token_grant("pkce", json!({ "auth_code": code }))
      .await?;
    self.adopt(session, AuthEvent::SignedIn)
  }

  async fn verify_otp(&self, otp_type: OtpType, token_hash: &str) -> Result<Session> {
    let url = self.endpoint("verify")?;
    let body = json!({ "type": otp_type.as_str(), "token_hash": token_hash });

    let response = self.send(self.client.post(url).json(&body)).await?;
    let token: TokenResponse = response.json().await?;
    self.adopt(token.into_session(), AuthEvent::SignedIn)
  }
}

/// Signup answers with a token when confirmation is off, and with the bare
/// user while the confirmation email is pending.
fn signup_session(value: serde_json::Value) -> Result<Option<Session>> {
  if value.get("access_token").is_none() {
    return Ok(None);
  }
  let token: TokenResponse = serde_json::from_value(value)?;
  Ok(Some(token.into_session()))
}

/// Resolve a service path (e.g. "auth/v1/") against the project URL.
pub(crate) fn service_url(project_url: &str, service: &str) -> Result<Url> {
  let mut base = Url::parse(project_url)
    .map_err(|e| AssistError::Invalid(format!("Invalid Supabase url {}: {}", project_url, e)))?;
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  base
    .join(service)
    .map_err(|e| AssistError::Invalid(format!("Invalid Supabase url {}: {}", project_url, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_service_url_normalizes_trailing_slash() {
    let a = service_url("https://abc.supabase.co", "auth/v1/").unwrap();
    let b = service_url("https://abc.supabase.co/", "auth/v1/").unwrap();
    assert_eq!(a.as_str(), "https://abc.supabase.co/auth/v1/");
    assert_eq!(a, b);

    let nested = service_url("http://localhost:54321/proxy", "rest/v1/").unwrap();
    assert_eq!(nested.as_str(), "http://localhost:54321/proxy/rest/v1/");
  }

  #[test]
  fn test_token_response_expiry() {
    let json = r#"{
      "access_token": "jwt",
      "refresh_token": "r",
      "expires_in": 3600,
      "expires_at": 1700000000,
      "user": {"id": "u1", "email": "ada@example.com", "role": "authenticated"}
    }"#;
    let token: TokenResponse = serde_json::from_str(json).unwrap();
    let session = token.into_session();
    assert_eq!(session.id(), "u1");
    assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1700000000));
  }

  #[test]
  fn test_token_response_expires_in_only() {
    let json = r#"{"access_token": "jwt", "expires_in": 60, "user": {"id": "u1"}}"#;
    let token: TokenResponse = serde_json::from_str(json).unwrap();
    let session = token.into_session();
    assert!(!session.is_expired());
    assert!(session.expires_at.is_some());
  }

  #[test]
  fn test_error_body_message_priority() {
    let body: AuthErrorBody = serde_json::from_str(
      r#"{"error": "invalid_grant", "error_description": "Invalid login credentials"}"#,
    )
    .unwrap();
    assert_eq!(
      body.into_message().as_deref(),
      Some("Invalid login credentials")
    );
  }

  #[test]
  fn test_signup_pending_confirmation_has_no_session() {
    let pending = json!({
      "id": "u1",
      "email": "ada@example.com",
      "confirmation_sent_at": "2024-01-01T00:00:00Z",
      "user_metadata": {"first_name": "Ada", "last_name": "Lovelace"}
    });
    assert!(signup_session(pending).unwrap().is_none());

    let signed_in = json!({
      "access_token": "jwt",
      "refresh_token": "r",
      "expires_in": 3600,
      "user": {"id": "u1", "email": "ada@example.com"}
    });
    let session = signup_session(signed_in).unwrap().unwrap();
    assert_eq!(session.id(), "u1");
    assert_eq!(session.refresh_token.as_deref(), Some("r"));
  }

  #[tokio::test]
  async fn test_get_session_reads_session_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = SessionFile::new(temp_dir.path().join("session.json"));
    let stored = Session {
      access_token: "jwt".to_string(),
      refresh_token: None,
      expires_at: None,
      user: SessionUser {
        id: "u1".to_string(),
        email: None,
      },
    };
    file.save(&stored).unwrap();

    let auth = SupabaseAuth::new("http://localhost:54321", "anon".to_string(), file).unwrap();
    assert_eq!(auth.get_session().await.unwrap(), Some(stored));
  }

  #[tokio::test]
  async fn test_expired_session_without_refresh_token_is_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let file = SessionFile::new(temp_dir.path().join("session.json"));
    file
      .save(&Session {
        access_token: "jwt".to_string(),
        refresh_token: None,
        expires_at: Some(Utc::now() - Duration::minutes(1)),
        user: SessionUser {
          id: "u1".to_string(),
          email: None,
        },
      })
      .unwrap();

    let auth = SupabaseAuth::new(
      "http://localhost:54321",
      "anon".to_string(),
      file.clone(),
    )
    .unwrap();
    let mut events = auth.subscribe();

    assert!(auth.get_session().await.unwrap().is_none());
    assert!(file.load().unwrap().is_none());
    assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
  }
}
