//! Authentication provider seam and session types.

mod session_file;
pub(crate) mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::broadcast;

use crate::error::Result;

pub use session_file::SessionFile;
pub use supabase::SupabaseAuth;

/// Authenticated identity for this client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: Option<String>,
  pub expires_at: Option<DateTime<Utc>>,
  pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
  pub id: String,
  pub email: Option<String>,
}

impl Session {
  /// Stable user id. The project/requirement API takes this as its bearer token.
  pub fn id(&self) -> &str {
    &self.user.id
  }

  pub fn is_expired(&self) -> bool {
    self.expires_at.is_some_and(|at| at <= Utc::now())
  }
}

/// Details for registering a new account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
  pub email: String,
  pub password: String,
  pub first_name: String,
  pub last_name: String,
}

/// Change notification pushed by the auth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
  SignedIn(Session),
  TokenRefreshed(Session),
  SignedOut,
}

impl AuthEvent {
  /// Session after this event, if any.
  pub fn session(&self) -> Option<&Session> {
    match self {
      AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) => Some(s),
      AuthEvent::SignedOut => None,
    }
  }
}

/// Email one-time-password flavours accepted by `verify_otp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpType {
  Signup,
  Invite,
  Magiclink,
  Recovery,
  EmailChange,
  Email,
}

impl OtpType {
  pub fn as_str(&self) -> &'static str {
    match self {
      OtpType::Signup => "signup",
      OtpType::Invite => "invite",
      OtpType::Magiclink => "magiclink",
      OtpType::Recovery => "recovery",
      OtpType::EmailChange => "email_change",
      OtpType::Email => "email",
    }
  }
}

impl FromStr for OtpType {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "signup" => Ok(OtpType::Signup),
      "invite" => Ok(OtpType::Invite),
      "magiclink" => Ok(OtpType::Magiclink),
      "recovery" => Ok(OtpType::Recovery),
      "email_change" => Ok(OtpType::EmailChange),
      "email" => Ok(OtpType::Email),
      other => Err(format!("unknown OTP type '{}'", other)),
    }
  }
}

/// Hosted auth/session provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
  /// Current session, refreshing it if the provider can.
  async fn get_session(&self) -> Result<Option<Session>>;

  /// Change notifications for as long as the receiver is held.
  fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

  async fn sign_out(&self) -> Result<()>;

  async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

  /// Register an account. `None` while the provider waits for the emailed
  /// confirmation; a session when it signs the user in straight away.
  async fn sign_up(&self, account: &NewAccount) -> Result<Option<Session>>;

  /// Email a password recovery link.
  async fn reset_password(&self, email: &str) -> Result<()>;

  /// Complete a PKCE email confirmation.
  async fn exchange_code_for_session(&self, code: &str) -> Result<Session>;

  /// Complete a token-hash email confirmation.
  async fn verify_otp(&self, otp_type: OtpType, token_hash: &str) -> Result<Session>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn session(expires_at: Option<DateTime<Utc>>) -> Session {
    Session {
      access_token: "jwt".to_string(),
      refresh_token: None,
      expires_at,
      user: SessionUser {
        id: "u1".to_string(),
        email: None,
      },
    }
  }

  #[test]
  fn test_session_expiry() {
    assert!(!session(None).is_expired());
    assert!(!session(Some(Utc::now() + Duration::hours(1))).is_expired());
    assert!(session(Some(Utc::now() - Duration::seconds(1))).is_expired());
  }

  #[test]
  fn test_otp_type_round_trip() {
    for t in ["signup", "invite", "magiclink", "recovery", "email_change", "email"] {
      assert_eq!(t.parse::<OtpType>().unwrap().as_str(), t);
    }
    assert!("sms".parse::<OtpType>().is_err());
  }

  #[test]
  fn test_event_session() {
    let s = session(None);
    assert_eq!(AuthEvent::SignedIn(s.clone()).session(), Some(&s));
    assert_eq!(AuthEvent::SignedOut.session(), None);
  }
}
