//! Session store: the authenticated identity for this process.

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{AuthEvent, AuthProvider, NewAccount, OtpType, Session};
use crate::cache::AppCaches;
use crate::error::{AssistError, Result};

#[derive(Debug, Default)]
struct SessionState {
  session: Option<Session>,
  loading: bool,
}

/// How an emailed confirmation link identified the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
  /// PKCE flow
  Code(String),
  /// Token-hash flow
  TokenHash { token_hash: String, otp_type: OtpType },
}

/// Holds the current session and mirrors provider change notifications.
pub struct SessionStore {
  provider: Arc<dyn AuthProvider>,
  caches: Arc<AppCaches>,
  state: Arc<Mutex<SessionState>>,
  listener: JoinHandle<()>,
}

impl SessionStore {
  /// Create the store and subscribe to provider notifications.
  ///
  /// A session already in the process-wide cache is adopted immediately and
  /// `load` becomes a no-op. Must be called inside a Tokio runtime.
  pub fn new(provider: Arc<dyn AuthProvider>, caches: Arc<AppCaches>) -> Self {
    let cached = caches
      .session
      .peek()
      .ok()
      .flatten()
      .map(|entry| entry.value);

    let state = Arc::new(Mutex::new(SessionState {
      loading: cached.is_none(),
      session: cached,
    }));

    let listener = tokio::spawn(mirror_events(
      provider.subscribe(),
      Arc::clone(&state),
      Arc::clone(&caches),
    ));

    Self {
      provider,
      caches,
      state,
      listener,
    }
  }

  /// Fetch the session from the provider unless one was already cached.
  ///
  /// A provider failure leaves the store signed out; it is not retried.
  pub async fn load(&self) -> Result<()> {
    self.ensure_session().await.map(|_| ())
  }

  /// Current session, asking the provider again when the held one expired.
  ///
  /// The provider refreshes an expired session from its refresh token, so a
  /// long-lived process stays signed in past the access token's lifetime.
  pub async fn ensure_session(&self) -> Result<Option<Session>> {
    let stale = {
      let state = self.state.lock()?;
      state.loading || state.session.as_ref().is_some_and(Session::is_expired)
    };
    if !stale {
      return Ok(self.get_session());
    }

    let session = match self.provider.get_session().await {
      Ok(session) => session,
      Err(e) => {
        warn!(error = %e, "Failed to fetch session");
        None
      }
    };

    self.apply(session)?;
    Ok(self.get_session())
  }

  /// Current session; an expired session counts as none.
  pub fn get_session(&self) -> Option<Session> {
    let state = self.state.lock().ok()?;
    state.session.clone().filter(|s| !s.is_expired())
  }

  pub fn current_user_id(&self) -> Option<String> {
    self.get_session().map(|s| s.id().to_string())
  }

  /// Current session, or `Unauthenticated`.
  pub fn require_session(&self) -> Result<Session> {
    self.get_session().ok_or(AssistError::Unauthenticated)
  }

  pub fn is_loading(&self) -> bool {
    self.state.lock().map(|s| s.loading).unwrap_or(false)
  }

  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
    let session = self.provider.sign_in_with_password(email, password).await?;
    self.apply(Some(session.clone()))?;
    Ok(session)
  }

  /// Register an account; signed in only if the provider skips confirmation.
  pub async fn sign_up(&self, account: &NewAccount) -> Result<Option<Session>> {
    if account.email.trim().is_empty() || account.password.is_empty() {
      return Err(AssistError::Invalid(
        "Email and password are required".to_string(),
      ));
    }

    let session = self.provider.sign_up(account).await?;
    if let Some(session) = &session {
      self.apply(Some(session.clone()))?;
    }
    Ok(session)
  }

  pub async fn reset_password(&self, email: &str) -> Result<()> {
    if email.trim().is_empty() {
      return Err(AssistError::Invalid("Email is required".to_string()));
    }
    self.provider.reset_password(email.trim()).await
  }

  /// Clear local and cached state and tell the provider.
  ///
  /// Local state is cleared even if the provider call fails.
  pub async fn sign_out(&self) -> Result<()> {
    let remote = self.provider.sign_out().await;
    self.apply(None)?;
    if let Err(e) = &remote {
      warn!(error = %e, "Provider sign-out failed; local session cleared anyway");
    }
    remote
  }

  /// Complete an email confirmation, then sign out so the user logs in explicitly.
  pub async fn confirm_email(&self, confirmation: &Confirmation) -> Result<Session> {
    let session = match confirmation {
      Confirmation::Code(code) => self.provider.exchange_code_for_session(code).await?,
      Confirmation::TokenHash {
        token_hash,
        otp_type,
      } => self.provider.verify_otp(*otp_type, token_hash).await?,
    };
    info!(user_id = %session.id(), "Email confirmed");

    self.sign_out().await?;
    Ok(session)
  }

  fn apply(&self, session: Option<Session>) -> Result<()> {
    let mut state = self.state.lock()?;
    mirror(&self.caches, &session)?;
    state.session = session;
    state.loading = false;
    Ok(())
  }
}

impl Drop for SessionStore {
  fn drop(&mut self) {
    self.listener.abort();
  }
}

fn mirror(caches: &AppCaches, session: &Option<Session>) -> Result<()> {
  match session {
    Some(s) => caches.session.put(s.id().to_string(), s.clone()),
    None => caches.session.clear(),
  }
}

async fn mirror_events(
  mut events: tokio::sync::broadcast::Receiver<AuthEvent>,
  state: Arc<Mutex<SessionState>>,
  caches: Arc<AppCaches>,
) {
  loop {
    match events.recv().await {
      Ok(event) => {
        debug!(?event, "Auth state changed");
        let session = event.session().cloned();
        if let Err(e) = mirror(&caches, &session) {
          warn!(error = %e, "Failed to mirror session into cache");
        }
        match state.lock() {
          Ok(mut state) => {
            state.session = session;
            state.loading = false;
          }
          Err(e) => {
            warn!(error = %e, "Session state poisoned, stopping auth listener");
            break;
          }
        }
      }
      Err(RecvError::Lagged(skipped)) => {
        warn!(skipped, "Auth listener lagged behind");
      }
      Err(RecvError::Closed) => break,
    }
  }
}
