//! View-state stores over the external collaborators.
//!
//! Each store keeps its visible state behind a `std::sync::Mutex` that is
//! never held across an `.await`; the only suspension points are the
//! collaborator calls. Cached data lives in the shared `AppCaches`, not in
//! the store, so a rebuilt store picks up where the previous one left off.

pub mod projects;
pub mod requirements;
pub mod session;
pub mod settings;

#[cfg(test)]
pub(crate) mod fakes;

pub use projects::ProjectStore;
pub use requirements::RequirementStore;
pub use session::SessionStore;
pub use settings::SettingsStore;

/// Load lifecycle of a store for its current key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
  /// Nothing loaded for the current key
  #[default]
  Unloaded,
  /// A fetch is in flight
  Loading,
  /// Data for the current key is present (possibly stale after a failed refresh)
  Loaded,
}

impl LoadState {
  pub fn is_loading(&self) -> bool {
    matches!(self, LoadState::Loading)
  }
}
