//! In-memory caching primitives shared by the stores.
//!
//! This module provides:
//! - Single-slot caches tagged by the context they are valid for
//! - Request-generation tickets for discarding stale responses
//! - `AppCaches`, the application-level container that owns every slot so
//!   the cache outlives individual store instances

mod generation;
mod slot;
mod traits;

use std::sync::Arc;

use crate::api::types::{Project, Requirement};
use crate::auth::Session;
use crate::store::settings::Settings;

pub use generation::Generations;
pub use slot::CacheSlot;
pub use traits::{CacheSource, Fetched};

/// Requirements cached for one project, with the author they were labelled with.
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementsEntry {
  pub requirements: Vec<Requirement>,
  pub author: String,
}

/// Every cache slot the application keeps.
///
/// Built once by the application container and handed to each store. A store
/// rebuilt from the same `AppCaches` sees what the previous instance cached.
#[derive(Debug, Default)]
pub struct AppCaches {
  /// Last known session, tagged by user id
  pub session: CacheSlot<String, Session>,
  /// Project list, tagged by user id
  pub projects: CacheSlot<String, Vec<Project>>,
  /// Requirements of a single project, tagged by project id
  pub requirements: CacheSlot<String, RequirementsEntry>,
  /// Settings record, tagged by user id
  pub settings: CacheSlot<String, Settings>,
}

impl AppCaches {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }
}
