//! Gallery cache — bounded-staleness snapshots of the identity roster.
//!
//! The original pipeline rebuilt the gallery from storage on every
//! processed frame. Here the gallery is rebuilt only when the published
//! snapshot is older than the configured bound, so an activation change
//! takes effect within that many seconds. Each rebuild publishes a new
//! snapshot behind `Arc`; a worker mid-frame keeps the clone it started
//! with and picks up the fresh one next iteration.

use crate::interfaces::{IdentitySource, SourceError};
use rollcall_core::gallery::GalleryEntry;
use rollcall_core::{EncodeError, Encoder, Gallery};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("identity source: {0}")]
    Source(#[from] SourceError),
    #[error("gallery encode: {0}")]
    Encode(#[from] EncodeError),
    #[error("gallery cache lock poisoned")]
    Poisoned,
}

/// Read-shared view of the roster for one recognition cycle.
#[derive(Clone)]
pub struct RosterSnapshot {
    pub gallery: Arc<Gallery>,
    /// Display name → identity id, for attributing match outcomes.
    pub ids_by_name: Arc<HashMap<String, i64>>,
}

struct CachedRoster {
    snapshot: RosterSnapshot,
    built_at: Instant,
}

pub struct GalleryCache {
    source: Arc<dyn IdentitySource>,
    encoder: Mutex<Box<dyn Encoder>>,
    max_age: Duration,
    state: Mutex<Option<CachedRoster>>,
}

impl GalleryCache {
    pub fn new(
        source: Arc<dyn IdentitySource>,
        encoder: Box<dyn Encoder>,
        max_age: Duration,
    ) -> Self {
        Self {
            source,
            encoder: Mutex::new(encoder),
            max_age,
            state: Mutex::new(None),
        }
    }

    /// Current snapshot, rebuilding first if the cached one is stale.
    pub fn snapshot(&self) -> Result<RosterSnapshot, CacheError> {
        {
            let state = self.state.lock().map_err(|_| CacheError::Poisoned)?;
            if let Some(cached) = state.as_ref() {
                if cached.built_at.elapsed() < self.max_age {
                    return Ok(cached.snapshot.clone());
                }
            }
        }
        self.rebuild()
    }

    /// Drop the cached snapshot so the next request rebuilds.
    pub fn invalidate(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = None;
        }
    }

    fn rebuild(&self) -> Result<RosterSnapshot, CacheError> {
        let identities = self.source.list_active()?;

        let mut entries = Vec::with_capacity(identities.len());
        let mut ids_by_name = HashMap::with_capacity(identities.len());

        for identity in identities {
            // An unreadable reference image leaves the identity out of
            // this cycle, same as a reference with no detectable face.
            let image = match image::open(&identity.reference_image_path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(
                        name = %identity.name,
                        path = %identity.reference_image_path.display(),
                        error = %e,
                        "reference image unreadable; excluding identity"
                    );
                    continue;
                }
            };
            ids_by_name.insert(identity.name.clone(), identity.id);
            entries.push(GalleryEntry { name: identity.name, image });
        }

        let gallery = {
            let mut encoder = self.encoder.lock().map_err(|_| CacheError::Poisoned)?;
            Gallery::build(encoder.as_mut(), &entries)?
        };

        tracing::debug!(size = gallery.len(), "published gallery snapshot");

        let snapshot = RosterSnapshot {
            gallery: Arc::new(gallery),
            ids_by_name: Arc::new(ids_by_name),
        };

        let mut state = self.state.lock().map_err(|_| CacheError::Poisoned)?;
        *state = Some(CachedRoster {
            snapshot: snapshot.clone(),
            built_at: Instant::now(),
        });
        Ok(snapshot)
    }
}
