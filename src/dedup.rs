//! Run-scoped deduplication keyed by `(source_id, external_id)`.
//!
//! A [`SeenSet`] is a cheap cloneable handle; all clones share one set. The
//! presence check and the insert happen under a single lock, so two source
//! tasks can never both admit the same key.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::HarvestError;
use crate::models::Item;

type Key = (String, String);

#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    inner: Arc<Mutex<HashSet<Key>>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenFile {
    /// Sorted for stable files.
    seen: BTreeSet<Key>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Key>> {
        // A panicking holder cannot leave the set half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit `item` unless its key was seen before. Inserts on admission.
    pub fn admit(&self, item: &Item) -> bool {
        self.lock()
            .insert((item.source_id.clone(), item.external_id.clone()))
    }

    pub fn contains(&self, source_id: &str, external_id: &str) -> bool {
        self.lock()
            .contains(&(source_id.to_string(), external_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Load a set persisted by [`SeenSet::save`]. A missing file yields an empty set.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            debug!("No seen file yet; starting empty");
            return Ok(Self::new());
        }
        let data = tokio::fs::read_to_string(path).await?;
        let file: SeenFile = serde_json::from_str(&data)?;
        info!(entries = file.seen.len(), "Loaded seen set");
        Ok(Self {
            inner: Arc::new(Mutex::new(file.seen.into_iter().collect())),
        })
    }

    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), HarvestError> {
        let file = SeenFile {
            seen: self.lock().iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path.as_ref(), json).await?;
        info!(entries = file.seen.len(), "Saved seen set");
        Ok(())
    }
}
