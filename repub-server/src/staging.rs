//! Pending uploads awaiting finalization.
//!
//! Phase two of a publish stores the archive here under a random finalize
//! token; phase three takes it back out exactly once. Entries live in process
//! memory only, so a restart drops every pending upload.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Opaque token binding a staged upload to its finalize call.
pub type FinalizeToken = String;

/// A staged archive and the identity that uploaded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub archive: Vec<u8>,
    pub uploader: String,
}

/// Set of pending uploads shared by all in-flight requests.
pub trait UploadStaging: Send + Sync {
    /// Store an upload and return the token that finalizes it.
    fn stage(&self, upload: PendingUpload) -> FinalizeToken;

    /// Atomically remove and return the upload staged under `token`.
    fn take(&self, token: &str) -> Option<PendingUpload>;

    /// Number of uploads currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StagedEntry {
    upload: PendingUpload,
    staged_at: Instant,
}

/// Mutex-protected in-memory staging area.
///
/// With a TTL, entries older than the TTL are purged whenever a new upload is
/// staged and are never handed out by [`UploadStaging::take`]. Without one,
/// abandoned uploads stay until the process exits.
pub struct MemoryUploadStaging {
    entries: Mutex<HashMap<FinalizeToken, StagedEntry>>,
    ttl: Option<Duration>,
}

impl MemoryUploadStaging {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, entry: &StagedEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.staged_at) >= ttl)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<FinalizeToken, StagedEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryUploadStaging {
    fn default() -> Self {
        Self::new(None)
    }
}

impl UploadStaging for MemoryUploadStaging {
    fn stage(&self, upload: PendingUpload) -> FinalizeToken {
        let token = Uuid::new_v4().to_string();
        let now = Instant::now();
        let mut entries = self.lock();

        if self.ttl.is_some() {
            let before = entries.len();
            entries.retain(|_, entry| !self.is_expired(entry, now));
            let purged = before - entries.len();
            if purged > 0 {
                debug!(purged, "Purged expired pending uploads");
            }
        }

        entries.insert(
            token.clone(),
            StagedEntry {
                upload,
                staged_at: now,
            },
        );
        token
    }

    fn take(&self, token: &str) -> Option<PendingUpload> {
        let entry = self.lock().remove(token)?;
        if self.is_expired(&entry, Instant::now()) {
            debug!(token, "Pending upload expired before finalization");
            return None;
        }
        Some(entry.upload)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
