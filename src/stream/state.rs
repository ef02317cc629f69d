//! State shared between the ingestion and playback paths of a session.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use streamvault_media::StreamMetadata;

/// Highest timestamp (ms) observed on the session. Never decreases.
#[derive(Debug, Default)]
pub struct SessionClock {
    highest: AtomicU32,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the clock to `timestamp` if it is ahead; returns the new value.
    pub fn advance(&self, timestamp: u32) -> u32 {
        let previous = self.highest.fetch_max(timestamp, Ordering::AcqRel);
        previous.max(timestamp)
    }

    pub fn now(&self) -> u32 {
        self.highest.load(Ordering::Acquire)
    }
}

/// The live metadata of a session, replaced as a whole snapshot.
///
/// Readers get an `Arc` to an immutable snapshot; writers swap in a new one
/// and bump the version.
#[derive(Debug, Default)]
pub struct MetadataSlot {
    current: RwLock<Option<Arc<StreamMetadata>>>,
    version: AtomicU64,
}

impl MetadataSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new snapshot; returns its version.
    pub fn replace(&self, metadata: StreamMetadata) -> u64 {
        let mut current = self.current.write();
        *current = Some(Arc::new(metadata));
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn clear(&self) -> u64 {
        let mut current = self.current.write();
        *current = None;
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn snapshot(&self) -> Option<Arc<StreamMetadata>> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
