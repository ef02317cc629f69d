//! Message streams of one connection.
//!
//! Tracks the live [`StreamSession`]s of a connection by numeric stream id,
//! allocating the lowest free id on `createStream` and reclaiming it when the
//! session is torn down.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use streamvault_common::paths::RecordStore;
use streamvault_common::StreamId;

use crate::stream::{FinalizeOutcome, SessionSettings, StreamSession};
use crate::transport::Transport;

/// Thread-safe registry of the stream sessions on a connection.
#[derive(Clone)]
pub struct StreamRegistry {
    sessions: Arc<DashMap<StreamId, Arc<StreamSession>>>,
    transport: Arc<dyn Transport>,
    store: RecordStore,
    settings: SessionSettings,
}

impl StreamRegistry {
    pub fn new(transport: Arc<dyn Transport>, store: RecordStore, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            transport,
            store,
            settings,
        }
    }

    /// Create a session under the lowest free stream id (ids start at 1).
    ///
    /// The session frees its id when it is disposed, whichever path
    /// disposes it.
    pub fn create_stream(&self) -> Arc<StreamSession> {
        let mut id = 1u32;
        loop {
            match self.sessions.entry(StreamId::new(id)) {
                Entry::Vacant(entry) => {
                    let sessions = Arc::downgrade(&self.sessions);
                    let session = StreamSession::new(
                        StreamId::new(id),
                        self.transport.clone(),
                        self.store.clone(),
                        self.settings.clone(),
                    )
                    .with_destroy_hook(move |stream_id| {
                        if let Some(sessions) = sessions.upgrade() {
                            release(&sessions, stream_id);
                        }
                    });
                    let session = Arc::new(session);
                    entry.insert(session.clone());
                    tracing::debug!(stream_id = id, "Created message stream");
                    return session;
                }
                Entry::Occupied(_) => id += 1,
            }
        }
    }

    pub fn get(&self, stream_id: StreamId) -> Option<Arc<StreamSession>> {
        self.sessions.get(&stream_id).map(|entry| entry.value().clone())
    }

    /// Forget a session whose stream is being destroyed, freeing its id.
    pub fn reclaim(&self, stream_id: StreamId) -> Option<Arc<StreamSession>> {
        let removed = self.sessions.remove(&stream_id).map(|(_, session)| session);
        if removed.is_some() {
            tracing::debug!(stream_id = %stream_id, "Reclaimed message stream id");
        }
        removed
    }

    /// Dispose the session and release its id.
    pub async fn delete_stream(&self, stream_id: StreamId) -> Option<FinalizeOutcome> {
        let session = self.reclaim(stream_id)?;
        session.delete_stream().await
    }

    /// Ids of the live sessions, ascending.
    pub fn list(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Dispose every session, e.g. when the connection closes.
    ///
    /// # Returns
    /// The number of sessions disposed.
    pub async fn dispose_all(&self) -> usize {
        let ids = self.list();
        let mut disposed = 0;
        for id in ids {
            if let Some(session) = self.reclaim(id) {
                session.dispose().await;
                disposed += 1;
            }
        }
        if disposed > 0 {
            tracing::info!(count = disposed, "Disposed all message streams");
        }
        disposed
    }
}

/// Drop the entry for `stream_id` if its session is disposed. The id may
/// already have been reclaimed and handed to a new stream.
fn release(sessions: &DashMap<StreamId, Arc<StreamSession>>, stream_id: StreamId) {
    if sessions
        .remove_if(&stream_id, |_, session| session.is_disposed())
        .is_some()
    {
        tracing::debug!(stream_id = %stream_id, "Released disposed message stream id");
    }
}
