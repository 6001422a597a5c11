//! Session manager
//!
//! Keeps at most one live session per room using `DashMap` for concurrent
//! access. Each session gets its own breaker, keyed by room id.

use chat_core::RoomId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;

use super::session::{ConnectionSession, SessionConfig, SessionDeps};
use crate::error::SessionResult;

#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<RoomId, Arc<ConnectionSession>>,
    deps: SessionDeps,
}

impl SessionManager {
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// The room's live session, or a newly spawned one
    ///
    /// A new session is idle; call [`ConnectionSession::connect`] after
    /// subscribing to its events.
    pub fn open(&self, config: SessionConfig) -> SessionResult<Arc<ConnectionSession>> {
        let room_id = config.room.room_id;
        match self.sessions.entry(room_id) {
            Entry::Occupied(entry) if !entry.get().is_finished() => Ok(Arc::clone(entry.get())),
            entry => {
                let session = Arc::new(ConnectionSession::spawn(config, self.deps.clone())?);
                entry.insert(Arc::clone(&session));
                tracing::debug!(room_id = %room_id, session_id = %session.id(), "session added");
                Ok(session)
            }
        }
    }

    pub fn get(&self, room_id: RoomId) -> Option<Arc<ConnectionSession>> {
        self.sessions.get(&room_id).map(|s| Arc::clone(s.value()))
    }

    /// Close and forget a room's session; false if there was none
    pub async fn close(&self, room_id: RoomId) -> bool {
        let Some((_, session)) = self.sessions.remove(&room_id) else {
            return false;
        };
        session.close().await;
        tracing::debug!(room_id = %room_id, "session removed");
        true
    }

    pub async fn close_all(&self) {
        let rooms: Vec<RoomId> = self.sessions.iter().map(|e| *e.key()).collect();
        join_all(rooms.into_iter().map(|room_id| self.close(room_id))).await;
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<_> = self.sessions.iter().map(|e| *e.key()).collect();
        rooms.sort();
        rooms
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
