//! Session registry: one entry per connected client, tracking whether a
//! generation is currently running and how to interrupt it.

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("a generation is already running for this session")]
    GenerationActive,
}

/// Cancellation signal for one in-flight generation. Dropping the handle
/// closes the channel, which the generation task also treats as a cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug)]
struct Session {
    generation: Option<CancelHandle>,
}

/// Shared, concurrent map of live sessions. Cheap to clone behind an `Arc`;
/// all methods take `&self`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return its id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), Session { generation: None });
        id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop a session. Any generation still running for it is cancelled so
    /// the task stops streaming into a dead connection.
    pub fn remove(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            if let Some(handle) = session.generation {
                handle.cancel();
            }
        }
    }

    /// Mark a generation as running and hand back the receiver the task
    /// watches for cancellation. Fails if one is already running.
    pub fn begin_generation(&self, id: &str) -> Result<watch::Receiver<bool>, SessionError> {
        let mut session = self.sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.generation.is_some() {
            return Err(SessionError::GenerationActive);
        }
        let (handle, rx) = CancelHandle::new();
        session.generation = Some(handle);
        Ok(rx)
    }

    /// Clear the running-generation marker. Called by the generation task on
    /// every exit path, including cancellation and failure.
    pub fn end_generation(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.generation = None;
        }
    }

    /// Signal the session's in-flight generation, if any. Returns whether a
    /// generation was actually signalled; cancelling an idle or unknown
    /// session is a no-op.
    pub fn cancel(&self, id: &str) -> bool {
        match self.sessions.get(id) {
            Some(session) => match &session.generation {
                Some(handle) => {
                    handle.cancel();
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}
