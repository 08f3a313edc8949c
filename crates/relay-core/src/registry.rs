//! The session registry: live handles plus durable existence markers.
//!
//! # Layout
//!
//! ```text
//! by_session:     SessionId    → Arc<dyn Connection>
//! by_connection:  ConnectionId → SessionId
//! ```
//!
//! Both maps sit behind one `parking_lot::Mutex`, and every public operation
//! takes that lock exactly once, so no caller can observe one map updated and
//! the other not.  The lock is never held across an `.await`; sending on a
//! handle happens after [`SessionRegistry::lookup`] has returned a clone of
//! the `Arc`.
//!
//! # Durable facet
//!
//! `mark_durable` / `clear_durable` / `is_durable` go to the [`DurableStore`]
//! and are bounded by `store_timeout`.  The registry does not order durable
//! writes against index changes on its own; the lifecycle handler does (flag
//! before handle on open, handle before flag on close), which is what keeps
//! "live handle without durable flag" unobservable.
//!
//! # Claims and retired ids
//!
//! A session may only be opened from `Unknown`.  [`SessionRegistry::claim`]
//! reserves an id for the duration of an open and refuses ids that are live,
//! already being opened, or retired.  [`SessionRegistry::retire_connection`]
//! removes a closing handle and records its id as retired in the same
//! critical section, so a closed id can never be opened again.  Retired ids
//! are kept in a FIFO bounded by `retired_capacity`; the oldest are forgotten
//! first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::session::{ConnectionId, SessionId, SessionState};
use crate::store::{session_key, DurableStore, StoreError, PRESENCE_MARKER};

/// Default bound on a single durable store operation.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of retired session ids remembered.
pub const DEFAULT_RETIRED_CAPACITY: usize = 100_000;

/// Why a session id cannot be opened.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OpenRefused {
    /// A live handle is already filed under the id.
    #[error("session already has a live connection")]
    Live,

    /// Another open of the same id is in progress.
    #[error("session is already being opened")]
    Opening,

    /// The session has closed; ids are never reused.
    #[error("session has already closed")]
    Retired,

    /// The store already holds a marker for the id (an earlier process).
    #[error("session marker already exists")]
    Durable,
}

#[derive(Default)]
struct Index {
    by_session: HashMap<SessionId, Arc<dyn Connection>>,
    by_connection: HashMap<ConnectionId, SessionId>,
    opening: HashSet<SessionId>,
    retired: HashSet<SessionId>,
    retired_order: VecDeque<SessionId>,
}

impl Index {
    fn detach_session(&mut self, session_id: &SessionId) -> Option<Arc<dyn Connection>> {
        let handle = self.by_session.remove(session_id)?;
        self.by_connection.remove(&handle.id());
        Some(handle)
    }

    fn detach_connection(&mut self, connection_id: ConnectionId) -> Option<SessionId> {
        let session_id = self.by_connection.remove(&connection_id)?;
        // Only drop the forward entry if it still points at this handle.
        if self
            .by_session
            .get(&session_id)
            .is_some_and(|h| h.id() == connection_id)
        {
            self.by_session.remove(&session_id);
        }
        Some(session_id)
    }

    fn retire(&mut self, session_id: SessionId, capacity: usize) {
        if !self.retired.insert(session_id.clone()) {
            return;
        }
        self.retired_order.push_back(session_id);
        while self.retired_order.len() > capacity {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }
}

/// Mapping from session id to live connection, backed by a durable store.
///
/// One instance per process, shared behind an `Arc`.
pub struct SessionRegistry {
    index: Mutex<Index>,
    store: Arc<dyn DurableStore>,
    store_timeout: Duration,
    retired_capacity: usize,
}

impl SessionRegistry {
    /// Creates a registry over `store` with the default store timeout.
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self::with_store_timeout(store, DEFAULT_STORE_TIMEOUT)
    }

    /// Creates a registry whose durable operations give up after `store_timeout`.
    pub fn with_store_timeout(store: Arc<dyn DurableStore>, store_timeout: Duration) -> Self {
        Self {
            index: Mutex::new(Index::default()),
            store,
            store_timeout,
            retired_capacity: DEFAULT_RETIRED_CAPACITY,
        }
    }

    /// Bounds how many retired ids are remembered.
    pub fn with_retired_capacity(mut self, capacity: usize) -> Self {
        self.retired_capacity = capacity;
        self
    }

    // ── Claims ───────────────────────────────────────────────────────────────

    /// Reserves `session_id` for an open in progress.
    ///
    /// The claim ends when [`Self::register`] files a handle under the id or
    /// when [`Self::release_claim`] is called.
    ///
    /// # Errors
    ///
    /// [`OpenRefused::Live`], [`OpenRefused::Opening`] or
    /// [`OpenRefused::Retired`].
    pub fn claim(&self, session_id: &SessionId) -> Result<(), OpenRefused> {
        let mut index = self.index.lock();
        if index.by_session.contains_key(session_id) {
            return Err(OpenRefused::Live);
        }
        if index.retired.contains(session_id) {
            return Err(OpenRefused::Retired);
        }
        if !index.opening.insert(session_id.clone()) {
            return Err(OpenRefused::Opening);
        }
        Ok(())
    }

    /// Drops a claim whose open did not complete.
    pub fn release_claim(&self, session_id: &SessionId) {
        self.index.lock().opening.remove(session_id);
    }

    /// Whether `session_id` has closed in this process (and is still
    /// remembered).
    pub fn is_retired(&self, session_id: &SessionId) -> bool {
        self.index.lock().retired.contains(session_id)
    }

    // ── Volatile facet ───────────────────────────────────────────────────────

    /// Files `handle` under `session_id`, ending any claim on the id.
    ///
    /// Last writer wins: a handle already filed under the same id is displaced
    /// (and dropped from the reverse index) and returned to the caller.
    pub fn register(
        &self,
        session_id: SessionId,
        handle: Arc<dyn Connection>,
    ) -> Option<Arc<dyn Connection>> {
        let mut index = self.index.lock();
        let new_conn = handle.id();

        // The same handle cannot serve two sessions.
        if let Some(previous_session) = index.by_connection.get(&new_conn).cloned() {
            if previous_session != session_id {
                index.by_session.remove(&previous_session);
                warn!(
                    "{new_conn}: moved from session {previous_session} to {session_id}; \
                     {previous_session} is left without a live handle"
                );
            }
        }

        index.opening.remove(&session_id);

        index.by_connection.insert(new_conn, session_id.clone());
        let displaced = index.by_session.insert(session_id, handle);

        if let Some(old) = &displaced {
            if old.id() != new_conn {
                index.by_connection.remove(&old.id());
            }
        }
        displaced
    }

    /// Returns the live handle for `session_id`, if any.
    pub fn lookup(&self, session_id: &SessionId) -> Option<Arc<dyn Connection>> {
        self.index.lock().by_session.get(session_id).cloned()
    }

    /// Removes the handle filed under `session_id`.  Idempotent.
    pub fn unregister(&self, session_id: &SessionId) -> Option<Arc<dyn Connection>> {
        self.index.lock().detach_session(session_id)
    }

    /// Removes the handle under `session_id` only if it is still `connection_id`.
    ///
    /// Returns `true` when an entry was removed.  Used after a failed send so
    /// that a handle registered in the meantime is left alone.
    pub fn unregister_if(&self, session_id: &SessionId, connection_id: ConnectionId) -> bool {
        let mut index = self.index.lock();
        match index.by_session.get(session_id) {
            Some(current) if current.id() == connection_id => {
                index.detach_session(session_id);
                true
            }
            _ => false,
        }
    }

    /// Removes whichever session `connection_id` is filed under and returns it.
    ///
    /// `None` means the handle was never tracked or was already cleaned up.
    pub fn unregister_connection(&self, connection_id: ConnectionId) -> Option<SessionId> {
        self.index.lock().detach_connection(connection_id)
    }

    /// Like [`Self::unregister_connection`], and also retires the session id
    /// so it can never be opened again.
    pub fn retire_connection(&self, connection_id: ConnectionId) -> Option<SessionId> {
        let mut index = self.index.lock();
        let session_id = index.detach_connection(connection_id)?;
        index.retire(session_id.clone(), self.retired_capacity);
        Some(session_id)
    }

    /// Reverse lookup: which session is `connection_id` filed under?
    pub fn session_for(&self, connection_id: ConnectionId) -> Option<SessionId> {
        self.index.lock().by_connection.get(&connection_id).cloned()
    }

    /// Number of sessions with a live handle in this process.
    pub fn live_sessions(&self) -> usize {
        self.index.lock().by_session.len()
    }

    // ── Durable facet ────────────────────────────────────────────────────────

    /// Persists the existence marker for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`StoreError::Timeout`] when the write
    /// exceeds the configured bound.
    pub async fn mark_durable(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let key = session_key(session_id);
        self.bounded(self.store.put(&key, PRESENCE_MARKER)).await?;
        debug!("session {session_id}: durable marker written");
        Ok(())
    }

    /// Deletes the existence marker for `session_id`.  Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`StoreError::Timeout`].
    pub async fn clear_durable(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let key = session_key(session_id);
        self.bounded(self.store.delete(&key)).await?;
        debug!("session {session_id}: durable marker cleared");
        Ok(())
    }

    /// Returns whether the existence marker for `session_id` is present.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`StoreError::Timeout`].
    pub async fn is_durable(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let key = session_key(session_id);
        Ok(self.bounded(self.store.get(&key)).await?.is_some())
    }

    /// Classifies `session_id` by combining both facets.
    ///
    /// # Errors
    ///
    /// Propagates durable store failures.
    pub async fn state(&self, session_id: &SessionId) -> Result<SessionState, StoreError> {
        if !self.is_durable(session_id).await? {
            return Ok(SessionState::Unknown);
        }
        Ok(match self.lookup(session_id) {
            Some(_) => SessionState::Open,
            None => SessionState::ReconnectRequired,
        })
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match timeout(self.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
