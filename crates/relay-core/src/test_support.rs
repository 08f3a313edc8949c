//! In-process fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{Connection, TransportError};
use crate::session::ConnectionId;

/// A connection that records every frame it is asked to send.
pub struct RecordingConnection {
    id: ConnectionId,
    pub sent: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
    pub closed: AtomicBool,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::next(),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Makes every later `send_text` fail with [`TransportError::Send`].
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".to_string()));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
