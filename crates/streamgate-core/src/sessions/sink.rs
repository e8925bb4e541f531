use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::error::SessionError;

/// Writable end of one client's event stream.
///
/// `close` must be idempotent and must never fail; errors while closing an
/// already-broken transport are ignored.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn write(&self, frame: &str) -> Result<(), SessionError>;

    fn close(&self);
}

/// [`EventSink`] feeding a bounded channel whose receiver becomes the HTTP
/// response body.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn sender(&self) -> Option<mpsc::Sender<String>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write(&self, frame: &str) -> Result<(), SessionError> {
        let tx = self.sender().ok_or(SessionError::Closed)?;
        tx.send(frame.to_string())
            .await
            .map_err(|_| SessionError::Transport("receiver dropped".to_string()))
    }

    fn close(&self) {
        // Dropping the last sender ends the receiving stream
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
