use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::models::HostEvent;

mod local;
pub use local::LocalBridge;

pub type EventHandler = Arc<dyn Fn(&HostEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown host command: {0}")]
    UnknownCommand(String),
    #[error("invalid arguments for {command}: {source}")]
    InvalidArguments {
        command: String,
        source: serde_json::Error,
    },
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
    #[error("host is no longer available")]
    HostGone,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed host message: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Transport(e.to_string())
    }
}

#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn listen(&self, event: &str, handler: EventHandler) -> Result<Subscription, BridgeError>;

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError>;
}

#[async_trait]
impl<T: HostBridge + ?Sized> HostBridge for Arc<T> {
    async fn listen(&self, event: &str, handler: EventHandler) -> Result<Subscription, BridgeError> {
        (**self).listen(event, handler).await
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        (**self).invoke(command, args).await
    }
}

/// Releases its event subscription on [`Subscription::cancel`] or drop,
/// whichever comes first. The release closure runs at most once.
pub struct Subscription {
    event: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(event: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            event: event.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("active", &self.release.is_some())
            .finish()
    }
}
