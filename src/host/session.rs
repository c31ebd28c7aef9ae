use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{MediaButton, MediaMetadata};

/// Receives button presses coming from the OS media overlay.
pub type ButtonSink = Arc<dyn Fn(MediaButton) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("media session rejected update: {0}")]
    Rejected(String),
}

/// An OS-level media transport surface (SMTC, MPRIS, Now Playing).
pub trait MediaSession: Send {
    fn attach(&mut self, sink: ButtonSink) -> Result<(), SessionError>;

    fn update_metadata(&mut self, metadata: &MediaMetadata) -> Result<(), SessionError>;

    fn set_playback_status(&mut self, is_playing: bool) -> Result<(), SessionError>;

    fn set_timeline(&mut self, position_ms: u64, duration_ms: u64) -> Result<(), SessionError>;
}

/// Session with no OS surface behind it. Updates are only logged and button
/// presses arrive through the daemon's `Press` command instead of the OS.
#[derive(Debug)]
pub struct HeadlessSession {
    identity: String,
}

impl HeadlessSession {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

impl MediaSession for HeadlessSession {
    fn attach(&mut self, _sink: ButtonSink) -> Result<(), SessionError> {
        info!(
            "Media session '{}' running headless (no OS media controls)",
            self.identity
        );
        Ok(())
    }

    fn update_metadata(&mut self, metadata: &MediaMetadata) -> Result<(), SessionError> {
        debug!(
            title = %metadata.title,
            artist = metadata.artist.as_deref().unwrap_or("-"),
            album = metadata.album.as_deref().unwrap_or("-"),
            "Now playing"
        );
        if let Some(path) = &metadata.artwork_path {
            if !path.exists() {
                debug!("Artwork path does not exist: {}", path.display());
            }
        }
        Ok(())
    }

    fn set_playback_status(&mut self, is_playing: bool) -> Result<(), SessionError> {
        debug!(is_playing, "Playback status");
        Ok(())
    }

    fn set_timeline(&mut self, position_ms: u64, duration_ms: u64) -> Result<(), SessionError> {
        debug!(position_ms, duration_ms, "Timeline");
        Ok(())
    }
}
