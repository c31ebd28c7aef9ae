use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

use crate::bridge::{BridgeError, EventHandler, HostBridge, Subscription};
use crate::models::{
    ArtworkArgs, HostEvent, MediaButton, MediaMetadata, MetadataArgs, PlaybackStatusArgs,
    TimelineArgs, commands,
};

mod callbacks;
pub use callbacks::{Callback, CallbackPatch, Callbacks};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MediaControls<B> {
    bridge: B,
    callbacks: Arc<Mutex<Callbacks>>,
    subscriptions: Mutex<Vec<Subscription>>,
    initialized: AtomicBool,
}

impl<B: HostBridge> MediaControls<B> {
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            subscriptions: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// On failure the subscriptions made so far are released and the facade
    /// stays uninitialized.
    pub async fn init(&self) {
        if self.is_initialized() {
            return;
        }

        match self.subscribe_all().await {
            Ok(subscriptions) => {
                lock(&self.subscriptions).extend(subscriptions);
                self.initialized.store(true, Ordering::SeqCst);
                info!("Media controls initialized");
            }
            Err(e) => {
                error!("Failed to initialize media controls: {e}");
            }
        }
    }

    async fn subscribe_all(&self) -> Result<Vec<Subscription>, BridgeError> {
        let mut subscriptions = Vec::with_capacity(MediaButton::ALL.len());

        for button in MediaButton::ALL {
            let callbacks = Arc::clone(&self.callbacks);
            let handler: EventHandler = Arc::new(move |_: &HostEvent| {
                // Clone out so the callback runs without the lock held.
                let callback = lock(&callbacks).get(button);
                match callback {
                    Some(callback) => callback(),
                    None => debug!(%button, "No callback registered"),
                }
            });

            // An early return drops `subscriptions`, releasing each one.
            let subscription = self.bridge.listen(button.event_name(), handler).await?;
            subscriptions.push(subscription);
        }

        Ok(subscriptions)
    }

    pub fn set_callbacks(&self, patch: CallbackPatch) {
        lock(&self.callbacks).apply(patch);
    }

    pub async fn update_metadata(&self, metadata: &MediaMetadata) {
        let args = MetadataArgs::from(metadata);
        self.forward(commands::UPDATE_METADATA, &args).await;
    }

    pub async fn set_playback_status(&self, is_playing: bool) {
        let args = PlaybackStatusArgs { is_playing };
        self.forward(commands::SET_PLAYBACK_STATUS, &args).await;
    }

    pub async fn set_timeline(&self, position_ms: u64, duration_ms: u64) {
        let args = TimelineArgs {
            position_ms,
            duration_ms,
        };
        self.forward(commands::SET_TIMELINE, &args).await;
    }

    pub async fn get_artwork_temp_path(&self, file_path: &Path) -> Option<PathBuf> {
        let command = commands::GET_ARTWORK_TEMP_PATH;
        let args = ArtworkArgs {
            file_path: file_path.to_string_lossy().into_owned(),
        };

        let value = report(command, self.call(command, &args).await)?;
        let path: Option<String> =
            report(command, serde_json::from_value(value).map_err(BridgeError::from))?;
        path.map(PathBuf::from)
    }

    pub fn destroy(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        let count = subscriptions.len();

        for subscription in subscriptions {
            debug!(event = subscription.event(), "Unsubscribing");
            subscription.cancel();
        }
        self.initialized.store(false, Ordering::SeqCst);

        if count > 0 {
            info!(count, "Media controls destroyed");
        }
    }

    async fn forward<A: Serialize + Sync>(&self, command: &str, args: &A) {
        report(command, self.call(command, args).await);
    }

    async fn call<A: Serialize + Sync>(&self, command: &str, args: &A) -> Result<Value, BridgeError> {
        let args = serde_json::to_value(args)?;
        self.bridge.invoke(command, args).await
    }
}

// Single sink for host-call failures.
fn report<T>(command: &str, result: Result<T, BridgeError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(command, "Media control call failed: {e}");
            None
        }
    }
}

impl<B> std::fmt::Debug for MediaControls<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaControls")
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .field("subscriptions", &lock(&self.subscriptions).len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
