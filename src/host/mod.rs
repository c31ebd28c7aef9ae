
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

use crate::bridge::BridgeError;
use crate::models::{
    ArtworkArgs, HostEvent, MediaButton, MediaMetadata, MetadataArgs, NowPlaying,
    PlaybackStatusArgs, TimelineArgs, commands,
};

pub mod artwork;
mod session;

pub use artwork::ArtworkCache;
pub use session::{ButtonSink, HeadlessSession, MediaSession, SessionError};

pub type ListenerId = u64;

type ListenerFn = Arc<dyn Fn(&HostEvent) -> ControlFlow<()> + Send + Sync>;

struct Listener {
    id: ListenerId,
    event: String,
    handler: ListenerFn,
}

pub struct Host {
    session: Mutex<Box<dyn MediaSession>>,
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
    now_playing: Mutex<NowPlaying>,
    artwork: Option<ArtworkCache>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Host {
    pub fn new(mut session: Box<dyn MediaSession>, artwork: Option<ArtworkCache>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Host>| {
            let weak = weak.clone();
            let sink: ButtonSink = Arc::new(move |button| {
                if let Some(host) = weak.upgrade() {
                    host.emit(button);
                }
            });
            if let Err(e) = session.attach(sink) {
                warn!("Failed to attach media button handler: {e}");
            }

            Self {
                session: Mutex::new(session),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                now_playing: Mutex::new(NowPlaying::default()),
                artwork,
            }
        })
    }

    /// Returning `ControlFlow::Break` from `handler` removes it.
    pub fn listen<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&HostEvent) -> ControlFlow<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).push(Listener {
            id,
            event: event.to_string(),
            handler: Arc::new(handler),
        });
        debug!(id, event, "Listener registered");
        id
    }

    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(id, "Listener removed");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Returns how many listeners received the event.
    pub fn emit(&self, button: MediaButton) -> usize {
        self.emit_event(&HostEvent::button(button))
    }

    pub fn emit_event(&self, event: &HostEvent) -> usize {
        // Handlers run outside the lock so they may call back into the host.
        let targets: Vec<(ListenerId, ListenerFn)> = lock(&self.listeners)
            .iter()
            .filter(|l| l.event == event.event)
            .map(|l| (l.id, Arc::clone(&l.handler)))
            .collect();

        let mut dropped = Vec::new();
        for (id, handler) in &targets {
            if handler(event).is_break() {
                dropped.push(*id);
            }
        }

        if !dropped.is_empty() {
            lock(&self.listeners).retain(|l| !dropped.contains(&l.id));
            debug!(count = dropped.len(), "Dropped closed listeners");
        }

        let delivered = targets.len() - dropped.len();
        debug!(event = %event.event, delivered, "Event emitted");
        delivered
    }

    pub fn now_playing(&self) -> NowPlaying {
        lock(&self.now_playing).clone()
    }

    pub fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        debug!(command, "Host command");

        match command {
            commands::UPDATE_METADATA => {
                let args: MetadataArgs = decode(command, args)?;
                let metadata = MediaMetadata::from(args);
                lock(&self.session)
                    .update_metadata(&metadata)
                    .map_err(|e| failed(command, e))?;
                self.record(|s| s.metadata = Some(metadata));
                Ok(Value::Null)
            }
            commands::SET_PLAYBACK_STATUS => {
                let args: PlaybackStatusArgs = decode(command, args)?;
                lock(&self.session)
                    .set_playback_status(args.is_playing)
                    .map_err(|e| failed(command, e))?;
                self.record(|s| s.is_playing = args.is_playing);
                Ok(Value::Null)
            }
            commands::SET_TIMELINE => {
                let args: TimelineArgs = decode(command, args)?;
                lock(&self.session)
                    .set_timeline(args.position_ms, args.duration_ms)
                    .map_err(|e| failed(command, e))?;
                self.record(|s| {
                    s.position_ms = args.position_ms;
                    s.duration_ms = args.duration_ms;
                });
                Ok(Value::Null)
            }
            commands::GET_ARTWORK_TEMP_PATH => {
                let args: ArtworkArgs = decode(command, args)?;
                let Some(cache) = &self.artwork else {
                    return Ok(Value::Null);
                };
                let path = cache
                    .materialize(Path::new(&args.file_path))
                    .map_err(|e| failed(command, format!("{e:#}")))?;
                Ok(path
                    .map(|p| Value::String(p.to_string_lossy().into_owned()))
                    .unwrap_or(Value::Null))
            }
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }

    fn record(&self, update: impl FnOnce(&mut NowPlaying)) {
        let mut state = lock(&self.now_playing);
        update(&mut state);
        state.updated_at = Some(Utc::now());
    }
}

fn decode<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, BridgeError> {
    serde_json::from_value(args).map_err(|source| BridgeError::InvalidArguments {
        command: command.to_string(),
        source,
    })
}

fn failed(command: &str, e: impl std::fmt::Display) -> BridgeError {
    BridgeError::Command {
        command: command.to_string(),
        message: e.to_string(),
    }
}
