use super::*;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicUsize};

use crate::bridge::LocalBridge;
use crate::host::{HeadlessSession, Host};

type Handlers = Arc<Mutex<Vec<(u64, String, EventHandler)>>>;

#[derive(Default)]
struct MockBridge {
    listen_calls: AtomicUsize,
    fail_listen_at: Mutex<Option<usize>>,
    handlers: Handlers,
    next_id: AtomicU64,
    invocations: Mutex<Vec<(String, Value)>>,
    fail_invoke: AtomicBool,
    reply: Mutex<Value>,
}

impl MockBridge {
    fn emit(&self, event: &str) -> usize {
        let targets: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, name, _)| name == event)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();

        let host_event = crate::models::HostEvent {
            event: event.to_string(),
            payload: Value::Null,
        };
        for handler in &targets {
            handler(&host_event);
        }
        targets.len()
    }

    fn active(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostBridge for MockBridge {
    async fn listen(&self, event: &str, handler: EventHandler) -> Result<Subscription, BridgeError> {
        let call = self.listen_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_listen_at.lock().unwrap() == Some(call) {
            return Err(BridgeError::Transport("listen refused".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap()
            .push((id, event.to_string(), handler));

        let handlers = Arc::clone(&self.handlers);
        Ok(Subscription::new(event, move || {
            handlers.lock().unwrap().retain(|(h, _, _)| *h != id);
        }))
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        self.invocations
            .lock()
            .unwrap()
            .push((command.to_string(), args));

        if self.fail_invoke.load(Ordering::SeqCst) {
            return Err(BridgeError::Command {
                command: command.to_string(),
                message: "host rejected".to_string(),
            });
        }
        Ok(self.reply.lock().unwrap().clone())
    }
}

fn controls() -> (Arc<MockBridge>, MediaControls<Arc<MockBridge>>) {
    let bridge = Arc::new(MockBridge::default());
    let controls = MediaControls::new(Arc::clone(&bridge));
    (bridge, controls)
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// Thread-local, so only valid under the current-thread test runtime.
fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let (bridge, controls) = controls();

    controls.init().await;
    controls.init().await;

    assert!(controls.is_initialized());
    assert_eq!(bridge.listen_calls.load(Ordering::SeqCst), 5);
    assert_eq!(bridge.active(), 5);

    let events: Vec<String> = bridge
        .handlers
        .lock()
        .unwrap()
        .iter()
        .map(|(_, name, _)| name.clone())
        .collect();
    assert_eq!(
        events,
        vec![
            "smtc-play",
            "smtc-pause",
            "smtc-stop",
            "smtc-next",
            "smtc-previous"
        ]
    );
}

#[tokio::test]
async fn test_set_callbacks_merges() {
    let (bridge, controls) = controls();
    let (plays, on_play) = counter();
    let (pauses, on_pause) = counter();

    controls.init().await;
    controls.set_callbacks(CallbackPatch::new().on_play(on_play));
    controls.set_callbacks(CallbackPatch::new().on_pause(on_pause));

    bridge.emit("smtc-play");
    assert_eq!(plays.load(Ordering::SeqCst), 1);
    assert_eq!(pauses.load(Ordering::SeqCst), 0);

    bridge.emit("smtc-pause");
    assert_eq!(plays.load(Ordering::SeqCst), 1);
    assert_eq!(pauses.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cleared_callback_is_not_called() {
    let (bridge, controls) = controls();
    let (plays, on_play) = counter();

    controls.init().await;
    controls.set_callbacks(CallbackPatch::new().on_play(on_play));
    controls.set_callbacks(CallbackPatch::new().clear(MediaButton::Play));

    assert_eq!(bridge.emit("smtc-play"), 1);
    assert_eq!(plays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_update_metadata_sends_explicit_nulls() {
    let (bridge, controls) = controls();

    controls.update_metadata(&MediaMetadata::new("A")).await;

    assert_eq!(
        bridge.invocations(),
        vec![(
            "smtc_update_metadata".to_string(),
            json!({"title": "A", "artist": null, "album": null, "artworkPath": null})
        )]
    );
}

#[tokio::test]
async fn test_forwarding_commands() {
    let (bridge, controls) = controls();

    controls
        .update_metadata(
            &MediaMetadata::new("Song")
                .with_artist("Band")
                .with_album("Record")
                .with_artwork("/tmp/cover.jpg"),
        )
        .await;
    controls.set_playback_status(true).await;
    controls.set_timeline(30_000, 200_000).await;

    assert_eq!(
        bridge.invocations(),
        vec![
            (
                "smtc_update_metadata".to_string(),
                json!({
                    "title": "Song",
                    "artist": "Band",
                    "album": "Record",
                    "artworkPath": "/tmp/cover.jpg"
                })
            ),
            (
                "smtc_set_playback_status".to_string(),
                json!({"isPlaying": true})
            ),
            (
                "smtc_set_timeline".to_string(),
                json!({"positionMs": 30000, "durationMs": 200000})
            ),
        ]
    );
}

#[tokio::test]
async fn test_host_failures_are_swallowed() {
    let (bridge, controls) = controls();
    bridge.fail_invoke.store(true, Ordering::SeqCst);

    controls.update_metadata(&MediaMetadata::new("A")).await;
    controls.set_playback_status(false).await;
    controls.set_timeline(0, 0).await;

    assert_eq!(bridge.invocations().len(), 3);
}

#[tokio::test]
async fn test_host_failures_are_logged() {
    let (logs, _guard) = capture_logs();
    let (bridge, controls) = controls();

    controls.set_playback_status(true).await;
    assert!(!logs.contents().contains("Media control call failed"));

    bridge.fail_invoke.store(true, Ordering::SeqCst);
    controls.update_metadata(&MediaMetadata::new("A")).await;

    let output = logs.contents();
    assert!(output.contains("ERROR"));
    assert!(output.contains("Media control call failed"));
    assert!(output.contains("smtc_update_metadata"));
    assert!(output.contains("host rejected"));

    controls.get_artwork_temp_path(Path::new("x.jpg")).await;
    assert!(logs.contents().contains("get_artwork_temp_path"));
}

#[tokio::test]
async fn test_failed_init_is_logged() {
    let (logs, _guard) = capture_logs();
    let (bridge, controls) = controls();
    *bridge.fail_listen_at.lock().unwrap() = Some(0);

    controls.init().await;

    assert!(!controls.is_initialized());
    let output = logs.contents();
    assert!(output.contains("Failed to initialize media controls"));
    assert!(output.contains("listen refused"));
}

#[tokio::test]
async fn test_artwork_path_result_and_fallback() {
    let (bridge, controls) = controls();

    *bridge.reply.lock().unwrap() = json!("/cache/artwork/abc.jpg");
    assert_eq!(
        controls.get_artwork_temp_path(Path::new("x.jpg")).await,
        Some(PathBuf::from("/cache/artwork/abc.jpg"))
    );
    assert_eq!(
        bridge.invocations().last().unwrap().1,
        json!({"filePath": "x.jpg"})
    );

    *bridge.reply.lock().unwrap() = Value::Null;
    assert_eq!(controls.get_artwork_temp_path(Path::new("x.jpg")).await, None);

    *bridge.reply.lock().unwrap() = json!(42);
    assert_eq!(controls.get_artwork_temp_path(Path::new("x.jpg")).await, None);

    bridge.fail_invoke.store(true, Ordering::SeqCst);
    assert_eq!(controls.get_artwork_temp_path(Path::new("x.jpg")).await, None);
}

#[tokio::test]
async fn test_destroy_unsubscribes_and_is_repeatable() {
    let (bridge, controls) = controls();
    let (plays, on_play) = counter();

    controls.init().await;
    controls.set_callbacks(CallbackPatch::new().on_play(on_play));
    controls.destroy();

    assert!(!controls.is_initialized());
    assert_eq!(bridge.active(), 0);
    assert_eq!(bridge.emit("smtc-play"), 0);
    assert_eq!(plays.load(Ordering::SeqCst), 0);

    controls.destroy();
    assert!(!controls.is_initialized());
}

#[tokio::test]
async fn test_reinit_after_destroy() {
    let (bridge, controls) = controls();
    let (stops, on_stop) = counter();

    controls.init().await;
    controls.destroy();
    controls.init().await;
    controls.set_callbacks(CallbackPatch::new().on_stop(on_stop));

    assert_eq!(bridge.listen_calls.load(Ordering::SeqCst), 10);
    assert_eq!(bridge.active(), 5);
    bridge.emit("smtc-stop");
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_init_rolls_back() {
    let (bridge, controls) = controls();
    *bridge.fail_listen_at.lock().unwrap() = Some(3);

    controls.init().await;

    assert!(!controls.is_initialized());
    assert_eq!(bridge.listen_calls.load(Ordering::SeqCst), 4);
    assert_eq!(bridge.active(), 0);

    *bridge.fail_listen_at.lock().unwrap() = None;
    controls.init().await;

    assert!(controls.is_initialized());
    assert_eq!(bridge.active(), 5);
}

#[tokio::test]
async fn test_next_button_scenario() {
    let (bridge, controls) = controls();
    let (nexts, on_next) = counter();

    controls.init().await;
    controls.set_callbacks(CallbackPatch::new().on_next(on_next));
    bridge.emit("smtc-next");

    assert_eq!(nexts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_with_local_host() {
    let host = Host::new(Box::new(HeadlessSession::new("test")), None);
    let controls = MediaControls::new(LocalBridge::new(Arc::clone(&host)));
    let (prevs, on_previous) = counter();

    controls.init().await;
    controls.set_callbacks(CallbackPatch::new().on_previous(on_previous));
    controls
        .update_metadata(&MediaMetadata::new("Local").with_album("Tape"))
        .await;
    controls.set_playback_status(true).await;

    host.emit(MediaButton::Previous);
    assert_eq!(prevs.load(Ordering::SeqCst), 1);

    let now = host.now_playing();
    assert_eq!(now.metadata.unwrap().album.as_deref(), Some("Tape"));
    assert!(now.is_playing);

    // No artwork cache configured on this host.
    assert_eq!(controls.get_artwork_temp_path(Path::new("a.mp3")).await, None);

    controls.destroy();
    assert_eq!(host.listener_count(), 0);
}
