use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interprocess::TryClone;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, warn};

use crate::bridge::{BridgeError, EventHandler, HostBridge, Subscription};
use crate::models::{HostEvent, MediaButton, NowPlaying};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonCommand {
    Invoke { command: String, args: Value },
    Subscribe { event: String },
    Unsubscribe { id: u64 },
    Press { button: MediaButton },
    GetStatus,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonResponse {
    Ok,
    Value(Value),
    Subscribed { id: u64 },
    Event(HostEvent),
    Status(DaemonStatus),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub listeners: usize,
    pub now_playing: NowPlaying,
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists() && self.send_command(DaemonCommand::GetStatus).is_ok()
    }

    pub(crate) fn connect(&self) -> Result<interprocess::local_socket::Stream> {
        use interprocess::local_socket::GenericFilePath;
        use interprocess::local_socket::prelude::*;

        let path = self.socket_path.as_os_str();
        let name = path
            .to_fs_name::<GenericFilePath>()
            .with_context(|| "Invalid socket path")?;

        interprocess::local_socket::Stream::connect(name).with_context(|| {
            format!(
                "Failed to connect to daemon at {}",
                self.socket_path.display()
            )
        })
    }

    pub fn send_command(&self, command: DaemonCommand) -> Result<DaemonResponse> {
        let mut writer = self.connect()?;
        let mut reader = BufReader::new(writer.try_clone()?);

        let msg = serde_json::to_string(&command)?;
        writeln!(writer, "{msg}")?;
        writer.flush()?;

        read_response(&mut reader)?.with_context(|| "Daemon closed the connection")
    }

    /// Open a dedicated connection that receives `event` until unsubscribed.
    pub fn subscribe(&self, event: &str) -> Result<EventStream> {
        let mut writer = self.connect()?;
        let mut reader = BufReader::new(writer.try_clone()?);

        let msg = serde_json::to_string(&DaemonCommand::Subscribe {
            event: event.to_string(),
        })?;
        writeln!(writer, "{msg}")?;
        writer.flush()?;

        match read_response(&mut reader)? {
            Some(DaemonResponse::Subscribed { id }) => Ok(EventStream { id, reader }),
            Some(DaemonResponse::Error(e)) => anyhow::bail!("{e}"),
            Some(other) => anyhow::bail!("Unexpected response: {other:?}"),
            None => anyhow::bail!("Daemon closed the connection"),
        }
    }

    pub fn unsubscribe(&self, id: u64) -> Result<()> {
        match self.send_command(DaemonCommand::Unsubscribe { id })? {
            DaemonResponse::Ok => Ok(()),
            DaemonResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        }
    }

    pub fn invoke(&self, command: &str, args: Value) -> Result<DaemonResponse> {
        self.send_command(DaemonCommand::Invoke {
            command: command.to_string(),
            args,
        })
    }

    pub fn press(&self, button: MediaButton) -> Result<DaemonResponse> {
        self.send_command(DaemonCommand::Press { button })
    }

    pub fn get_status(&self) -> Result<DaemonStatus> {
        match self.send_command(DaemonCommand::GetStatus)? {
            DaemonResponse::Status(status) => Ok(status),
            DaemonResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        }
    }

    pub fn shutdown(&self) -> Result<DaemonResponse> {
        self.send_command(DaemonCommand::Shutdown)
    }
}

fn read_response<R: BufRead>(reader: &mut R) -> Result<Option<DaemonResponse>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let response =
        serde_json::from_str(&line).with_context(|| "Failed to parse daemon response")?;
    Ok(Some(response))
}

/// Events pushed by the daemon on a subscription connection.
pub struct EventStream {
    id: u64,
    reader: BufReader<interprocess::local_socket::Stream>,
}

impl EventStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the next event. `None` once the daemon closes the stream.
    pub fn next_event(&mut self) -> Result<Option<HostEvent>> {
        loop {
            match read_response(&mut self.reader)? {
                Some(DaemonResponse::Event(event)) => return Ok(Some(event)),
                Some(other) => debug!("Ignoring message on event stream: {other:?}"),
                None => return Ok(None),
            }
        }
    }
}

/// [`HostBridge`] backed by the daemon's local socket.
#[derive(Debug, Clone)]
pub struct IpcBridge {
    client: DaemonClient,
}

impl IpcBridge {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            client: DaemonClient::new(socket_path),
        }
    }

    pub fn client(&self) -> &DaemonClient {
        &self.client
    }
}

fn transport(e: anyhow::Error) -> BridgeError {
    BridgeError::Transport(format!("{e:#}"))
}

async fn blocking<T, F>(f: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BridgeError::Transport(e.to_string()))?
        .map_err(transport)
}

#[async_trait]
impl HostBridge for IpcBridge {
    async fn listen(&self, event: &str, handler: EventHandler) -> Result<Subscription, BridgeError> {
        let client = self.client.clone();
        let name = event.to_string();
        let mut stream = blocking(move || client.subscribe(&name)).await?;
        let id = stream.id();

        // Cleared on cancel so events already in flight are not dispatched.
        let active = Arc::new(AtomicBool::new(true));
        let reader_active = Arc::clone(&active);
        thread::Builder::new()
            .name(format!("smtc-events-{id}"))
            .spawn(move || {
                loop {
                    match stream.next_event() {
                        Ok(Some(event)) => {
                            if !reader_active.load(Ordering::SeqCst) {
                                break;
                            }
                            handler(&event);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Event stream {id} failed: {e:#}");
                            break;
                        }
                    }
                }
                debug!(id, "Event stream closed");
            })?;

        let client = self.client.clone();
        // Release runs from `destroy` and `Drop`, often on an async executor,
        // so the unsubscribe round trip happens off the caller's thread.
        Ok(Subscription::new(event, move || {
            active.store(false, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(format!("smtc-unsubscribe-{id}"))
                .spawn(move || {
                    if let Err(e) = client.unsubscribe(id) {
                        warn!("Failed to unsubscribe {id}: {e:#}");
                    }
                });
            if let Err(e) = spawned {
                warn!("Failed to release subscription {id}: {e}");
            }
        }))
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        let client = self.client.clone();
        let name = command.to_string();
        let response = blocking(move || client.invoke(&name, args)).await?;

        match response {
            DaemonResponse::Value(value) => Ok(value),
            DaemonResponse::Ok => Ok(Value::Null),
            DaemonResponse::Error(message) => Err(BridgeError::Command {
                command: command.to_string(),
                message,
            }),
            other => Err(BridgeError::Transport(format!(
                "unexpected daemon response: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let msg = serde_json::to_string(&DaemonCommand::Press {
            button: MediaButton::Next,
        })
        .unwrap();
        assert_eq!(msg, r#"{"Press":{"button":"next"}}"#);

        let response: DaemonResponse =
            serde_json::from_str(r#"{"Event":{"event":"smtc-play","payload":null}}"#).unwrap();
        assert!(matches!(
            response,
            DaemonResponse::Event(HostEvent { ref event, .. }) if event == "smtc-play"
        ));
    }

    #[test]
    fn test_read_response_eof() {
        let mut empty: &[u8] = b"";
        assert!(read_response(&mut empty).unwrap().is_none());

        let mut line: &[u8] = b"\"Ok\"\n";
        assert!(matches!(
            read_response(&mut line).unwrap(),
            Some(DaemonResponse::Ok)
        ));
    }

    #[tokio::test]
    async fn test_bridge_without_daemon_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bridge = IpcBridge::new(tmp.path().join("missing.sock"));

        assert!(!bridge.client().is_daemon_running());
        assert!(matches!(
            bridge.invoke("smtc_set_playback_status", Value::Null).await,
            Err(BridgeError::Transport(_))
        ));
    }
}
