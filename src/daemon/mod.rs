use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use interprocess::local_socket::Stream;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::host::{ArtworkCache, HeadlessSession, Host};
use crate::ipc::{DaemonClient, DaemonCommand, DaemonResponse, DaemonStatus};

pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn run(&self) -> Result<()> {
        use interprocess::local_socket::prelude::*;
        use interprocess::local_socket::{GenericFilePath, ListenerOptions};

        self.config.ensure_dirs()?;
        let socket_path = self.config.socket_path();

        // Remove stale socket
        if socket_path.exists() {
            fs::remove_file(&socket_path)?;
        }

        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string())?;

        let name = socket_path.as_os_str().to_fs_name::<GenericFilePath>()?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_sync()
            .with_context(|| "Failed to create socket listener")?;

        info!("Daemon started, listening on {}", socket_path.display());

        let session = HeadlessSession::new(self.config.session.identity.clone());
        let host = Host::new(
            Box::new(session),
            Some(ArtworkCache::new(self.config.artwork_dir())),
        );
        let running = Arc::new(AtomicBool::new(true));
        let started_at = Utc::now();

        // One thread per connection so a silent client can't stall the rest.
        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok(conn) => {
                    let host = Arc::clone(&host);
                    let running = Arc::clone(&running);
                    let socket_path = socket_path.clone();
                    let spawned = thread::Builder::new()
                        .name("smtc-conn".to_string())
                        .spawn(move || {
                            let was_running = running.load(Ordering::SeqCst);
                            if let Err(e) = handle_connection(conn, &host, &running, started_at) {
                                error!("Connection error: {e:#}");
                            }
                            if was_running && !running.load(Ordering::SeqCst) {
                                wake_listener(&socket_path);
                            }
                        });
                    if let Err(e) = spawned {
                        error!("Failed to spawn connection thread: {e}");
                    }
                }
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        error!("Accept error: {e}");
                    }
                }
            }
        }

        // Cleanup
        let _ = fs::remove_file(&socket_path);
        let _ = fs::remove_file(&pid_path);

        info!("Daemon stopped");
        Ok(())
    }

    pub fn start_detached(config: &Config) -> Result<()> {
        let socket_path = config.socket_path();
        if socket_path.exists() {
            let client = DaemonClient::new(&socket_path);
            if client.is_daemon_running() {
                anyhow::bail!("Daemon is already running");
            }
            fs::remove_file(&socket_path)?;
        }

        spawn_detached(config)?;

        for _ in 0..50 {
            if socket_path.exists() {
                return Ok(());
            }
            thread::sleep(std::time::Duration::from_millis(100));
        }

        anyhow::bail!("Daemon failed to start")
    }

    pub fn stop(config: &Config) -> Result<()> {
        let client = DaemonClient::new(config.socket_path());
        if client.is_daemon_running() {
            client.shutdown()?;
            for _ in 0..50 {
                if !config.socket_path().exists() {
                    return Ok(());
                }
                thread::sleep(std::time::Duration::from_millis(100));
            }
        }
        Ok(())
    }

    pub fn is_running(config: &Config) -> bool {
        DaemonClient::new(config.socket_path()).is_daemon_running()
    }
}

#[cfg(unix)]
fn spawn_detached(config: &Config) -> Result<()> {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let exe = std::env::current_exe()?;
    Command::new(&exe)
        .arg("--home")
        .arg(config.data_dir())
        .arg("daemon")
        .arg("run")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .with_context(|| "Failed to start daemon")?;
    Ok(())
}

#[cfg(not(unix))]
fn spawn_detached(_config: &Config) -> Result<()> {
    anyhow::bail!("Detached daemon is not supported here; run `smtc-bridge daemon run` instead")
}

fn write_response(mut writer: &Stream, response: &DaemonResponse) -> Result<()> {
    let response_json = serde_json::to_string(response)?;
    writeln!(writer, "{response_json}")?;
    writer.flush()?;
    Ok(())
}

// Unblocks the accept loop after `Shutdown` so it sees the cleared flag.
fn wake_listener(socket_path: &Path) {
    if let Err(e) = DaemonClient::new(socket_path).connect() {
        debug!("Listener already closed: {e:#}");
    }
}

fn handle_connection(
    conn: Stream,
    host: &Arc<Host>,
    running: &AtomicBool,
    started_at: DateTime<Utc>,
) -> Result<()> {
    let command: DaemonCommand = {
        let mut reader = BufReader::new(&conn);
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        serde_json::from_str(&line).with_context(|| "Failed to parse daemon command")?
    };

    if let DaemonCommand::Subscribe { event } = command {
        return subscribe(conn, host, &event);
    }

    let response = handle_command(command, host, running, started_at);
    write_response(&conn, &response)
}

// The connection stays open and becomes the subscriber's event stream. It is
// closed when the listener is removed, either by `Unsubscribe` or after a
// failed write.
fn subscribe(conn: Stream, host: &Host, event: &str) -> Result<()> {
    let conn = Arc::new(Mutex::new(conn));

    // Held until `Subscribed` is written so it precedes any event.
    let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);

    let writer = Arc::clone(&conn);
    let id = host.listen(event, move |e| {
        let stream = writer.lock().unwrap_or_else(PoisonError::into_inner);
        match write_response(&stream, &DaemonResponse::Event(e.clone())) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                debug!("Dropping subscriber: {err:#}");
                ControlFlow::Break(())
            }
        }
    });

    if let Err(e) = write_response(&guard, &DaemonResponse::Subscribed { id }) {
        drop(guard);
        host.unlisten(id);
        return Err(e);
    }

    info!(id, event, "Subscriber attached");
    Ok(())
}

fn handle_command(
    command: DaemonCommand,
    host: &Host,
    running: &AtomicBool,
    started_at: DateTime<Utc>,
) -> DaemonResponse {
    match command {
        DaemonCommand::Invoke { command, args } => match host.invoke(&command, args) {
            Ok(value) => DaemonResponse::Value(value),
            Err(e) => DaemonResponse::Error(e.to_string()),
        },
        DaemonCommand::Subscribe { .. } => {
            DaemonResponse::Error("Subscribe requires a dedicated connection".to_string())
        }
        DaemonCommand::Unsubscribe { id } => {
            if host.unlisten(id) {
                info!(id, "Subscriber detached");
                DaemonResponse::Ok
            } else {
                DaemonResponse::Error(format!("No subscription with id {id}"))
            }
        }
        DaemonCommand::Press { button } => {
            let delivered = host.emit(button);
            DaemonResponse::Value(delivered.into())
        }
        DaemonCommand::GetStatus => DaemonResponse::Status(DaemonStatus {
            pid: std::process::id(),
            started_at,
            listeners: host.listener_count(),
            now_playing: host.now_playing(),
        }),
        DaemonCommand::Shutdown => {
            running.store(false, Ordering::SeqCst);
            DaemonResponse::Ok
        }
    }
}
