use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::controls::{CallbackPatch, MediaControls};
use crate::daemon::Daemon;
use crate::ipc::{DaemonClient, DaemonResponse, IpcBridge};
use crate::models::{MediaButton, MediaMetadata};

pub struct App {
    pub config: Config,
}

impl App {
    pub fn new(home: Option<PathBuf>) -> Result<Self> {
        let config = Config::load()?.with_home(home);
        config.ensure_dirs()?;

        Ok(Self { config })
    }

    fn client(&self) -> DaemonClient {
        DaemonClient::new(self.config.socket_path())
    }

    fn ensure_daemon(&self) -> Result<DaemonClient> {
        let client = self.client();
        if !client.is_daemon_running() {
            if self.config.daemon.auto_start {
                println!("Starting daemon...");
                Daemon::start_detached(&self.config)?;
            } else {
                bail!("Daemon is not running. Start it with: smtc-bridge daemon start");
            }
        }
        Ok(client)
    }

    fn controls(&self) -> Result<MediaControls<IpcBridge>> {
        self.ensure_daemon()?;
        Ok(MediaControls::new(IpcBridge::new(self.config.socket_path())))
    }

    fn runtime() -> Result<Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .with_context(|| "Failed to start async runtime")
    }

    // Command implementations

    pub fn press(&self, button: MediaButton) -> Result<()> {
        let client = self.ensure_daemon()?;
        match client.press(button)? {
            DaemonResponse::Value(delivered) => {
                println!("Pressed {button} ({delivered} listener(s))");
            }
            DaemonResponse::Error(e) => bail!("{e}"),
            _ => {}
        }
        Ok(())
    }

    pub fn metadata(&self, metadata: MediaMetadata) -> Result<()> {
        let controls = self.controls()?;
        Self::runtime()?.block_on(controls.update_metadata(&metadata));

        match &metadata.artist {
            Some(artist) => println!("Now playing: {} - {}", artist, metadata.title),
            None => println!("Now playing: {}", metadata.title),
        }
        Ok(())
    }

    pub fn playback(&self, is_playing: bool) -> Result<()> {
        let controls = self.controls()?;
        Self::runtime()?.block_on(controls.set_playback_status(is_playing));

        println!("{}", if is_playing { "Playing" } else { "Paused" });
        Ok(())
    }

    pub fn timeline(&self, position_ms: u64, duration_ms: u64) -> Result<()> {
        let controls = self.controls()?;
        Self::runtime()?.block_on(controls.set_timeline(position_ms, duration_ms));

        println!("Timeline: {position_ms}ms / {duration_ms}ms");
        Ok(())
    }

    pub fn artwork(&self, file: &Path) -> Result<()> {
        let controls = self.controls()?;
        let file = file
            .canonicalize()
            .with_context(|| format!("File not found: {}", file.display()))?;

        match Self::runtime()?.block_on(controls.get_artwork_temp_path(&file)) {
            Some(path) => println!("{}", path.display()),
            None => println!("No artwork found for {}", file.display()),
        }
        Ok(())
    }

    pub fn listen(&self, count: Option<usize>) -> Result<()> {
        let controls = self.controls()?;

        Self::runtime()?.block_on(async {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut patch = CallbackPatch::new();
            for button in MediaButton::ALL {
                let tx = tx.clone();
                patch = patch.on(button, move || {
                    let _ = tx.send(button);
                });
            }
            controls.set_callbacks(patch);

            controls.init().await;
            if !controls.is_initialized() {
                bail!("Failed to subscribe to media button events");
            }

            println!("Listening for media buttons (Ctrl-C to stop)...");
            let mut received = 0;
            loop {
                tokio::select! {
                    Some(button) = rx.recv() => {
                        received += 1;
                        println!("{button}");
                        if count.is_some_and(|n| received >= n) {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            controls.destroy();
            Ok::<_, anyhow::Error>(())
        })
    }

    pub fn status(&self) -> Result<()> {
        let client = self.client();
        if !client.is_daemon_running() {
            println!("Daemon is not running");
            return Ok(());
        }

        let status = client.get_status()?;
        let now = &status.now_playing;

        match &now.metadata {
            Some(metadata) => {
                println!("Title:    {}", metadata.title);
                println!("Artist:   {}", metadata.artist.as_deref().unwrap_or("-"));
                println!("Album:    {}", metadata.album.as_deref().unwrap_or("-"));
                if let Some(artwork) = &metadata.artwork_path {
                    println!("Artwork:  {}", artwork.display());
                }
            }
            None => println!("Nothing playing"),
        }
        println!(
            "Status:   {}",
            if now.is_playing { "playing" } else { "paused" }
        );
        println!("Timeline: {}", now.format_timeline());
        println!("Listeners: {}", status.listeners);
        Ok(())
    }

    pub fn daemon_start(&self) -> Result<()> {
        if Daemon::is_running(&self.config) {
            println!("Daemon is already running");
            return Ok(());
        }
        Daemon::start_detached(&self.config)?;
        println!("Daemon started");
        Ok(())
    }

    pub fn daemon_stop(&self) -> Result<()> {
        if !Daemon::is_running(&self.config) {
            println!("Daemon is not running");
            return Ok(());
        }
        Daemon::stop(&self.config)?;
        println!("Daemon stopped");
        Ok(())
    }

    pub fn daemon_status(&self) -> Result<()> {
        if !Daemon::is_running(&self.config) {
            println!("Daemon is not running");
            return Ok(());
        }

        let status = self.client().get_status()?;
        println!("Daemon is running (pid {})", status.pid);
        println!(
            "Started:  {}",
            status.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("Socket:   {}", self.config.socket_path().display());
        Ok(())
    }

    pub fn daemon_run(&self) -> Result<()> {
        let daemon = Daemon::new(self.config.clone())?;
        daemon.run()
    }
}
