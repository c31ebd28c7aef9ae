use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::models::MediaButton;

mod commands;
pub use commands::*;

#[derive(Parser)]
#[command(name = "smtc-bridge")]
#[command(about = "Bridge app playback to the OS media transport controls")]
#[command(version)]
pub struct Cli {
    /// Storage directory for the socket, pid file and artwork cache
    #[arg(long, env = "SMTC_BRIDGE_HOME", global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Simulate a media button press on the host
    Press {
        /// play, pause, stop, next, or previous
        button: MediaButton,
    },

    /// Push track metadata to the media overlay
    Metadata {
        /// Track title
        #[arg(short, long)]
        title: String,
        /// Track artist
        #[arg(short, long)]
        artist: Option<String>,
        /// Album title
        #[arg(short = 'b', long)]
        album: Option<String>,
        /// Artwork image path
        #[arg(short = 'w', long)]
        artwork: Option<PathBuf>,
    },

    /// Set playback status
    Playback {
        state: PlaybackState,
    },

    /// Set timeline position and duration in milliseconds
    Timeline {
        position_ms: u64,
        duration_ms: u64,
    },

    /// Cache artwork for a track and print its path
    Artwork {
        /// Track or image file
        file: PathBuf,
    },

    /// Print media button presses as they arrive
    Listen {
        /// Exit after this many presses
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Show what the host is currently displaying
    Status,

    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlaybackState {
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_playing(self) -> bool {
        self == PlaybackState::Playing
    }
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Run daemon in foreground (internal use)
    Run,
}
