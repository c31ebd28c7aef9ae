use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod commands {
    pub const UPDATE_METADATA: &str = "smtc_update_metadata";
    pub const SET_PLAYBACK_STATUS: &str = "smtc_set_playback_status";
    pub const SET_TIMELINE: &str = "smtc_set_timeline";
    pub const GET_ARTWORK_TEMP_PATH: &str = "get_artwork_temp_path";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaButton {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
}

impl MediaButton {
    pub const ALL: [MediaButton; 5] = [
        MediaButton::Play,
        MediaButton::Pause,
        MediaButton::Stop,
        MediaButton::Next,
        MediaButton::Previous,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            MediaButton::Play => "smtc-play",
            MediaButton::Pause => "smtc-pause",
            MediaButton::Stop => "smtc-stop",
            MediaButton::Next => "smtc-next",
            MediaButton::Previous => "smtc-previous",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.event_name() == name)
    }
}

impl std::fmt::Display for MediaButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaButton::Play => write!(f, "play"),
            MediaButton::Pause => write!(f, "pause"),
            MediaButton::Stop => write!(f, "stop"),
            MediaButton::Next => write!(f, "next"),
            MediaButton::Previous => write!(f, "previous"),
        }
    }
}

impl std::str::FromStr for MediaButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if let Some(button) = Self::from_event_name(&lower) {
            return Ok(button);
        }
        match lower.as_str() {
            "play" => Ok(MediaButton::Play),
            "pause" => Ok(MediaButton::Pause),
            "stop" => Ok(MediaButton::Stop),
            "next" => Ok(MediaButton::Next),
            "previous" | "prev" => Ok(MediaButton::Previous),
            _ => Err(format!("Invalid media button: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork_path: Option<PathBuf>,
}

impl MediaMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_artwork(mut self, path: impl Into<PathBuf>) -> Self {
        self.artwork_path = Some(path.into());
        self
    }
}

/// Wire arguments for `smtc_update_metadata`.
///
/// Absent optional fields serialize as explicit `null`, so the host always
/// receives all four keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataArgs {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork_path: Option<String>,
}

impl From<&MediaMetadata> for MetadataArgs {
    fn from(metadata: &MediaMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            artwork_path: metadata
                .artwork_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

impl From<MetadataArgs> for MediaMetadata {
    fn from(args: MetadataArgs) -> Self {
        Self {
            title: args.title,
            artist: args.artist,
            album: args.album,
            artwork_path: args.artwork_path.map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatusArgs {
    pub is_playing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineArgs {
    pub position_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl HostEvent {
    pub fn button(button: MediaButton) -> Self {
        Self {
            event: button.event_name().to_string(),
            payload: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub metadata: Option<MediaMetadata>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NowPlaying {
    pub fn format_timeline(&self) -> String {
        format!(
            "{} / {}",
            format_ms(self.position_ms),
            format_ms(self.duration_ms)
        )
    }
}

fn format_ms(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
