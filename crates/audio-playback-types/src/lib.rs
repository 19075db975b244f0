//! Wire types for the `audio_playback` tool.
//!
//! Shared by the server's dispatcher, its MCP layer, and anything that wants to
//! decode responses without pulling in the server itself.

use serde::{Deserialize, Serialize};

/// Playback lifecycle state reported to callers.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum PlaybackStatus {
    /// Nothing has been played since the server started.
    #[default]
    Idle,
    /// A player process is running.
    Playing,
    /// The last session ended (explicit stop, replacement, or player exit).
    Stopped,
}

impl PlaybackStatus {
    /// Literal value used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "Idle",
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Stopped => "Stopped",
        }
    }
}

/// Point-in-time view of the playback session, attached to every response.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlaybackSnapshot {
    /// Current lifecycle state.
    pub status: PlaybackStatus,
    /// Absolute path of the file currently or most recently played.
    pub current_file: Option<String>,
    /// Wall-clock epoch milliseconds when the current play command began.
    pub started_at_ms: Option<i64>,
    /// Wall-clock derived playback position. Frozen once playback stops.
    pub position_estimate_ms: Option<i64>,
}

/// Tool call arguments.
///
/// `action` stays a plain string so unknown actions reach the dispatcher and
/// come back as a regular failure envelope instead of a decode error.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ToolCall {
    /// One of `play`, `stop`, `status`, `list_files`.
    pub action: String,
    /// File to play, relative to the root directory. Required for `play`.
    #[serde(default)]
    pub filename: Option<String>,
    /// Loop until stopped (default `false`).
    #[serde(default, rename = "loop")]
    pub loop_playback: Option<bool>,
    /// Offset to start playback from, in milliseconds (default `0`).
    #[serde(default)]
    pub start_offset_ms: Option<i64>,
    /// Maximum number of entries returned by `list_files` (default `200`).
    #[serde(default)]
    pub list_limit: Option<i64>,
}

/// One playable file under the root directory.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FileEntry {
    /// Path relative to the root directory, `/`-separated.
    pub filename: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Result payload of `list_files`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FileListing {
    /// Canonical root directory that was listed.
    pub root_dir: String,
    /// Total number of eligible files found (not capped by `limit`).
    pub count: usize,
    /// Limit applied to `files`.
    pub limit: usize,
    /// First `limit` eligible files in lexicographic order.
    pub files: Vec<FileEntry>,
}

/// Response envelope returned for every tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ToolResponse {
    /// `false` when the requested operation failed.
    pub success: bool,
    /// Human-readable outcome or failure cause.
    pub message: String,
    /// Best-known playback state, populated even on failure.
    pub state: PlaybackSnapshot,
    /// Present only for `list_files`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FileListing>,
}

impl ToolResponse {
    pub fn ok(message: impl Into<String>, state: PlaybackSnapshot) -> Self {
        Self {
            success: true,
            message: message.into(),
            state,
            files: None,
        }
    }

    pub fn failure(message: impl Into<String>, state: PlaybackSnapshot) -> Self {
        Self {
            success: false,
            message: message.into(),
            state,
            files: None,
        }
    }

    pub fn with_files(mut self, files: FileListing) -> Self {
        self.files = Some(files);
        self
    }
}
