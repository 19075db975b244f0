//! Error types for tool calls and startup configuration.

use thiserror::Error;

/// Failures a single tool call can produce.
///
/// The `Display` text is the `message` returned to the caller, so it is
/// phrased for a remote agent rather than for logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The filename escapes the root directory or is otherwise unusable.
    #[error("{0}")]
    InvalidPath(String),
    /// The resolved file does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The player process could not be started.
    #[error("{0}")]
    LaunchError(String),
    #[error("Unsupported action '{0}'. Expected one of: play, stop, status, list_files.")]
    InvalidAction(String),
    #[error("{0} is required for 'play' action.")]
    MissingParameter(&'static str),
    #[error("{0}")]
    InvalidParameter(String),
}

impl PlaybackError {
    /// Short machine-friendly label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PlaybackError::InvalidPath(_) => "invalid_path",
            PlaybackError::NotFound(_) => "not_found",
            PlaybackError::LaunchError(_) => "launch_error",
            PlaybackError::InvalidAction(_) => "invalid_action",
            PlaybackError::MissingParameter(_) => "missing_parameter",
            PlaybackError::InvalidParameter(_) => "invalid_parameter",
        }
    }
}

/// Fatal configuration problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required.")]
    Missing(&'static str),
    #[error("AUDIO_ROOT_DIR '{0}' does not exist.")]
    RootMissing(String),
    #[error("AUDIO_ROOT_DIR '{0}' is not a directory.")]
    RootNotDirectory(String),
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("config file '{path}' could not be read: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file '{path}' is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
