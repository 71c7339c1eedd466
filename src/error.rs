//! Error types for yt-batch

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification surfaced to the UI and stored in results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Per-item errors
    InvalidUrl,
    NetworkFailure,
    ToolFailed,
    TranscodeFailed,
    Stalled,
    UserCancelled,

    // Fatal for the whole run
    ToolNotFound,

    // System errors
    FileError,
    SpawnError,
    InvalidConfig,
    ParseError,
}

impl ErrorKind {
    /// Whether this kind aborts the whole batch instead of a single item
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ToolNotFound)
    }
}

/// Main error type for yt-batch
#[derive(Error, Debug)]
pub enum YtBatchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Missing dependency: {0}. Please install it or set its path in the config.")]
    ToolNotFound(String),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("No output for {0} seconds, process killed")]
    Stalled(u64),

    #[error("{tool} exited with {}: {message}", exit_label(.code))]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("Transcoding failed: {0}")]
    Transcode(String),

    #[error("Failed to parse tool output: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl YtBatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::Network(_) => ErrorKind::NetworkFailure,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::Cancelled => ErrorKind::UserCancelled,
            Self::Stalled(_) => ErrorKind::Stalled,
            Self::ToolFailed { .. } => ErrorKind::ToolFailed,
            Self::Transcode(_) => ErrorKind::TranscodeFailed,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::File(_) => ErrorKind::FileError,
            Self::Spawn(_) => ErrorKind::SpawnError,
            Self::Json(_) => ErrorKind::ParseError,
        }
    }

    /// Classify a failed extractor exit from the error text it printed
    pub fn from_tool_exit(tool: &str, code: Option<i32>, message: String) -> Self {
        let lower = message.to_lowercase();

        const NETWORK_HINTS: [&str; 7] = [
            "unable to download",
            "http error",
            "timed out",
            "connection",
            "name resolution",
            "network",
            "getaddrinfo",
        ];

        if lower.contains("unsupported url") || lower.contains("is not a valid url") {
            return Self::InvalidUrl(message);
        }
        if NETWORK_HINTS.iter().any(|hint| lower.contains(hint)) {
            return Self::Network(message);
        }

        Self::ToolFailed {
            tool: tool.to_string(),
            code,
            message,
        }
    }
}

/// "code 2", or "a signal" when the process was killed
pub fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, YtBatchError>;
