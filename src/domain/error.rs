//! Domain error types

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while synthesizing or recognizing DTMF tones
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DtmfError {
    /// The platform refused access to the audio device
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio start failed: {0}")]
    AudioStartFailed(String),

    #[error("Unknown input format: {sample_rate} Hz, {channels} channel(s)")]
    UnknownInputFormat { sample_rate: u32, channels: u16 },

    #[error("Unknown frequency pair: {low} Hz / {high} Hz")]
    UnknownFrequencyPair { low: u16, high: u16 },

    #[error("Unknown DTMF symbol: {0:?}")]
    UnknownSymbol(char),

    #[error("Playback already in progress")]
    AlreadyPlaying,

    #[error("Recognition already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DtmfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DtmfError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            DtmfError::AudioStartFailed(_) => ErrorKind::AudioStartFailed,
            DtmfError::UnknownInputFormat { .. } => ErrorKind::UnknownInputFormat,
            DtmfError::UnknownFrequencyPair { .. } => ErrorKind::UnknownFrequencyPair,
            DtmfError::UnknownSymbol(_) => ErrorKind::UnknownSymbol,
            DtmfError::AlreadyPlaying => ErrorKind::AlreadyPlaying,
            DtmfError::AlreadyRunning => ErrorKind::AlreadyRunning,
            DtmfError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Error category, as reported on the error event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    AudioStartFailed,
    UnknownInputFormat,
    UnknownFrequencyPair,
    UnknownSymbol,
    AlreadyPlaying,
    AlreadyRunning,
    Config,
}

/// An error delivered asynchronously to subscribers (e.g. a device lost mid-session)
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DtmfError> for ErrorEvent {
    fn from(err: &DtmfError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result type alias for DTMF operations
pub type DtmfResult<T> = Result<T, DtmfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_carries_kind_and_message() {
        let err = DtmfError::UnknownInputFormat {
            sample_rate: 0,
            channels: 1,
        };
        let event = ErrorEvent::from(&err);
        assert_eq!(event.kind, ErrorKind::UnknownInputFormat);
        assert!(event.message.contains("0 Hz"));
    }
}
