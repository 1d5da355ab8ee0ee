//! Core domain types

use serde::{Deserialize, Serialize};

use super::error::{DtmfError, DtmfResult};

/// Audio sample type (32-bit float, range -1.0 to 1.0)
pub type AudioSample = f32;

/// Sample rate and channel layout of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Reject formats no processing can run on
    pub fn validate(self) -> DtmfResult<Self> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(DtmfError::UnknownInputFormat {
                sample_rate: self.sample_rate,
                channels: self.channels,
            });
        }
        Ok(self)
    }
}

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_default: bool,
}
