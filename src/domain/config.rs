//! Codec configuration
//!
//! A CodecConfig holds every tunable of a synthesizer/recognizer pair: output
//! format, analysis block size, tone timing and detector sensitivity. Saved
//! profiles are plain JSON renderings of this struct.

use serde::{Deserialize, Serialize};

use super::error::{DtmfError, DtmfResult};
use super::types::StreamFormat;
use crate::dtmf::detector::tone_bins;

/// Codec configuration profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Output sample rate in Hz requested from the playback device
    pub sample_rate: u32,
    /// Output channel count (every channel carries the same signal)
    pub output_channels: u16,
    /// Samples per analysed block; a power of two large enough that every
    /// DTMF tone gets its own FFT bin at `sample_rate` (512 or more at 44.1 kHz)
    pub buffer_size: usize,
    /// How long each symbol sounds, in milliseconds (20-2000 typical)
    pub tone_duration_ms: u64,
    /// Silence after each symbol, in milliseconds (20-2000 typical)
    pub intertone_gap_ms: u64,
    /// Consecutive agreeing blocks before a symbol is confirmed (1-10 typical)
    pub required_persistence_count: usize,
    /// Minimum bin magnitude for a tone to count as present.
    /// Linear |X[k]| of the unnormalised DFT of the windowed block, not calibrated SPL.
    pub detection_threshold: f32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            output_channels: 2,
            buffer_size: 1024,
            tone_duration_ms: 100,
            intertone_gap_ms: 50,
            required_persistence_count: 1,
            detection_threshold: 3.0,
        }
    }
}

impl CodecConfig {
    pub fn output_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, self.output_channels)
    }

    pub fn validate(&self) -> DtmfResult<()> {
        if self.sample_rate == 0 {
            return Err(DtmfError::Config("sample rate must be positive".into()));
        }
        if self.output_channels == 0 {
            return Err(DtmfError::Config("output needs at least one channel".into()));
        }
        if !self.buffer_size.is_power_of_two() {
            return Err(DtmfError::Config(format!(
                "buffer size must be a power of two, got {}",
                self.buffer_size
            )));
        }
        tone_bins(self.buffer_size, self.sample_rate)?;
        if self.required_persistence_count == 0 {
            return Err(DtmfError::Config(
                "required persistence count must be at least 1".into(),
            ));
        }
        if self.detection_threshold.is_nan() || self.detection_threshold < 0.0 {
            return Err(DtmfError::Config(format!(
                "detection threshold must be >= 0, got {}",
                self.detection_threshold
            )));
        }
        Ok(())
    }
}
