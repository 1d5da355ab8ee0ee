//! Digital Signal Processing
//!
//! Pure functions for signal processing. No I/O dependencies.

pub mod fft;
pub mod nco;

// Re-export commonly used items
pub use fft::{nearest_bin, SpectrumAnalyzer};
pub use nco::Nco;
