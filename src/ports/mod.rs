//! Port traits (interfaces)
//!
//! These traits define the boundaries between the codec and the audio
//! device drivers. Adapters implement these traits to connect to real hardware.

pub mod audio;

pub use audio::*;
