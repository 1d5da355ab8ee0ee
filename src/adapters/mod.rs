//! Adapters: implementations of the audio ports
//!
//! - `cpal_audio`: real devices via cpal
//! - `mock_audio`: hand-driven in-memory devices for tests
//! - `loopback`: output wired straight into input through a ring buffer

pub mod cpal_audio;
pub mod loopback;
pub mod mock_audio;

pub use cpal_audio::{CpalAudioInput, CpalAudioOutput};
pub use loopback::{loopback, LoopbackInput, LoopbackOutput};
pub use mock_audio::{MockAudioInput, MockAudioOutput};
