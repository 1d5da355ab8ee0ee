//! BlueBox: DTMF tone codec
//!
//! Synthesizes the two-sine tones of a dial string and recognizes DTMF
//! symbols in a live audio stream.
//!
//! ## Architecture (Hexagonal / Ports & Adapters)
//!
//! - `domain/` - Pure domain types, no I/O dependencies
//! - `ports/` - Trait definitions for the audio device drivers
//! - `dsp/` - Signal processing (pure functions, no I/O)
//! - `dtmf/` - DTMF codec (frequency table, synthesizer, recognizer, events)
//! - `adapters/` - Implementations of ports (cpal, mock, loopback)
//! - `profiles` - Saved configuration profiles

// Core domain (pure, no I/O)
pub mod domain;
pub mod dsp;
pub mod dtmf;
pub mod ports;

// Adapters (external I/O)
pub mod adapters;

pub mod profiles;

pub use domain::{CodecConfig, DtmfError, DtmfResult, ErrorEvent, ErrorKind, StreamFormat};
pub use dtmf::{DtmfSymbol, EventBus, ToneRecognizer, ToneSynthesizer};
