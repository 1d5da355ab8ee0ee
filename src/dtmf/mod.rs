//! DTMF codec
//!
//! Frequency table, tone synthesis (symbols → audio) and tone recognition
//! (audio → debounced symbol events).

pub mod detector;
pub mod events;
pub mod recognizer;
pub mod synthesizer;
pub mod table;
pub mod tone_cell;

pub use detector::{tone_bins, BlockAssembler, BlockCandidate, Detector, DetectorSettings};
pub use events::{EventBus, EventSink};
pub use recognizer::ToneRecognizer;
pub use synthesizer::{render_sequence, ToneRenderer, ToneSynthesizer};
pub use table::{parse_symbols, DtmfSymbol, FrequencyPair};
pub use tone_cell::{ActiveTone, ToneCell};
