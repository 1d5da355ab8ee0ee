//! Tear-free handoff of the sounding tone pair to the render thread
//!
//! The scheduler is the only writer and the render callback the only reader.
//! Both frequencies are packed into one `AtomicU32`, so a reader always sees
//! a pair that some writer actually stored.

use std::sync::atomic::{AtomicU32, Ordering};

use super::table::{DtmfSymbol, FrequencyPair};

/// Frequencies the oscillators are currently tuned to.
/// `freq1` drives the high-group oscillator, `freq2` the low-group one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveTone {
    pub freq1: u16,
    pub freq2: u16,
}

impl ActiveTone {
    pub const SILENCE: ActiveTone = ActiveTone { freq1: 0, freq2: 0 };

    pub fn for_symbol(symbol: DtmfSymbol) -> Self {
        Self::from(symbol.frequency_pair())
    }

    pub fn is_silence(self) -> bool {
        self == Self::SILENCE
    }

    fn pack(self) -> u32 {
        (u32::from(self.freq1) << 16) | u32::from(self.freq2)
    }

    fn unpack(bits: u32) -> Self {
        Self {
            freq1: (bits >> 16) as u16,
            freq2: (bits & 0xFFFF) as u16,
        }
    }
}

impl From<FrequencyPair> for ActiveTone {
    fn from(pair: FrequencyPair) -> Self {
        Self {
            freq1: pair.high,
            freq2: pair.low,
        }
    }
}

impl From<ActiveTone> for FrequencyPair {
    fn from(tone: ActiveTone) -> Self {
        FrequencyPair::new(tone.freq2, tone.freq1)
    }
}

/// Atomically swapped `ActiveTone`
#[derive(Debug)]
pub struct ToneCell(AtomicU32);

impl ToneCell {
    pub fn new() -> Self {
        Self(AtomicU32::new(ActiveTone::SILENCE.pack()))
    }

    pub fn store(&self, tone: ActiveTone) {
        self.0.store(tone.pack(), Ordering::Release);
    }

    pub fn load(&self) -> ActiveTone {
        ActiveTone::unpack(self.0.load(Ordering::Acquire))
    }

    pub fn silence(&self) {
        self.store(ActiveTone::SILENCE);
    }
}

impl Default for ToneCell {
    fn default() -> Self {
        Self::new()
    }
}
