//! Numerically Controlled Oscillator

use std::f64::consts::TAU;

/// Numerically Controlled Oscillator producing a sine at a retunable frequency.
///
/// Retuning only changes the phase increment, never the phase, so frequency
/// changes are phase-continuous.
pub struct Nco {
    phase: f64,
    phase_increment: f64,
    sample_rate: f64,
}

impl Nco {
    /// Create a new NCO with the given frequency and sample rate
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            phase_increment: TAU * frequency / sample_rate,
            sample_rate,
        }
    }

    /// Set the oscillator frequency
    pub fn set_frequency(&mut self, frequency: f64) {
        self.phase_increment = TAU * frequency / self.sample_rate;
    }

    /// Get the current frequency
    pub fn frequency(&self) -> f64 {
        self.phase_increment * self.sample_rate / TAU
    }

    /// Current phase, always in `[0, 2π)`
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Generate the next sample (sine)
    pub fn next_sin(&mut self) -> f32 {
        let sample = self.phase.sin() as f32;
        self.phase = wrap_phase(self.phase + self.phase_increment);
        sample
    }
}

/// Wrap into `[0, 2π)`. Modular, so increments larger than a full period
/// (frequency above the sample rate) still land in range.
fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}
