//! Magnitude spectrum of fixed-size sample blocks

use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Hann-windowed FFT over blocks of exactly `fft_size` samples.
///
/// All working buffers are allocated up front so `analyze` can run on an
/// audio callback thread without touching the allocator.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Create a new analyzer with the given block size
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Periodic Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = std::f32::consts::PI * i as f32 / fft_size as f32;
                0.5 * (1.0 - (2.0 * x).cos())
            })
            .collect();

        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            fft,
            fft_size,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; fft_size / 2],
        }
    }

    /// Multiply `block` by the Hann window in place.
    /// Only the first `fft_size` samples are touched.
    pub fn apply_window(&self, block: &mut [f32]) {
        for (sample, &w) in block.iter_mut().zip(self.window.iter()) {
            *sample *= w;
        }
    }

    /// Window `block` in place, transform it and return `fft_size / 2`
    /// linear magnitude bins. Short blocks are zero padded.
    pub fn analyze(&mut self, block: &mut [f32]) -> &[f32] {
        self.apply_window(block);

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let re = block.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(re, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (mag, c) in self.magnitudes.iter_mut().zip(self.buffer.iter()) {
            *mag = c.norm();
        }
        &self.magnitudes
    }

    /// Nearest bin for `freq` at `sample_rate`
    pub fn bin_index(&self, freq: f64, sample_rate: f64) -> usize {
        nearest_bin(freq, sample_rate, self.fft_size)
    }

    /// Number of magnitude bins produced per block
    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Get the FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

/// Nearest bin for `freq` in an `fft_size`-point transform at `sample_rate`
pub fn nearest_bin(freq: f64, sample_rate: f64, fft_size: usize) -> usize {
    (freq / sample_rate * fft_size as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_fft_pure_tone() {
        let mut analyzer = SpectrumAnalyzer::new(1024);
        let sample_rate = 48000.0;
        let freq = 1000.0;

        let mut samples = sine(freq, sample_rate, 1024, 1.0);
        let spectrum = analyzer.analyze(&mut samples);

        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        // bin = freq * fft_size / sample_rate = 1000 * 1024 / 48000 ≈ 21.3
        let expected_bin = analyzer.bin_index(freq as f64, sample_rate as f64);

        assert_eq!(expected_bin, 21);
        assert!(
            (peak_bin as i32 - expected_bin as i32).abs() <= 1,
            "Peak at bin {} but expected near bin {}",
            peak_bin,
            expected_bin
        );
    }

    #[test]
    fn test_bin_centred_tone_reads_quarter_block_amplitude() {
        // 32 cycles per 1024-sample block lands exactly on bin 32
        let mut analyzer = SpectrumAnalyzer::new(1024);
        let mut samples = sine(32.0 * 44100.0 / 1024.0, 44100.0, 1024, 0.5);
        let spectrum = analyzer.analyze(&mut samples);
        assert!((spectrum[32] - 128.0).abs() < 1.0, "got {}", spectrum[32]);
    }

    #[test]
    fn test_analyze_windows_block_in_place() {
        let mut analyzer = SpectrumAnalyzer::new(8);
        let mut block = vec![1.0; 8];
        analyzer.analyze(&mut block);
        assert_eq!(block[0], 0.0);
        assert!((block[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_calls_give_identical_results() {
        let mut analyzer = SpectrumAnalyzer::new(1024);
        let samples = sine(1000.0, 48000.0, 1024, 1.0);

        let first = analyzer.analyze(&mut samples.clone()).to_vec();
        let second = analyzer.analyze(&mut samples.clone()).to_vec();

        assert_eq!(
            first, second,
            "repeated analyze() calls must return identical results"
        );
        assert_eq!(first.len(), analyzer.bin_count());
    }
}
