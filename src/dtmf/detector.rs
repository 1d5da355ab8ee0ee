//! Per-block DTMF detection with debounce
//!
//! Pipeline per block: Hann window → FFT magnitudes → read the 8 DTMF bins
//! → keep tones above threshold → strongest two → low/high pairing
//! → table lookup → persistence filter.
//!
//! Blocks without a usable pair (fewer than two tones, or both tones from the
//! same group) are skipped without touching the persistence state, so a
//! short dropout in the middle of a held tone does not restart the count.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::table::{self, DtmfSymbol, DTMF_FREQUENCIES};
use crate::domain::{AudioSample, CodecConfig, DtmfError, DtmfResult};
use crate::dsp::{nearest_bin, SpectrumAnalyzer};

/// Detector tuning shared with whoever configures the recognizer.
/// Changes take effect on the next analysed block.
#[derive(Debug)]
pub struct DetectorSettings {
    required_persistence_count: AtomicUsize,
    detection_threshold: AtomicU32,
}

impl DetectorSettings {
    pub fn new(required_persistence_count: usize, detection_threshold: f32) -> Self {
        let settings = Self {
            required_persistence_count: AtomicUsize::new(1),
            detection_threshold: AtomicU32::new(0),
        };
        settings.set_required_persistence_count(required_persistence_count);
        settings.set_detection_threshold(detection_threshold);
        settings
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(config.required_persistence_count, config.detection_threshold)
    }

    pub fn required_persistence_count(&self) -> usize {
        self.required_persistence_count.load(Ordering::Relaxed)
    }

    /// Zero is treated as one: every detection needs at least one block
    pub fn set_required_persistence_count(&self, count: usize) {
        self.required_persistence_count
            .store(count.max(1), Ordering::Relaxed);
    }

    pub fn detection_threshold(&self) -> f32 {
        f32::from_bits(self.detection_threshold.load(Ordering::Relaxed))
    }

    /// Negative or NaN thresholds are clamped to zero
    pub fn set_detection_threshold(&self, threshold: f32) {
        let threshold = if threshold.is_nan() { 0.0 } else { threshold.max(0.0) };
        self.detection_threshold
            .store(threshold.to_bits(), Ordering::Relaxed);
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from_config(&CodecConfig::default())
    }
}

/// What a single block contained
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockCandidate {
    /// Fewer than two DTMF tones above threshold
    NoTone,
    /// The two strongest tones do not form a low/high pair
    Ambiguous { first: u16, second: u16 },
    Symbol(DtmfSymbol),
}

/// FFT bin of every entry of `DTMF_FREQUENCIES` for `block_size`-sample
/// blocks at `sample_rate`.
///
/// Fails with `Config` when a tone sits at or above Nyquist, or when two tones
/// round to the same bin: such a block cannot tell the symbols apart.
pub fn tone_bins(block_size: usize, sample_rate: u32) -> DtmfResult<[usize; 8]> {
    if block_size == 0 || sample_rate == 0 {
        return Err(DtmfError::Config(format!(
            "cannot analyse {block_size}-sample blocks at {sample_rate} Hz"
        )));
    }

    let mut bins = [0; 8];
    for (i, &freq) in DTMF_FREQUENCIES.iter().enumerate() {
        let bin = nearest_bin(f64::from(freq), f64::from(sample_rate), block_size);
        if bin >= block_size / 2 {
            return Err(DtmfError::Config(format!(
                "{freq} Hz is above Nyquist at {sample_rate} Hz"
            )));
        }
        if let Some(j) = bins[..i].iter().position(|&b| b == bin) {
            return Err(DtmfError::Config(format!(
                "{}-sample blocks at {sample_rate} Hz put {} Hz and {freq} Hz in the same bin",
                block_size, DTMF_FREQUENCIES[j]
            )));
        }
        bins[i] = bin;
    }
    Ok(bins)
}

/// Streaming DTMF detector for fixed-size blocks
pub struct Detector {
    analyzer: SpectrumAnalyzer,
    /// Bin per entry of `DTMF_FREQUENCIES`
    bins: [usize; 8],
    settings: Arc<DetectorSettings>,
    last_detected: Option<DtmfSymbol>,
    persistence_count: usize,
}

impl Detector {
    /// Allocates every buffer the per-block path needs.
    /// Fails if the block size and rate cannot resolve all eight tones (see `tone_bins`).
    pub fn new(
        block_size: usize,
        sample_rate: u32,
        settings: Arc<DetectorSettings>,
    ) -> DtmfResult<Self> {
        let bins = tone_bins(block_size, sample_rate)?;
        Ok(Self {
            analyzer: SpectrumAnalyzer::new(block_size),
            bins,
            settings,
            last_detected: None,
            persistence_count: 0,
        })
    }

    /// Analyse one block (windowed in place) and apply the persistence filter.
    /// Returns a symbol when it has been seen in enough consecutive usable blocks.
    pub fn feed(&mut self, block: &mut [AudioSample]) -> Option<DtmfSymbol> {
        let symbol = match self.classify(block) {
            BlockCandidate::Symbol(symbol) => symbol,
            BlockCandidate::NoTone | BlockCandidate::Ambiguous { .. } => return None,
        };

        if self.last_detected == Some(symbol) {
            self.persistence_count += 1;
        } else {
            self.last_detected = Some(symbol);
            self.persistence_count = 1;
        }

        if self.persistence_count >= self.settings.required_persistence_count() {
            self.last_detected = None;
            self.persistence_count = 0;
            return Some(symbol);
        }
        None
    }

    /// Spectral part of `feed`, without touching the persistence state
    pub fn classify(&mut self, block: &mut [AudioSample]) -> BlockCandidate {
        let threshold = self.settings.detection_threshold();
        let magnitudes = self.analyzer.analyze(block);

        let mut first: Option<(u16, f32)> = None;
        let mut second: Option<(u16, f32)> = None;

        for (&freq, &bin) in DTMF_FREQUENCIES.iter().zip(self.bins.iter()) {
            let magnitude = magnitudes[bin];
            if magnitude <= threshold {
                continue;
            }
            match first {
                Some((_, strongest)) if magnitude <= strongest => {
                    if second.map_or(true, |(_, runner_up)| magnitude > runner_up) {
                        second = Some((freq, magnitude));
                    }
                }
                _ => {
                    second = first;
                    first = Some((freq, magnitude));
                }
            }
        }

        let (Some((f1, _)), Some((f2, _))) = (first, second) else {
            return BlockCandidate::NoTone;
        };

        match table::lookup_tones(f1, f2) {
            Ok(symbol) => BlockCandidate::Symbol(symbol),
            Err(_) => BlockCandidate::Ambiguous {
                first: f1,
                second: f2,
            },
        }
    }

    /// Candidate currently being debounced and how many blocks agreed so far
    pub fn pending(&self) -> (Option<DtmfSymbol>, usize) {
        (self.last_detected, self.persistence_count)
    }

    pub fn settings(&self) -> &Arc<DetectorSettings> {
        &self.settings
    }
}

/// Slices interleaved capture buffers of any length into fixed-size blocks
/// of channel 0. Preallocated; `push` never allocates.
pub struct BlockAssembler {
    block: Vec<AudioSample>,
    filled: usize,
    channels: usize,
}

impl BlockAssembler {
    pub fn new(block_size: usize, channels: usize) -> Self {
        Self {
            block: vec![0.0; block_size],
            filled: 0,
            channels: channels.max(1),
        }
    }

    /// Append frames, calling `on_block` for every block that fills up
    pub fn push(&mut self, interleaved: &[AudioSample], mut on_block: impl FnMut(&mut [AudioSample])) {
        for frame in interleaved.chunks(self.channels) {
            self.block[self.filled] = frame[0];
            self.filled += 1;
            if self.filled == self.block.len() {
                on_block(&mut self.block);
                self.filled = 0;
            }
        }
    }

    /// Frames waiting for the next block
    pub fn pending_frames(&self) -> usize {
        self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DtmfSymbol::*;

    const SAMPLE_RATE: u32 = 44100;
    const BLOCK: usize = 1024;

    /// Block of summed sines at 0.5 amplitude each, starting at sample `offset`
    fn tones(freqs: &[f64], offset: usize) -> Vec<f32> {
        (offset..offset + BLOCK)
            .map(|n| {
                let t = n as f64 / SAMPLE_RATE as f64;
                freqs
                    .iter()
                    .map(|f| 0.5 * (std::f64::consts::TAU * f * t).sin())
                    .sum::<f64>() as f32
            })
            .collect()
    }

    fn detector(persistence: usize, threshold: f32) -> Detector {
        Detector::new(
            BLOCK,
            SAMPLE_RATE,
            Arc::new(DetectorSettings::new(persistence, threshold)),
        )
        .unwrap()
    }

    #[test]
    fn test_pure_pair_classifies_as_symbol() {
        let mut det = detector(1, 20.0);
        assert_eq!(
            det.classify(&mut tones(&[1336.0, 770.0], 0)),
            BlockCandidate::Symbol(Digit5)
        );
        assert_eq!(
            det.classify(&mut tones(&[941.0, 1209.0], 0)),
            BlockCandidate::Symbol(Star)
        );
    }

    #[test]
    fn test_every_symbol_is_detected() {
        let mut det = detector(1, 20.0);
        for symbol in DtmfSymbol::ALL.into_iter().filter(|&s| s != Space) {
            let pair = symbol.frequency_pair();
            let mut block = tones(&[f64::from(pair.low), f64::from(pair.high)], 0);
            assert_eq!(det.feed(&mut block), Some(symbol), "{symbol:?}");
        }
    }

    #[test]
    fn test_held_tone_emits_once_per_persistence_window() {
        let mut det = detector(3, 20.0);
        let mut emitted = Vec::new();
        for i in 0..7 {
            let mut block = tones(&[1336.0, 770.0], i * BLOCK);
            if let Some(symbol) = det.feed(&mut block) {
                emitted.push((i, symbol));
            }
        }
        // Blocks 0..=2 confirm, then a fresh run of three is needed
        assert_eq!(emitted, vec![(2, Digit5), (5, Digit5)]);
        assert_eq!(det.pending(), (Some(Digit5), 1));
    }

    #[test]
    fn test_single_tone_is_skipped_without_losing_progress() {
        let mut det = detector(3, 20.0);
        assert_eq!(det.feed(&mut tones(&[1336.0, 770.0], 0)), None);
        assert_eq!(det.feed(&mut tones(&[1336.0, 770.0], BLOCK)), None);

        let mut lone = tones(&[1336.0], 2 * BLOCK);
        assert_eq!(det.classify(&mut lone.clone()), BlockCandidate::NoTone);
        assert_eq!(det.feed(&mut lone), None);
        assert_eq!(det.pending(), (Some(Digit5), 2));

        assert_eq!(det.feed(&mut tones(&[1336.0, 770.0], 3 * BLOCK)), Some(Digit5));
    }

    #[test]
    fn test_same_group_pair_is_discarded_without_state_change() {
        let mut det = detector(3, 20.0);
        det.feed(&mut tones(&[1336.0, 770.0], 0));
        det.feed(&mut tones(&[1336.0, 770.0], BLOCK));

        let mut low_low = tones(&[697.0, 770.0], 0);
        assert!(matches!(
            det.classify(&mut low_low.clone()),
            BlockCandidate::Ambiguous { .. }
        ));
        assert_eq!(det.feed(&mut low_low), None);
        assert_eq!(det.feed(&mut tones(&[1209.0, 1633.0], 0)), None);
        assert_eq!(det.pending(), (Some(Digit5), 2));

        assert_eq!(det.feed(&mut tones(&[1336.0, 770.0], 2 * BLOCK)), Some(Digit5));
    }

    #[test]
    fn test_silence_is_skipped() {
        let mut det = detector(1, 3.0);
        let mut block = vec![0.0; BLOCK];
        assert_eq!(det.classify(&mut block), BlockCandidate::NoTone);
        assert_eq!(det.feed(&mut block), None);
    }

    #[test]
    fn test_different_symbol_restarts_count() {
        let mut det = detector(2, 20.0);
        assert_eq!(det.feed(&mut tones(&[1336.0, 770.0], 0)), None);
        assert_eq!(det.feed(&mut tones(&[697.0, 1209.0], 0)), None);
        assert_eq!(det.pending(), (Some(Digit1), 1));
        assert_eq!(det.feed(&mut tones(&[697.0, 1209.0], BLOCK)), Some(Digit1));
        assert_eq!(det.pending(), (None, 0));
    }

    #[test]
    fn test_threshold_above_tone_level_suppresses_detection() {
        let mut det = detector(1, 20.0);
        det.settings().set_detection_threshold(1000.0);
        assert_eq!(det.feed(&mut tones(&[1336.0, 770.0], 0)), None);

        det.settings().set_detection_threshold(20.0);
        assert_eq!(det.feed(&mut tones(&[1336.0, 770.0], 0)), Some(Digit5));
    }

    #[test]
    fn test_settings_clamp_out_of_range_values() {
        let settings = DetectorSettings::new(0, -4.0);
        assert_eq!(settings.required_persistence_count(), 1);
        assert_eq!(settings.detection_threshold(), 0.0);
        settings.set_detection_threshold(f32::NAN);
        assert_eq!(settings.detection_threshold(), 0.0);
        settings.set_required_persistence_count(4);
        assert_eq!(settings.required_persistence_count(), 4);
    }

    #[test]
    fn test_tone_bins_default_layout() {
        assert_eq!(
            tone_bins(BLOCK, SAMPLE_RATE).unwrap(),
            [16, 18, 20, 22, 28, 31, 34, 38]
        );
    }

    #[test]
    fn test_tone_bins_rejects_shared_bins() {
        // 256 samples at 44.1 kHz: 697/770 Hz both round to bin 4
        assert!(matches!(tone_bins(256, 44100), Err(DtmfError::Config(_))));
        // Default block at 192 kHz collapses the low group the same way
        assert!(matches!(tone_bins(BLOCK, 192_000), Err(DtmfError::Config(_))));
        assert!(Detector::new(256, SAMPLE_RATE, Arc::new(DetectorSettings::default())).is_err());
    }

    #[test]
    fn test_tone_bins_rejects_tones_above_nyquist() {
        // Nyquist at 1500 Hz: the high group is out of reach
        assert!(matches!(tone_bins(BLOCK, 3000), Err(DtmfError::Config(_))));
        assert!(tone_bins(0, SAMPLE_RATE).is_err());
        assert!(tone_bins(BLOCK, 0).is_err());
    }

    #[test]
    fn test_smallest_resolving_block_detects_every_symbol() {
        const SHORT: usize = 512;
        assert!(tone_bins(SHORT / 2, SAMPLE_RATE).is_err());

        let mut det = Detector::new(
            SHORT,
            SAMPLE_RATE,
            Arc::new(DetectorSettings::new(1, 3.0)),
        )
        .unwrap();
        for symbol in DtmfSymbol::ALL.into_iter().filter(|&s| s != Space) {
            let pair = symbol.frequency_pair();
            let mut block: Vec<f32> = (0..SHORT)
                .map(|n| {
                    let t = n as f64 / SAMPLE_RATE as f64;
                    let low = (std::f64::consts::TAU * f64::from(pair.low) * t).sin();
                    let high = (std::f64::consts::TAU * f64::from(pair.high) * t).sin();
                    (0.5 * low + 0.5 * high) as f32
                })
                .collect();
            assert_eq!(det.feed(&mut block), Some(symbol), "{symbol:?}");
        }
    }

    #[test]
    fn test_assembler_takes_first_channel_across_uneven_buffers() {
        let mut assembler = BlockAssembler::new(4, 2);
        let mut blocks: Vec<Vec<f32>> = Vec::new();

        // Frames (L, R) = (i, -i)
        let frames: Vec<f32> = (1..=10).flat_map(|i| [i as f32, -(i as f32)]).collect();
        assembler.push(&frames[..6], |b| blocks.push(b.to_vec()));
        assembler.push(&frames[6..], |b| blocks.push(b.to_vec()));

        assert_eq!(blocks, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(assembler.pending_frames(), 2);
    }
}
