//! Tone recognizer: listens to an input stream and reports DTMF symbols
//!
//! A listening session runs on its own thread, which owns the input port
//! (cpal streams are `!Send`). The port's capture callback owns the
//! `BlockAssembler` and the `Detector`, so analysis happens on the audio
//! thread and confirmed symbols leave it through a non-blocking `EventSink`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use super::detector::{BlockAssembler, Detector, DetectorSettings};
use super::events::EventSink;
use super::table::DtmfSymbol;
use crate::domain::{
    AudioSample, CodecConfig, DtmfError, DtmfResult, ErrorEvent, ErrorKind, StreamFormat,
};
use crate::ports::InputFactory;

struct ListenSession {
    /// Dropping this ends the session
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
    format: StreamFormat,
}

/// Everything the session thread needs, moved onto it at `start`
struct SessionPlan {
    factory: InputFactory,
    block_size: usize,
    settings: Arc<DetectorSettings>,
    running: Arc<AtomicBool>,
    symbols: EventSink<DtmfSymbol>,
    errors: EventSink<ErrorEvent>,
}

fn run_listen_session(
    plan: SessionPlan,
    stop_rx: Receiver<()>,
    ready_tx: Sender<DtmfResult<StreamFormat>>,
) {
    let SessionPlan {
        factory,
        block_size,
        settings,
        running,
        symbols,
        errors,
    } = plan;

    let mut input = factory();
    let format = match input.input_format().and_then(StreamFormat::validate) {
        Ok(format) => format,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // The detector holds the only session reference to `settings`; it lives
    // exactly as long as the capture callback does.
    let mut detector = match Detector::new(block_size, format.sample_rate, settings) {
        Ok(detector) => detector,
        Err(e) => {
            log::warn!("Input format cannot be analysed: {e}");
            let _ = ready_tx.send(Err(DtmfError::UnknownInputFormat {
                sample_rate: format.sample_rate,
                channels: format.channels,
            }));
            return;
        }
    };
    let mut assembler = BlockAssembler::new(block_size, usize::from(format.channels));

    let err_running = running.clone();
    let started = input.start(
        Box::new(move |data: &[AudioSample]| {
            assembler.push(data, |block| {
                if let Some(symbol) = detector.feed(block) {
                    symbols.publish(symbol);
                }
            });
        }),
        Box::new(move |message: String| {
            err_running.store(false, Ordering::SeqCst);
            errors.publish(ErrorEvent {
                kind: ErrorKind::AudioStartFailed,
                message: format!("Input stream error: {message}"),
            });
        }),
    );

    if let Err(e) = started {
        let _ = ready_tx.send(Err(e));
        return;
    }

    running.store(true, Ordering::SeqCst);
    let _ = ready_tx.send(Ok(format));
    log::info!(
        "Listening at {} Hz, {} channel(s), {}-sample blocks",
        format.sample_rate,
        format.channels,
        block_size
    );

    // Returns once the sender side is dropped
    let _ = stop_rx.recv();

    if let Err(e) = input.stop() {
        log::warn!("Failed to stop audio input: {e}");
    }
    running.store(false, Ordering::SeqCst);
    log::info!("Listening stopped");
}

/// DTMF tone recognizer
pub struct ToneRecognizer {
    config: CodecConfig,
    input_factory: InputFactory,
    settings: Arc<DetectorSettings>,
    symbols: EventSink<DtmfSymbol>,
    errors: EventSink<ErrorEvent>,
    running: Arc<AtomicBool>,
    session: Option<ListenSession>,
}

impl ToneRecognizer {
    /// Confirmed symbols go to `symbols`; stream failures after start go to `errors`.
    pub fn new(
        config: &CodecConfig,
        input_factory: InputFactory,
        symbols: EventSink<DtmfSymbol>,
        errors: EventSink<ErrorEvent>,
    ) -> Self {
        Self {
            config: config.clone(),
            input_factory,
            settings: Arc::new(DetectorSettings::from_config(config)),
            symbols,
            errors,
            running: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    /// Begin listening. Returns the format the device delivers.
    ///
    /// Fails with `AlreadyRunning` if a session is active, `Config` if the
    /// configuration does not validate, `UnknownInputFormat` if the device
    /// reports a zero sample rate or channel count or a rate at which the
    /// configured block cannot separate the DTMF tones, or whatever
    /// the device reports (`AudioStartFailed`, `PermissionDenied`) if the
    /// stream cannot be started. A failed start leaves the recognizer stopped.
    pub fn start(&mut self) -> DtmfResult<StreamFormat> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DtmfError::AlreadyRunning);
        }
        self.config.validate()?;
        // A session whose device failed is still parked until stopped
        self.release_session();

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<DtmfResult<StreamFormat>>(1);

        let plan = SessionPlan {
            factory: self.input_factory.clone(),
            block_size: self.config.buffer_size,
            settings: self.settings.clone(),
            running: self.running.clone(),
            symbols: self.symbols.clone(),
            errors: self.errors.clone(),
        };

        let handle = thread::spawn(move || run_listen_session(plan, stop_rx, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(format)) => {
                self.session = Some(ListenSession {
                    stop_tx,
                    handle,
                    format,
                });
                Ok(format)
            }
            Ok(Err(e)) => {
                log::error!("Failed to start recognition: {e}");
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                Err(DtmfError::AudioStartFailed("Recognition thread exited".into()))
            }
        }
    }

    /// Release the input stream and the analysis buffers.
    /// Safe to call when not running.
    pub fn stop(&mut self) -> DtmfResult<()> {
        self.release_session();
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Format of the active session
    pub fn format(&self) -> Option<StreamFormat> {
        self.session.as_ref().map(|s| s.format)
    }

    /// Live tuning handle; changes apply to the next analysed block
    pub fn settings(&self) -> Arc<DetectorSettings> {
        self.settings.clone()
    }

    pub fn set_required_persistence_count(&self, count: usize) {
        self.settings.set_required_persistence_count(count);
    }

    pub fn set_detection_threshold(&self, threshold: f32) {
        self.settings.set_detection_threshold(threshold);
    }

    fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session.stop_tx);
            if session.handle.join().is_err() {
                log::error!("Recognition thread panicked");
            }
        }
    }
}

impl Drop for ToneRecognizer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAudioInput;
    use crate::dtmf::events::EventBus;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        mock: MockAudioInput,
        recognizer: ToneRecognizer,
        symbols: Receiver<DtmfSymbol>,
        errors: Receiver<ErrorEvent>,
        _buses: (EventBus<DtmfSymbol>, EventBus<ErrorEvent>),
    }

    fn harness(mock: MockAudioInput, config: CodecConfig) -> Harness {
        let symbol_bus = EventBus::new();
        let error_bus = EventBus::new();
        let recognizer =
            ToneRecognizer::new(&config, mock.factory(), symbol_bus.sink(), error_bus.sink());
        Harness {
            mock,
            recognizer,
            symbols: symbol_bus.subscribe(),
            errors: error_bus.subscribe(),
            _buses: (symbol_bus, error_bus),
        }
    }

    fn stereo_tone(freqs: &[f64], frames: usize, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .flat_map(|n| {
                let t = n as f64 / sample_rate as f64;
                let s = freqs
                    .iter()
                    .map(|f| 0.5 * (std::f64::consts::TAU * f * t).sin())
                    .sum::<f64>() as f32;
                [s, 0.0]
            })
            .collect()
    }

    #[test]
    fn test_start_twice_is_already_running_until_stopped() {
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 1)), CodecConfig::default());

        assert_eq!(h.recognizer.start(), Ok(StreamFormat::new(44100, 1)));
        assert!(h.recognizer.is_running());
        assert_eq!(h.recognizer.start(), Err(DtmfError::AlreadyRunning));
        assert_eq!(h.mock.start_count(), 1);

        h.recognizer.stop().unwrap();
        assert!(!h.recognizer.is_running());
        assert_eq!(h.recognizer.format(), None);
        assert!(h.recognizer.start().is_ok());
        h.recognizer.stop().unwrap();
    }

    #[test]
    fn test_stop_when_not_running_is_a_no_op() {
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 1)), CodecConfig::default());
        assert!(h.recognizer.stop().is_ok());
        assert!(h.recognizer.stop().is_ok());
        assert_eq!(h.mock.stop_count(), 0);
    }

    #[test]
    fn test_zero_sample_rate_is_unknown_input_format() {
        let mut h = harness(MockAudioInput::new(StreamFormat::new(0, 1)), CodecConfig::default());
        assert_eq!(
            h.recognizer.start(),
            Err(DtmfError::UnknownInputFormat {
                sample_rate: 0,
                channels: 1
            })
        );
        assert!(!h.recognizer.is_running());
        assert_eq!(h.mock.start_count(), 0);
    }

    #[test]
    fn test_zero_channels_is_unknown_input_format() {
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 0)), CodecConfig::default());
        assert!(matches!(
            h.recognizer.start(),
            Err(DtmfError::UnknownInputFormat { .. })
        ));
    }

    #[test]
    fn test_device_errors_propagate_from_start() {
        let mock = MockAudioInput::failing(
            StreamFormat::new(44100, 1),
            DtmfError::PermissionDenied("microphone access".into()),
        );
        let mut h = harness(mock, CodecConfig::default());
        assert!(matches!(h.recognizer.start(), Err(DtmfError::PermissionDenied(_))));
        assert!(!h.recognizer.is_running());
    }

    #[test]
    fn test_repeated_start_stop_releases_each_detector() {
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 1)), CodecConfig::default());
        let settings = h.recognizer.settings();
        let idle = Arc::strong_count(&settings);

        for _ in 0..5 {
            h.recognizer.start().unwrap();
            assert_eq!(Arc::strong_count(&settings), idle + 1);
            h.recognizer.stop().unwrap();
            assert_eq!(Arc::strong_count(&settings), idle);
        }
        assert_eq!(h.mock.start_count(), 5);
        assert_eq!(h.mock.stop_count(), 5);
    }

    #[test]
    fn test_failed_start_releases_detector() {
        let mock = MockAudioInput::failing(
            StreamFormat::new(44100, 1),
            DtmfError::AudioStartFailed("busy".into()),
        );
        let mut h = harness(mock, CodecConfig::default());
        let settings = h.recognizer.settings();
        let idle = Arc::strong_count(&settings);

        assert!(h.recognizer.start().is_err());
        assert_eq!(Arc::strong_count(&settings), idle);
        assert!(h.recognizer.stop().is_ok());
    }

    #[test]
    fn test_stereo_capture_emits_symbol_from_first_channel() {
        let config = CodecConfig {
            required_persistence_count: 2,
            detection_threshold: 20.0,
            ..CodecConfig::default()
        };
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 2)), config);
        h.recognizer.start().unwrap();

        // Two full blocks delivered in odd-sized chunks
        let samples = stereo_tone(&[1336.0, 770.0], 2048, 44100);
        for chunk in samples.chunks(2 * 300) {
            assert!(h.mock.push(chunk));
        }

        assert_eq!(h.symbols.recv_timeout(WAIT), Ok(DtmfSymbol::Digit5));
        assert!(h.symbols.recv_timeout(Duration::from_millis(100)).is_err());
        h.recognizer.stop().unwrap();
    }

    #[test]
    fn test_settings_changes_apply_to_running_session() {
        let config = CodecConfig {
            required_persistence_count: 10,
            detection_threshold: 20.0,
            ..CodecConfig::default()
        };
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 1)), config);
        h.recognizer.start().unwrap();

        let block: Vec<f32> = stereo_tone(&[697.0, 1209.0], 1024, 44100)
            .into_iter()
            .step_by(2)
            .collect();
        h.mock.push(&block);
        assert!(h.symbols.recv_timeout(Duration::from_millis(100)).is_err());

        h.recognizer.set_required_persistence_count(2);
        h.mock.push(&block);
        assert_eq!(h.symbols.recv_timeout(WAIT), Ok(DtmfSymbol::Digit1));
        h.recognizer.stop().unwrap();
    }

    #[test]
    fn test_stream_failure_is_reported_and_start_recovers() {
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 1)), CodecConfig::default());
        h.recognizer.start().unwrap();

        h.mock.raise_error("device removed");
        let event = h.errors.recv_timeout(WAIT).unwrap();
        assert_eq!(event.kind, ErrorKind::AudioStartFailed);
        assert!(!h.recognizer.is_running());

        // The parked session is released before a new one starts
        assert!(h.recognizer.start().is_ok());
        assert_eq!(h.mock.start_count(), 2);
        h.recognizer.stop().unwrap();
    }

    #[test]
    fn test_invalid_config_fails_before_opening_device() {
        let config = CodecConfig {
            buffer_size: 0,
            ..CodecConfig::default()
        };
        let mut h = harness(MockAudioInput::new(StreamFormat::new(44100, 1)), config);
        assert!(matches!(h.recognizer.start(), Err(DtmfError::Config(_))));
        assert!(!h.recognizer.is_running());
        assert_eq!(h.recognizer.format(), None);
        assert_eq!(h.mock.start_count(), 0);
    }

    #[test]
    fn test_device_rate_that_merges_tone_bins_is_rejected() {
        // 1024 samples at 192 kHz put 697 and 770 Hz in the same bin
        let mut h = harness(
            MockAudioInput::new(StreamFormat::new(192_000, 2)),
            CodecConfig::default(),
        );
        assert_eq!(
            h.recognizer.start(),
            Err(DtmfError::UnknownInputFormat {
                sample_rate: 192_000,
                channels: 2
            })
        );
        assert!(!h.recognizer.is_running());
        assert_eq!(h.mock.start_count(), 0);
    }
}
