//! Tone synthesizer: plays a dial string as DTMF audio
//!
//! Two threads cooperate during a playback session:
//! - the device's render callback (real-time) owns a `ToneRenderer`, which
//!   keeps the oscillator phases and reads the active tone once per block;
//! - the session thread owns the output port and walks the symbol schedule,
//!   storing a new `ActiveTone` at every tone/gap boundary.
//!
//! The only state they share is the `ToneCell`, a single atomic word, so the
//! render path never locks, allocates or observes a half-updated pair.
//!
//! Phases are never reset at a boundary, only the target frequencies change,
//! so transitions are phase-continuous. Amplitude still switches instantly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::events::EventSink;
use super::table::DtmfSymbol;
use super::tone_cell::{ActiveTone, ToneCell};
use crate::domain::{
    AudioSample, CodecConfig, DtmfError, DtmfResult, ErrorEvent, ErrorKind, StreamFormat,
};
use crate::dsp::Nco;
use crate::ports::OutputFactory;

/// Per-oscillator amplitude; two tones at full swing sum to at most 1.0
const TONE_AMPLITUDE: f32 = 0.5;

/// Render-side oscillator pair driven by a `ToneCell`
pub struct ToneRenderer {
    tone: Arc<ToneCell>,
    current: ActiveTone,
    osc1: Nco,
    osc2: Nco,
    channels: usize,
}

impl ToneRenderer {
    pub fn new(tone: Arc<ToneCell>, format: StreamFormat) -> Self {
        let sample_rate = format.sample_rate as f64;
        Self {
            tone,
            current: ActiveTone::SILENCE,
            osc1: Nco::new(0.0, sample_rate),
            osc2: Nco::new(0.0, sample_rate),
            channels: usize::from(format.channels.max(1)),
        }
    }

    /// Fill an interleaved block; every channel of a frame gets the same sample.
    /// Reads the tone cell once per block. Silence renders true zeros.
    pub fn render(&mut self, out: &mut [AudioSample]) {
        let tone = self.tone.load();
        if tone != self.current {
            self.osc1.set_frequency(f64::from(tone.freq1));
            self.osc2.set_frequency(f64::from(tone.freq2));
            self.current = tone;
        }

        let silent = tone.is_silence();
        for frame in out.chunks_mut(self.channels) {
            let s1 = self.osc1.next_sin();
            let s2 = self.osc2.next_sin();
            let sample = if silent {
                0.0
            } else {
                TONE_AMPLITUDE * s1 + TONE_AMPLITUDE * s2
            };
            frame.fill(sample);
        }
    }

    /// Tone used for the most recent block
    pub fn current(&self) -> ActiveTone {
        self.current
    }

    /// Oscillator phases, each in `[0, 2π)`
    pub fn phases(&self) -> (f64, f64) {
        (self.osc1.phase(), self.osc2.phase())
    }
}

fn samples_for(duration_ms: u64, sample_rate: u32) -> usize {
    (duration_ms as u128 * sample_rate as u128 / 1000) as usize
}

/// Render a whole dial string offline as mono samples, with the same
/// oscillators and phase continuity as live playback.
pub fn render_sequence(
    symbols: &[DtmfSymbol],
    tone_duration_ms: u64,
    intertone_gap_ms: u64,
    sample_rate: u32,
) -> Vec<AudioSample> {
    let tone_len = samples_for(tone_duration_ms, sample_rate);
    let gap_len = samples_for(intertone_gap_ms, sample_rate);
    if tone_len + gap_len == 0 {
        return Vec::new();
    }

    let cell = Arc::new(ToneCell::new());
    let mut renderer = ToneRenderer::new(cell.clone(), StreamFormat::new(sample_rate, 1));
    let mut samples = vec![0.0; symbols.len() * (tone_len + gap_len)];

    for (chunk, &symbol) in samples.chunks_mut(tone_len + gap_len).zip(symbols) {
        let (tone, gap) = chunk.split_at_mut(tone_len);
        cell.store(ActiveTone::for_symbol(symbol));
        renderer.render(tone);
        cell.silence();
        renderer.render(gap);
    }

    samples
}

/// Sleep until `deadline` unless a stop is requested first.
/// Returns true when playback should stop.
fn stop_requested_before(stop_rx: &Receiver<()>, deadline: Instant) -> bool {
    !matches!(stop_rx.recv_deadline(deadline), Err(RecvTimeoutError::Timeout))
}

/// Walk the schedule, one tone then one gap per symbol.
/// Deadlines accumulate from the start so timer slop does not add up.
/// Returns true if the whole sequence played.
fn run_schedule(
    tone: &ToneCell,
    symbols: &[DtmfSymbol],
    tone_duration: Duration,
    intertone_gap: Duration,
    stop_rx: &Receiver<()>,
) -> bool {
    let mut deadline = Instant::now();
    for &symbol in symbols {
        tone.store(ActiveTone::for_symbol(symbol));
        deadline += tone_duration;
        if stop_requested_before(stop_rx, deadline) {
            return false;
        }

        tone.silence();
        deadline += intertone_gap;
        if stop_requested_before(stop_rx, deadline) {
            return false;
        }
    }
    true
}

struct PlaybackSession {
    /// Dropping this wakes the session thread and ends playback
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Everything the session thread needs, moved onto it at `play`
struct SessionPlan {
    factory: OutputFactory,
    format: StreamFormat,
    tone: Arc<ToneCell>,
    playing: Arc<AtomicBool>,
    errors: EventSink<ErrorEvent>,
    symbols: Vec<DtmfSymbol>,
    tone_duration: Duration,
    intertone_gap: Duration,
}

fn run_playback_session(
    plan: SessionPlan,
    stop_rx: Receiver<()>,
    ready_tx: Sender<DtmfResult<()>>,
) {
    let mut output = (plan.factory)();
    plan.tone.silence();

    let mut renderer = ToneRenderer::new(plan.tone.clone(), plan.format);
    let errors = plan.errors.clone();
    let started = output.start(
        plan.format,
        Box::new(move |buf: &mut [AudioSample]| renderer.render(buf)),
        Box::new(move |message: String| {
            errors.publish(ErrorEvent {
                kind: ErrorKind::AudioStartFailed,
                message: format!("Output stream error: {message}"),
            });
        }),
    );

    if let Err(e) = started {
        let _ = ready_tx.send(Err(e));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    log::info!(
        "Playing {} symbol(s) at {} Hz, {} channel(s)",
        plan.symbols.len(),
        plan.format.sample_rate,
        plan.format.channels
    );

    let completed = run_schedule(
        &plan.tone,
        &plan.symbols,
        plan.tone_duration,
        plan.intertone_gap,
        &stop_rx,
    );

    plan.tone.silence();
    if let Err(e) = output.stop() {
        log::warn!("Failed to stop audio output: {e}");
    }
    plan.playing.store(false, Ordering::SeqCst);

    if completed {
        log::info!("Playback complete");
    } else {
        log::info!("Playback stopped");
    }
}

/// DTMF tone synthesizer
pub struct ToneSynthesizer {
    config: CodecConfig,
    output_factory: OutputFactory,
    errors: EventSink<ErrorEvent>,
    tone: Arc<ToneCell>,
    playing: Arc<AtomicBool>,
    session: Option<PlaybackSession>,
}

impl ToneSynthesizer {
    /// `output_factory` is called once per playback session to acquire the device.
    /// Stream failures after a session started are published on `errors`.
    pub fn new(
        config: &CodecConfig,
        output_factory: OutputFactory,
        errors: EventSink<ErrorEvent>,
    ) -> Self {
        Self {
            config: config.clone(),
            output_factory,
            errors,
            tone: Arc::new(ToneCell::new()),
            playing: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    /// Start playing `symbols`, each for `tone_duration_ms` followed by
    /// `intertone_gap_ms` of silence. Returns once the output device is running;
    /// playback then continues in the background and stops by itself after the
    /// last gap.
    ///
    /// Fails with `AlreadyPlaying` (leaving the current session untouched) if a
    /// session is active, `Config` if the configuration does not validate, or
    /// `AudioStartFailed` if the device cannot be started.
    pub fn play(
        &mut self,
        symbols: &[DtmfSymbol],
        tone_duration_ms: u64,
        intertone_gap_ms: u64,
    ) -> DtmfResult<()> {
        if self.playing.load(Ordering::SeqCst) {
            return Err(DtmfError::AlreadyPlaying);
        }
        self.config.validate()?;
        // A session that completed on its own still needs joining
        self.reap_session();

        self.playing.store(true, Ordering::SeqCst);

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<DtmfResult<()>>(1);

        let plan = SessionPlan {
            factory: self.output_factory.clone(),
            format: self.config.output_format(),
            tone: self.tone.clone(),
            playing: self.playing.clone(),
            errors: self.errors.clone(),
            symbols: symbols.to_vec(),
            tone_duration: Duration::from_millis(tone_duration_ms),
            intertone_gap: Duration::from_millis(intertone_gap_ms),
        };

        let handle = thread::spawn(move || run_playback_session(plan, stop_rx, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.session = Some(PlaybackSession { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                log::error!("Failed to start audio output: {e}");
                let _ = handle.join();
                self.playing.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                self.playing.store(false, Ordering::SeqCst);
                Err(DtmfError::AudioStartFailed("Playback thread exited".into()))
            }
        }
    }

    /// Stop playback immediately and release the output device.
    /// No-op when nothing is playing.
    pub fn stop(&mut self) -> DtmfResult<()> {
        if let Some(session) = self.session.take() {
            drop(session.stop_tx);
            if session.handle.join().is_err() {
                log::error!("Playback thread panicked");
            }
        }
        self.tone.silence();
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Block until the current session finishes on its own
    pub fn wait(&mut self) {
        if let Some(session) = self.session.take() {
            if session.handle.join().is_err() {
                log::error!("Playback thread panicked");
            }
            drop(session.stop_tx);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Tone the scheduler currently wants sounding
    pub fn active_tone(&self) -> ActiveTone {
        self.tone.load()
    }

    fn reap_session(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session.stop_tx);
            let _ = session.handle.join();
        }
    }
}

impl Drop for ToneSynthesizer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
