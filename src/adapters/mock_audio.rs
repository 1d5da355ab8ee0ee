//! In-memory audio adapters for development and testing without hardware.
//!
//! Each mock is a cheap handle onto shared state: clone it, hand a factory to
//! the synthesizer or recognizer, and keep the original to drive the stream
//! (`render` pulls a block from the synthesizer, `push` feeds the recognizer)
//! and to inspect start/stop bookkeeping.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{AudioDeviceInfo, AudioSample, DtmfError, DtmfResult, StreamFormat};
use crate::ports::{
    AudioInput, AudioOutput, InputCallback, InputFactory, OutputFactory, RenderCallback,
    StreamErrorCallback,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct OutputState {
    callback: Option<RenderCallback>,
    on_error: Option<StreamErrorCallback>,
    format: Option<StreamFormat>,
    fail_start: Option<DtmfError>,
    starts: usize,
    stops: usize,
}

/// Output device that renders only when asked to
#[derive(Clone, Default)]
pub struct MockAudioOutput {
    state: Arc<Mutex<OutputState>>,
}

impl MockAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// An output whose `start` always fails with `err`
    pub fn failing(err: DtmfError) -> Self {
        let mock = Self::new();
        lock(&mock.state).fail_start = Some(err);
        mock
    }

    pub fn factory(&self) -> OutputFactory {
        let mock = self.clone();
        Arc::new(move || Box::new(mock.clone()) as Box<dyn AudioOutput>)
    }

    /// Pull one interleaved block from the running stream.
    /// Returns false (and leaves `buf` untouched) when nothing is playing.
    pub fn render(&self, buf: &mut [AudioSample]) -> bool {
        match lock(&self.state).callback.as_mut() {
            Some(callback) => {
                callback(buf);
                true
            }
            None => false,
        }
    }

    /// Simulate the driver reporting a stream failure
    pub fn raise_error(&self, message: &str) {
        if let Some(on_error) = lock(&self.state).on_error.as_mut() {
            on_error(message.to_string());
        }
    }

    pub fn format(&self) -> Option<StreamFormat> {
        lock(&self.state).format
    }

    pub fn start_count(&self) -> usize {
        lock(&self.state).starts
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }
}

impl AudioOutput for MockAudioOutput {
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>> {
        Ok(vec![AudioDeviceInfo {
            id: "mock-output".into(),
            name: "Mock Output".into(),
            is_input: false,
            is_default: true,
        }])
    }

    fn start(
        &mut self,
        format: StreamFormat,
        callback: RenderCallback,
        on_error: StreamErrorCallback,
    ) -> DtmfResult<()> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_start.clone() {
            return Err(err);
        }
        if state.callback.is_some() {
            return Err(DtmfError::AlreadyPlaying);
        }
        state.callback = Some(callback);
        state.on_error = Some(on_error);
        state.format = Some(format);
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> DtmfResult<()> {
        let mut state = lock(&self.state);
        if state.callback.take().is_some() {
            state.stops += 1;
        }
        state.on_error = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        lock(&self.state).callback.is_some()
    }
}

struct InputState {
    format: StreamFormat,
    callback: Option<InputCallback>,
    on_error: Option<StreamErrorCallback>,
    fail_start: Option<DtmfError>,
    starts: usize,
    stops: usize,
}

/// Input device fed by hand
#[derive(Clone)]
pub struct MockAudioInput {
    state: Arc<Mutex<InputState>>,
}

impl MockAudioInput {
    /// An input that reports `format` and starts successfully
    pub fn new(format: StreamFormat) -> Self {
        Self {
            state: Arc::new(Mutex::new(InputState {
                format,
                callback: None,
                on_error: None,
                fail_start: None,
                starts: 0,
                stops: 0,
            })),
        }
    }

    /// An input whose `start` always fails with `err`
    pub fn failing(format: StreamFormat, err: DtmfError) -> Self {
        let mock = Self::new(format);
        lock(&mock.state).fail_start = Some(err);
        mock
    }

    pub fn factory(&self) -> InputFactory {
        let mock = self.clone();
        Arc::new(move || Box::new(mock.clone()) as Box<dyn AudioInput>)
    }

    /// Deliver interleaved samples to the running stream.
    /// Returns false when nothing is capturing.
    pub fn push(&self, samples: &[AudioSample]) -> bool {
        match lock(&self.state).callback.as_mut() {
            Some(callback) => {
                callback(samples);
                true
            }
            None => false,
        }
    }

    /// Simulate the driver reporting a stream failure
    pub fn raise_error(&self, message: &str) {
        if let Some(on_error) = lock(&self.state).on_error.as_mut() {
            on_error(message.to_string());
        }
    }

    pub fn start_count(&self) -> usize {
        lock(&self.state).starts
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }
}

impl AudioInput for MockAudioInput {
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>> {
        Ok(vec![AudioDeviceInfo {
            id: "mock-input".into(),
            name: "Mock Input".into(),
            is_input: true,
            is_default: true,
        }])
    }

    fn input_format(&self) -> DtmfResult<StreamFormat> {
        Ok(lock(&self.state).format)
    }

    fn start(&mut self, callback: InputCallback, on_error: StreamErrorCallback) -> DtmfResult<()> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_start.clone() {
            return Err(err);
        }
        if state.callback.is_some() {
            return Err(DtmfError::AlreadyRunning);
        }
        state.callback = Some(callback);
        state.on_error = Some(on_error);
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> DtmfResult<()> {
        let mut state = lock(&self.state);
        if state.callback.take().is_some() {
            state.stops += 1;
        }
        state.on_error = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        lock(&self.state).callback.is_some()
    }
}
