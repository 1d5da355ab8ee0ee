//! Audio port traits

use crate::domain::{AudioDeviceInfo, AudioSample, DtmfResult, StreamFormat};

/// Callback receiving interleaved captured samples
pub type InputCallback = Box<dyn FnMut(&[AudioSample]) + Send + 'static>;

/// Callback filling an interleaved output buffer
pub type RenderCallback = Box<dyn FnMut(&mut [AudioSample]) + Send + 'static>;

/// Callback invoked from the driver when a running stream fails
pub type StreamErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

/// Trait for audio input (capture from microphone)
///
/// Note: No `Send` bound. cpal::Stream is !Send, so implementations
/// must live on the thread that created them (the session thread).
pub trait AudioInput {
    /// List available input devices
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>>;

    /// Format the device will deliver once started
    fn input_format(&self) -> DtmfResult<StreamFormat>;

    /// Start capturing audio, calling `callback` with interleaved samples
    /// in the format reported by `input_format`
    fn start(&mut self, callback: InputCallback, on_error: StreamErrorCallback) -> DtmfResult<()>;

    /// Stop capturing
    fn stop(&mut self) -> DtmfResult<()>;

    /// Check if currently capturing
    fn is_running(&self) -> bool;
}

/// Trait for audio output (playback to speaker)
pub trait AudioOutput {
    /// List available output devices
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>>;

    /// Start playback in `format`, calling `callback` to fill interleaved frames
    fn start(
        &mut self,
        format: StreamFormat,
        callback: RenderCallback,
        on_error: StreamErrorCallback,
    ) -> DtmfResult<()>;

    /// Stop playback
    fn stop(&mut self) -> DtmfResult<()>;

    /// Check if currently playing
    fn is_running(&self) -> bool;
}

/// Creates a fresh input port for each recognition session
pub type InputFactory = std::sync::Arc<dyn Fn() -> Box<dyn AudioInput> + Send + Sync>;

/// Creates a fresh output port for each playback session
pub type OutputFactory = std::sync::Arc<dyn Fn() -> Box<dyn AudioOutput> + Send + Sync>;
