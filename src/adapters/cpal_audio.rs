//! CPAL audio adapter, implements AudioInput and AudioOutput using the cpal crate
//!
//! cpal talks to the OS audio system (CoreAudio on macOS, WASAPI on Windows,
//! ALSA on Linux) and hands out raw audio samples via callbacks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::{AudioDeviceInfo, AudioSample, DtmfError, DtmfResult, StreamFormat};
use crate::ports::{AudioInput, AudioOutput, InputCallback, RenderCallback, StreamErrorCallback};

fn list_host_devices(host: &Host, is_input: bool) -> Vec<AudioDeviceInfo> {
    let default_device = if is_input {
        host.default_input_device()
    } else {
        host.default_output_device()
    };
    let default_name = default_device.as_ref().and_then(|d| d.name().ok());

    let devices = if is_input {
        host.input_devices()
    } else {
        host.output_devices()
    };

    let mut infos = Vec::new();
    if let Ok(devices) = devices {
        for device in devices {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_name
                .as_ref()
                .map(|dn| dn == &name)
                .unwrap_or(false);

            infos.push(AudioDeviceInfo {
                id: name.clone(),
                name,
                is_input,
                is_default,
            });
        }
    }
    infos
}

/// Named device, or the host default when `device_id` is None
fn find_device(host: &Host, device_id: Option<&str>, is_input: bool) -> DtmfResult<Device> {
    let Some(device_id) = device_id else {
        let default_device = if is_input {
            host.default_input_device()
        } else {
            host.default_output_device()
        };
        return default_device
            .ok_or_else(|| DtmfError::AudioStartFailed("No default audio device".into()));
    };

    let mut devices = if is_input {
        host.input_devices()
    } else {
        host.output_devices()
    }
    .map_err(|e| DtmfError::AudioStartFailed(format!("Failed to enumerate devices: {e}")))?;

    devices
        .find(|d| d.name().map(|n| n == device_id).unwrap_or(false))
        .ok_or_else(|| DtmfError::AudioStartFailed(format!("Audio device not found: {device_id}")))
}

/// Audio input adapter backed by cpal.
///
/// Important: `cpal::Stream` is `!Send`; it can only live on the thread that
/// created it. The recognizer creates this adapter on its session thread.
pub struct CpalAudioInput {
    device_id: Option<String>,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalAudioInput {
    /// Capture from the default input device
    pub fn new() -> Self {
        Self {
            device_id: None,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Capture from the device with the given name
    pub fn with_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::new()
        }
    }
}

impl Default for CpalAudioInput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for CpalAudioInput {
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>> {
        Ok(list_host_devices(&cpal::default_host(), true))
    }

    fn input_format(&self) -> DtmfResult<StreamFormat> {
        let host = cpal::default_host();
        let device = find_device(&host, self.device_id.as_deref(), true)?;
        let config = device
            .default_input_config()
            .map_err(|e| DtmfError::AudioStartFailed(format!("No input config: {e}")))?;
        Ok(StreamFormat::new(config.sample_rate().0, config.channels()))
    }

    fn start(
        &mut self,
        mut callback: InputCallback,
        mut on_error: StreamErrorCallback,
    ) -> DtmfResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DtmfError::AlreadyRunning);
        }

        let host = cpal::default_host();
        let device = find_device(&host, self.device_id.as_deref(), true)?;
        let format = self.input_format()?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_running = self.running.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[AudioSample], _: &cpal::InputCallbackInfo| {
                    callback(data);
                },
                move |err| {
                    log::error!("Audio input stream error: {err}");
                    err_running.store(false, Ordering::SeqCst);
                    on_error(err.to_string());
                },
                None, // No timeout
            )
            .map_err(|e| DtmfError::AudioStartFailed(format!("Failed to build stream: {e}")))?;

        stream
            .play()
            .map_err(|e| DtmfError::AudioStartFailed(format!("Failed to start stream: {e}")))?;

        self.running.store(true, Ordering::SeqCst);
        self.stream = Some(stream);

        Ok(())
    }

    fn stop(&mut self) -> DtmfResult<()> {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the stream stops capture and releases the callback
        self.stream = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Audio output adapter backed by cpal. Same `!Send` caveat as `CpalAudioInput`.
pub struct CpalAudioOutput {
    device_id: Option<String>,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalAudioOutput {
    /// Play on the default output device
    pub fn new() -> Self {
        Self {
            device_id: None,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Play on the device with the given name
    pub fn with_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::new()
        }
    }
}

impl Default for CpalAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalAudioOutput {
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>> {
        Ok(list_host_devices(&cpal::default_host(), false))
    }

    fn start(
        &mut self,
        format: StreamFormat,
        mut callback: RenderCallback,
        mut on_error: StreamErrorCallback,
    ) -> DtmfResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DtmfError::AlreadyPlaying);
        }

        let host = cpal::default_host();
        let device = find_device(&host, self.device_id.as_deref(), false)?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_running = self.running.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [AudioSample], _: &cpal::OutputCallbackInfo| {
                    callback(data);
                },
                move |err| {
                    log::error!("Audio output stream error: {err}");
                    err_running.store(false, Ordering::SeqCst);
                    on_error(err.to_string());
                },
                None,
            )
            .map_err(|e| DtmfError::AudioStartFailed(format!("Failed to build stream: {e}")))?;

        stream
            .play()
            .map_err(|e| DtmfError::AudioStartFailed(format!("Failed to start stream: {e}")))?;

        self.running.store(true, Ordering::SeqCst);
        self.stream = Some(stream);

        Ok(())
    }

    fn stop(&mut self) -> DtmfResult<()> {
        self.running.store(false, Ordering::SeqCst);
        self.stream = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_not_running() {
        assert!(!CpalAudioInput::new().is_running());
        assert!(!CpalAudioOutput::new().is_running());
    }

    #[test]
    fn test_list_devices_ok() {
        // Should not panic; may return empty list in CI
        assert!(CpalAudioInput::new().list_devices().is_ok());
        assert!(CpalAudioOutput::new().list_devices().is_ok());
    }

    #[test]
    fn test_stop_idempotent() {
        let mut input = CpalAudioInput::new();
        assert!(input.stop().is_ok());
        assert!(input.stop().is_ok());

        let mut output = CpalAudioOutput::new();
        assert!(output.stop().is_ok());
        assert!(output.stop().is_ok());
    }

    #[test]
    fn test_start_bad_device_errors() {
        let mut input = CpalAudioInput::with_device("nonexistent-device-that-does-not-exist");
        let result = input.start(Box::new(|_samples| {}), Box::new(|_err| {}));
        assert!(matches!(result, Err(DtmfError::AudioStartFailed(_))));

        let mut output = CpalAudioOutput::with_device("nonexistent-device-that-does-not-exist");
        let result = output.start(
            StreamFormat::new(44100, 2),
            Box::new(|_buf| {}),
            Box::new(|_err| {}),
        );
        assert!(matches!(result, Err(DtmfError::AudioStartFailed(_))));
    }
}
