//! In-process loopback: whatever the output renders, the input captures.
//!
//! A pacing thread pulls blocks from the render callback at the real sample
//! rate and pushes channel 0 into a lock-free ring buffer; a capture thread
//! drains the ring buffer into the input callback. Useful for self-tests of
//! the full synthesizer → recognizer path without a speaker or microphone.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::domain::{AudioDeviceInfo, AudioSample, DtmfError, DtmfResult, StreamFormat};
use crate::ports::{
    AudioInput, AudioOutput, InputCallback, InputFactory, OutputFactory, RenderCallback,
    StreamErrorCallback,
};

/// Capture thread poll interval when the ring buffer is empty
const CAPTURE_POLL: Duration = Duration::from_millis(2);

struct Shared {
    sample_rate: u32,
    block_frames: usize,
    producer: Mutex<Option<HeapProd<AudioSample>>>,
    consumer: Mutex<Option<HeapCons<AudioSample>>>,
}

/// Create a connected output/input pair.
///
/// `block_frames` is how many frames the output renders per tick;
/// `capacity` bounds how many samples may sit between the two ends.
pub fn loopback(
    sample_rate: u32,
    block_frames: usize,
    capacity: usize,
) -> (LoopbackOutput, LoopbackInput) {
    let (producer, consumer) = HeapRb::<AudioSample>::new(capacity).split();
    let shared = Arc::new(Shared {
        sample_rate,
        block_frames,
        producer: Mutex::new(Some(producer)),
        consumer: Mutex::new(Some(consumer)),
    });
    (
        LoopbackOutput {
            shared: shared.clone(),
            worker: None,
        },
        LoopbackInput {
            shared,
            worker: None,
        },
    )
}

struct Worker<T> {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<T>,
}

impl<T> Worker<T> {
    fn finish(self) -> Option<T> {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.join().ok()
    }
}

/// Output end of a loopback pair
pub struct LoopbackOutput {
    shared: Arc<Shared>,
    worker: Option<Worker<HeapProd<AudioSample>>>,
}

impl LoopbackOutput {
    /// Factory handing out fresh handles onto the same ring buffer
    pub fn factory(&self) -> OutputFactory {
        let shared = self.shared.clone();
        Arc::new(move || {
            Box::new(LoopbackOutput {
                shared: shared.clone(),
                worker: None,
            }) as Box<dyn AudioOutput>
        })
    }
}

impl AudioOutput for LoopbackOutput {
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>> {
        Ok(vec![AudioDeviceInfo {
            id: "loopback".into(),
            name: "Loopback".into(),
            is_input: false,
            is_default: false,
        }])
    }

    fn start(
        &mut self,
        format: StreamFormat,
        mut callback: RenderCallback,
        _on_error: StreamErrorCallback,
    ) -> DtmfResult<()> {
        if format.sample_rate != self.shared.sample_rate || format.channels == 0 {
            return Err(DtmfError::AudioStartFailed(format!(
                "Loopback runs at {} Hz, requested {} Hz / {} channel(s)",
                self.shared.sample_rate, format.sample_rate, format.channels
            )));
        }

        let mut producer = self
            .shared
            .producer
            .lock()
            .map_err(|_| DtmfError::AudioStartFailed("Loopback state corrupted".into()))?
            .take()
            .ok_or_else(|| DtmfError::AudioStartFailed("Loopback output already in use".into()))?;

        let channels = format.channels as usize;
        let block_frames = self.shared.block_frames;
        let tick = Duration::from_secs_f64(block_frames as f64 / format.sample_rate as f64);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = thread::spawn(move || {
            let mut block = vec![0.0; block_frames * channels];
            let mut deadline = Instant::now();
            loop {
                callback(&mut block);
                // Full ring buffer: newest frames are dropped, like a device overrun
                for frame in block.chunks(channels) {
                    let _ = producer.try_push(frame[0]);
                }

                deadline += tick;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
                if thread_stop.load(Ordering::SeqCst) {
                    break;
                }
            }
            producer
        });

        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop(&mut self) -> DtmfResult<()> {
        if let Some(worker) = self.worker.take() {
            let producer = worker
                .finish()
                .ok_or_else(|| DtmfError::AudioStartFailed("Loopback output thread panicked".into()))?;
            if let Ok(mut slot) = self.shared.producer.lock() {
                *slot = Some(producer);
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for LoopbackOutput {
    fn drop(&mut self) {
        let _ = AudioOutput::stop(self);
    }
}

/// Input end of a loopback pair (mono)
pub struct LoopbackInput {
    shared: Arc<Shared>,
    worker: Option<Worker<HeapCons<AudioSample>>>,
}

impl LoopbackInput {
    pub fn factory(&self) -> InputFactory {
        let shared = self.shared.clone();
        Arc::new(move || {
            Box::new(LoopbackInput {
                shared: shared.clone(),
                worker: None,
            }) as Box<dyn AudioInput>
        })
    }
}

impl AudioInput for LoopbackInput {
    fn list_devices(&self) -> DtmfResult<Vec<AudioDeviceInfo>> {
        Ok(vec![AudioDeviceInfo {
            id: "loopback".into(),
            name: "Loopback".into(),
            is_input: true,
            is_default: false,
        }])
    }

    fn input_format(&self) -> DtmfResult<StreamFormat> {
        Ok(StreamFormat::new(self.shared.sample_rate, 1))
    }

    fn start(&mut self, mut callback: InputCallback, _on_error: StreamErrorCallback) -> DtmfResult<()> {
        let mut consumer = self
            .shared
            .consumer
            .lock()
            .map_err(|_| DtmfError::AudioStartFailed("Loopback state corrupted".into()))?
            .take()
            .ok_or_else(|| DtmfError::AudioStartFailed("Loopback input already in use".into()))?;

        // Whatever was rendered before capture started is stale
        consumer.clear();

        let block_frames = self.shared.block_frames;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = thread::spawn(move || {
            let mut block = vec![0.0; block_frames];
            while !thread_stop.load(Ordering::SeqCst) {
                if consumer.is_empty() {
                    thread::sleep(CAPTURE_POLL);
                    continue;
                }
                let n = consumer.pop_slice(&mut block);
                callback(&block[..n]);
            }
            consumer
        });

        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop(&mut self) -> DtmfResult<()> {
        if let Some(worker) = self.worker.take() {
            let consumer = worker
                .finish()
                .ok_or_else(|| DtmfError::AudioStartFailed("Loopback input thread panicked".into()))?;
            if let Ok(mut slot) = self.shared.consumer.lock() {
                *slot = Some(consumer);
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for LoopbackInput {
    fn drop(&mut self) {
        let _ = AudioInput::stop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_rendered_samples_reach_the_input() {
        let (mut output, mut input) = loopback(8000, 80, 4096);
        let captured = Arc::new(Mutex::new(Vec::new()));

        let sink = captured.clone();
        input
            .start(
                Box::new(move |samples| sink.lock().unwrap().extend_from_slice(samples)),
                Box::new(|_| {}),
            )
            .unwrap();

        // Stereo output, only channel 0 crosses over
        output
            .start(
                StreamFormat::new(8000, 2),
                Box::new(|buf| {
                    for frame in buf.chunks_mut(2) {
                        frame[0] = 0.5;
                        frame[1] = -1.0;
                    }
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while captured.lock().unwrap().len() < 400 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        output.stop().unwrap();
        input.stop().unwrap();

        let captured = captured.lock().unwrap();
        assert!(captured.len() >= 400, "only {} samples", captured.len());
        assert!(captured.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_wrong_sample_rate_is_rejected() {
        let (mut output, _input) = loopback(8000, 80, 1024);
        let result = output.start(
            StreamFormat::new(44100, 2),
            Box::new(|_| {}),
            Box::new(|_| {}),
        );
        assert!(matches!(result, Err(DtmfError::AudioStartFailed(_))));
        assert!(!output.is_running());
    }

    #[test]
    fn test_ends_are_reusable_after_stop() {
        let (output, _input) = loopback(8000, 80, 1024);
        let factory = output.factory();
        let renders = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let mut out = factory();
            let counter = renders.clone();
            out.start(
                StreamFormat::new(8000, 1),
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                Box::new(|_| {}),
            )
            .unwrap();
            out.stop().unwrap();
        }
        assert!(renders.load(Ordering::SeqCst) >= 3);
    }
}
