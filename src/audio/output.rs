//! Playback scheduling onto the output device
//!
//! A single continuously-running output stream per session consumes an
//! append-only FIFO of converted buffers, back-to-back and in arrival order.
//! `cpal::Stream` is not `Send` on every platform, so the stream lives on a
//! dedicated thread; the handle carries only the queue and control flags.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam::queue::SegQueue;
use crossbeam_channel::bounded;

use crate::audio::device::get_default_output_device;
use crate::error::AudioError;

/// Process-wide flag backing the output-route guard
static OUTPUT_ROUTE_HELD: AtomicBool = AtomicBool::new(false);

/// Exclusive claim on the playback route.
///
/// The output device belongs to exactly one session at a time; the claim is
/// scoped to this guard and released on drop.
pub struct OutputRoute {
    _private: (),
}

impl OutputRoute {
    /// Claim the route, failing if another session already holds it
    pub fn acquire() -> Result<Self, AudioError> {
        OUTPUT_ROUTE_HELD
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AudioError::RouteInUse)?;

        Ok(Self { _private: () })
    }
}

impl Drop for OutputRoute {
    fn drop(&mut self) {
        OUTPUT_ROUTE_HELD.store(false, Ordering::SeqCst);
    }
}

/// Gapless FIFO playback of converted buffers on the default output device
pub struct PlaybackScheduler {
    /// Append-only queue; unbounded, rate-limited upstream by frame arrival
    queue: Arc<SegQueue<Vec<f32>>>,

    /// Whether the rendering thread should keep the stream alive
    running: Arc<AtomicBool>,

    /// Negotiated device rate
    output_rate: u32,

    /// Device channel count (the mono signal is fanned out to all)
    channels: u16,

    /// Buffers accepted via `schedule`
    buffers_scheduled: AtomicU64,

    /// Rendering thread handle
    thread_handle: Option<JoinHandle<()>>,
}

impl PlaybackScheduler {
    /// Open the default output device and start the rendering stream.
    ///
    /// The stream starts once per session and keeps running until `stop`;
    /// underruns render silence rather than pausing the clock.
    pub fn start() -> Result<Self, AudioError> {
        let device = get_default_output_device()?;
        let supported = device.default_output_config()?;

        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?}",
                supported.sample_format()
            )));
        }

        let config: cpal::StreamConfig = supported.into();
        let output_rate = config.sample_rate.0;
        let channels = config.channels;

        let queue: Arc<SegQueue<Vec<f32>>> = Arc::new(SegQueue::new());
        let running = Arc::new(AtomicBool::new(true));

        let (init_tx, init_rx) = bounded::<Result<(), AudioError>>(1);
        let callback_queue = queue.clone();
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("playback-output".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();

                // Cursor into the buffer currently being rendered; lives in
                // the callback so no lock is taken on the audio thread
                let mut current: Vec<f32> = Vec::new();
                let mut position: usize = 0;

                let stream = cpal_device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels as usize) {
                            if position >= current.len() {
                                if let Some(next) = callback_queue.pop() {
                                    current = next;
                                    position = 0;
                                }
                            }

                            let sample = if position < current.len() {
                                let s = current[position];
                                position += 1;
                                s
                            } else {
                                // Underrun: hold silence, never skip ahead
                                0.0
                            };

                            for out in frame.iter_mut() {
                                *out = sample;
                            }
                        }
                    },
                    move |err| {
                        tracing::warn!("Output stream error: {}", err);
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = init_tx.send(Err(AudioError::StreamError(e.to_string())));
                            return;
                        }
                        let _ = init_tx.send(Ok(()));

                        // Keep thread (and stream) alive while running
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }

                        // Stream is dropped here, stopping playback
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(AudioError::StreamError(e.to_string())));
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match init_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::StreamError(
                    "output stream startup timed out".to_string(),
                ));
            }
        }

        Ok(Self {
            queue,
            running,
            output_rate,
            channels,
            buffers_scheduled: AtomicU64::new(0),
            thread_handle: Some(handle),
        })
    }

    /// Append one converted buffer to the playback queue.
    ///
    /// Non-blocking: never waits on prior buffers finishing.
    pub fn schedule(&self, buffer: Vec<f32>) {
        if buffer.is_empty() {
            return;
        }
        self.queue.push(buffer);
        self.buffers_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Negotiated output sample rate
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Device channel count
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Buffers currently waiting to start playing
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Buffers accepted over the scheduler's lifetime
    pub fn buffers_scheduled(&self) -> u64 {
        self.buffers_scheduled.load(Ordering::Relaxed)
    }

    /// Stop rendering, discarding buffers that have not started playing.
    ///
    /// Idempotent; safe to call more than once.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        // Flush whatever never reached the device
        while self.queue.pop().is_some() {}
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
