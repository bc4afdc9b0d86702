//! CPAL-based live input for capture.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cd_engine::{CaptureSource, DeviceError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Stream;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{error, info, warn};

/// Seconds of input the hand-off ring can hold between drains.
const RING_SECONDS: usize = 4;

/// Default input device as a [`CaptureSource`]. Samples are handed over
/// unprocessed, interleaved, at the device's own rate and channel count.
pub struct CpalInput {
    stream: Option<Stream>,
    consumer: Option<HeapCons<f32>>,
    dropped: Arc<AtomicUsize>,
    sample_rate: u32,
    channels: u16,
}

impl CpalInput {
    pub fn new() -> Self {
        Self {
            stream: None,
            consumer: None,
            dropped: Arc::new(AtomicUsize::new(0)),
            sample_rate: 0,
            channels: 0,
        }
    }
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for CpalInput {
    fn open(&mut self) -> Result<(), DeviceError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(DeviceError::NoDevice)?;
        let supported = device
            .default_input_config()
            .map_err(|e| DeviceError::PermissionDenied(e.to_string()))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(DeviceError::DeviceInit(format!(
                "unsupported input sample format {:?}",
                supported.sample_format()
            )));
        }
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let capacity = sample_rate as usize * channels as usize * RING_SECONDS;
        let (mut producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let dropped = Arc::clone(&self.dropped);
        dropped.store(0, Ordering::Relaxed);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let pushed = producer.push_slice(data);
                    if pushed < data.len() {
                        dropped.fetch_add(data.len() - pushed, Ordering::Relaxed);
                    }
                },
                |err| error!(%err, "audio input stream error"),
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NoDevice,
                other => DeviceError::StreamCreate(other.to_string()),
            })?;
        stream
            .play()
            .map_err(|e| DeviceError::Playback(e.to_string()))?;

        info!(sample_rate, channels, "input device acquired");
        self.stream = Some(stream);
        self.consumer = Some(consumer);
        self.sample_rate = sample_rate;
        self.channels = channels;
        Ok(())
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> usize {
        let Some(consumer) = self.consumer.as_mut() else {
            return 0;
        };
        let before = out.len();
        out.extend(consumer.pop_iter());
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "input overrun, samples lost");
        }
        out.len() - before
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                warn!(%err, "failed to pause input stream");
            }
        }
        self.consumer = None;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}
