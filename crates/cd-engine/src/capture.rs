//! Capture subsystem: record a live input stream into an accumulating
//! buffer and finalize it into a single asset.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};

use crate::runtime::DeviceError;
use crate::wav::encode_wav;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("input device unavailable: {0}")]
    Device(#[from] DeviceError),
    #[error("a capture is already in progress")]
    AlreadyCapturing,
    #[error("no capture in progress")]
    NotCapturing,
    #[error("capture finalization was interrupted")]
    Interrupted,
}

/// A live input stream.
pub trait CaptureSource {
    /// Acquire the device and start streaming.
    fn open(&mut self) -> Result<(), DeviceError>;
    /// Append every interleaved sample that has arrived since the last
    /// call to `out`. Returns the count appended.
    fn drain(&mut self, out: &mut Vec<f32>) -> usize;
    /// Stop streaming and release the device.
    fn close(&mut self);
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
}

/// An open capture: drained chunks in arrival order.
pub struct CaptureSession {
    source: Box<dyn CaptureSource>,
    chunks: Vec<Vec<f32>>,
}

impl CaptureSession {
    /// Open `source` and start a session with an empty buffer. Nothing is
    /// kept if the source fails to open.
    pub fn start(mut source: Box<dyn CaptureSource>) -> Result<Self, CaptureError> {
        source.open()?;
        info!(
            sample_rate = source.sample_rate(),
            channels = source.channels(),
            "capture started"
        );
        Ok(Self {
            source,
            chunks: Vec::new(),
        })
    }

    /// Move whatever the source has buffered into the session.
    pub fn pump(&mut self) -> usize {
        let mut chunk = Vec::new();
        let n = self.source.drain(&mut chunk);
        if n > 0 {
            self.chunks.push(chunk);
        }
        n
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn samples_captured(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Drain the remainder and close the device. The returned take is
    /// finalized separately so the encoding can run off the tick thread.
    pub fn finish(mut self) -> CaptureTake {
        self.pump();
        self.source.close();
        debug!(chunks = self.chunks.len(), "capture closed");
        CaptureTake {
            sample_rate: self.source.sample_rate(),
            channels: self.source.channels(),
            chunks: self.chunks,
        }
    }
}

/// Raw chunks of a closed capture.
#[derive(Debug)]
pub struct CaptureTake {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunks: Vec<Vec<f32>>,
}

impl CaptureTake {
    /// Concatenate the chunks and encode them.
    pub fn finalize(self) -> CaptureAsset {
        let samples = self.chunks.concat();
        let wav = encode_wav(&samples, self.channels, self.sample_rate);
        info!(samples = samples.len(), "capture finalized");
        CaptureAsset {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples,
            wav,
        }
    }
}

/// A finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureAsset {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved
    pub samples: Vec<f32>,
    /// 16-bit PCM WAV encoding of `samples`
    pub wav: Vec<u8>,
}

impl CaptureAsset {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

/// In-memory capture source fed through a [`CaptureFeed`].
pub struct BufferedSource {
    queue: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
    channels: u16,
    open_error: Option<DeviceError>,
    open: bool,
}

/// Producer side of a [`BufferedSource`].
#[derive(Clone)]
pub struct CaptureFeed {
    queue: Arc<Mutex<VecDeque<f32>>>,
}

impl CaptureFeed {
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(samples.iter().copied());
        }
    }
}

impl BufferedSource {
    pub fn new(sample_rate: u32, channels: u16) -> (Self, CaptureFeed) {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let source = Self {
            queue: Arc::clone(&queue),
            sample_rate,
            channels: channels.max(1),
            open_error: None,
            open: false,
        };
        (source, CaptureFeed { queue })
    }

    /// A source whose `open` fails with `error`.
    pub fn failing(error: DeviceError) -> Self {
        let (mut source, _) = Self::new(44100, 1);
        source.open_error = Some(error);
        source
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl CaptureSource for BufferedSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
        self.open = true;
        Ok(())
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> usize {
        if !self.open {
            return 0;
        }
        match self.queue.lock() {
            Ok(mut queue) => {
                let n = queue.len();
                out.extend(queue.drain(..));
                n
            }
            Err(_) => 0,
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_concatenate_in_arrival_order() {
        let (source, feed) = BufferedSource::new(8000, 1);
        let mut session = CaptureSession::start(Box::new(source)).unwrap();
        feed.push(&[0.1, 0.2]);
        assert_eq!(session.pump(), 2);
        assert_eq!(session.pump(), 0);
        feed.push(&[0.3]);
        session.pump();
        feed.push(&[0.4]);
        assert_eq!(session.chunk_count(), 2);

        let asset = session.finish().finalize();
        assert_eq!(asset.samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(asset.wav.len(), 44 + 8);
        assert_eq!(asset.frames(), 4);
        assert!((asset.duration() - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn open_clears_stale_input() {
        let (source, feed) = BufferedSource::new(8000, 2);
        feed.push(&[1.0, 1.0]);
        let mut session = CaptureSession::start(Box::new(source)).unwrap();
        assert_eq!(session.pump(), 0);
        let asset = session.finish().finalize();
        assert!(asset.samples.is_empty());
    }

    #[test]
    fn failed_open_rejects_start() {
        let source = BufferedSource::failing(DeviceError::PermissionDenied("mic".into()));
        let err = CaptureSession::start(Box::new(source)).err();
        assert_eq!(
            err,
            Some(CaptureError::Device(DeviceError::PermissionDenied("mic".into())))
        );
    }
}
