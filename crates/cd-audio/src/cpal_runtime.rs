//! CPAL-based output runtime.
//!
//! The render graph lives inside the device callback. Commands cross from
//! the control thread through a ring buffer and are applied at the start
//! of each callback. The device clock is the count of frames the callback
//! has produced.
//!
//! The callback never allocates or frees: stages are built here before
//! they are sent, and anything the graph releases travels back through a
//! second ring to be dropped on the control thread.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cd_engine::{
    AudioRuntime, DeviceError, EngineConfig, MeterTap, PreparedStage, RenderGraph, Retired,
    StageCommand, StageId, StageKind,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, info, warn};

/// Commands queued between the control thread and the callback.
const QUEUE_LEN: usize = 4096;

/// Stage ids the callback's graph has room for.
const STAGE_CAPACITY: usize = 1024;

/// Sample rate reported before a device is acquired.
const FALLBACK_SAMPLE_RATE: u32 = 44100;

/// Submitted but not yet sent; stages are built once the sample rate is
/// known.
enum Pending {
    Command(StageCommand),
    Meter { id: StageId, tap: Arc<MeterTap> },
}

impl Pending {
    fn into_message(self, sample_rate: u32, meter_window: usize) -> Message {
        match self {
            Pending::Command(StageCommand::Create { id, kind }) => Message::Insert {
                id,
                stage: PreparedStage::new(kind, sample_rate, meter_window),
            },
            Pending::Command(command) => Message::Command(command),
            Pending::Meter { id, tap } => Message::Insert {
                id,
                stage: PreparedStage::meter(tap),
            },
        }
    }
}

enum Message {
    Command(StageCommand),
    Insert { id: StageId, stage: PreparedStage },
}

struct Live {
    stream: Stream,
    producer: HeapProd<Message>,
    /// Released stages and spent commands coming back from the callback
    retired: HeapCons<Retired>,
    sample_rate: u32,
}

pub struct CpalRuntime {
    config: EngineConfig,
    live: Option<Live>,
    /// Commands waiting for the device (before acquisition, or while the
    /// queue is full)
    backlog: VecDeque<Pending>,
    frames: Arc<AtomicU64>,
    taps: BTreeMap<StageId, Arc<MeterTap>>,
    running: bool,
}

impl CpalRuntime {
    /// The device is not touched until the first `resume`.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            live: None,
            backlog: VecDeque::new(),
            frames: Arc::new(AtomicU64::new(0)),
            taps: BTreeMap::new(),
            running: false,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.live.is_some()
    }

    fn acquire(&mut self) -> Result<Live, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;

        let supported = device
            .default_output_config()
            .map_err(|e| DeviceError::DeviceInit(e.to_string()))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(DeviceError::DeviceInit(format!(
                "unsupported sample format {:?}",
                supported.sample_format()
            )));
        }
        let config: StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let (producer, mut consumer): (HeapProd<Message>, HeapCons<Message>) =
            HeapRb::<Message>::new(QUEUE_LEN).split();
        let (mut graveyard, retired): (HeapProd<Retired>, HeapCons<Retired>) =
            HeapRb::<Retired>::new(QUEUE_LEN).split();
        let mut graph = RenderGraph::new(sample_rate, &self.config);
        graph.reserve_stages(STAGE_CAPACITY);
        let frames = Arc::clone(&self.frames);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Some(message) = consumer.try_pop() {
                        let spent = match message {
                            Message::Command(command) => graph.apply(command),
                            Message::Insert { id, stage } => graph.insert(id, stage),
                        };
                        if !spent.is_empty() {
                            // Only full if the control thread stopped collecting.
                            let _ = graveyard.try_push(spent);
                        }
                    }
                    let mut produced = 0u64;
                    for chunk in data.chunks_mut(channels) {
                        let frame = graph.render_frame();
                        for (i, sample) in chunk.iter_mut().enumerate() {
                            *sample = match i {
                                0 => frame.left,
                                1 => frame.right,
                                _ => 0.0,
                            };
                        }
                        produced += 1;
                    }
                    frames.fetch_add(produced, Ordering::Release);
                },
                |err| error!(%err, "audio output stream error"),
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NoDevice,
                other => DeviceError::StreamCreate(other.to_string()),
            })?;

        info!(sample_rate, channels, "output device acquired");
        Ok(Live {
            stream,
            producer,
            retired,
            sample_rate,
        })
    }

    /// Drop what the callback handed back, then move backlog commands into
    /// the queue, in order, until it is full.
    fn flush(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        while live.retired.try_pop().is_some() {}

        while live.producer.vacant_len() > 0 {
            let Some(pending) = self.backlog.pop_front() else {
                break;
            };
            let message = pending.into_message(live.sample_rate, self.config.meter_window);
            if live.producer.try_push(message).is_err() {
                warn!("command lost on a full queue");
            }
        }
        if !self.backlog.is_empty() {
            warn!(pending = self.backlog.len(), "command queue full");
        }
    }

    fn send(&mut self, pending: Pending) {
        self.backlog.push_back(pending);
        self.flush();
    }
}

impl AudioRuntime for CpalRuntime {
    fn now(&self) -> f64 {
        let frames = self.frames.load(Ordering::Acquire);
        frames as f64 / self.sample_rate() as f64
    }

    fn sample_rate(&self) -> u32 {
        self.live
            .as_ref()
            .map_or(FALLBACK_SAMPLE_RATE, |live| live.sample_rate)
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        if self.live.is_none() {
            let live = self.acquire()?;
            self.live = Some(live);
            self.flush();
        }
        if !self.running {
            if let Some(live) = &self.live {
                live.stream
                    .play()
                    .map_err(|e| DeviceError::Playback(e.to_string()))?;
            }
            self.running = true;
        }
        Ok(())
    }

    fn suspend(&mut self) {
        if let Some(live) = &self.live {
            if let Err(err) = live.stream.pause() {
                warn!(%err, "failed to pause output stream");
            }
        }
        self.running = false;
    }

    fn submit(&mut self, command: StageCommand) {
        match command {
            StageCommand::Create {
                id,
                kind: StageKind::Meter,
            } => {
                let tap = Arc::new(MeterTap::new(self.config.meter_window));
                self.taps.insert(id, Arc::clone(&tap));
                self.send(Pending::Meter { id, tap });
            }
            StageCommand::Release { id } => {
                self.taps.remove(&id);
                self.send(Pending::Command(StageCommand::Release { id }));
            }
            command => self.send(Pending::Command(command)),
        }
    }

    fn read_meter(&self, stage: StageId, out: &mut [f32]) -> usize {
        self.taps.get(&stage).map_or(0, |tap| tap.read(out))
    }
}
