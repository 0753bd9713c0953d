use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::dispatch::DEFAULT_STATS_INTERVAL;
use crate::queue::DEFAULT_MAX_BUFFERS;
use crate::{
    DecodeConfig, Error, FileLoopReader, SampleQueue, StatsSink, StreamDispatcher, TransmitSink,
    TxMetadata,
};

/// Settings for a playback pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineConfig {
    /// How the file is decoded, and how big each buffer is.
    pub decode: DecodeConfig,
    /// Most buffers held between the reader and the sink.
    pub max_buffers: usize,
    /// Head start given to the reader before samples start going out.
    pub warmup: Duration,
    /// Time between statistics reports.
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decode: DecodeConfig::default(),
            max_buffers: DEFAULT_MAX_BUFFERS,
            warmup: Duration::from_millis(500),
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

/// Where a pipeline is in its lifecycle.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing has started.
    Idle = 0,
    /// The reader is running, and the queue is filling up.
    Priming = 1,
    /// Samples are being delivered to the sink.
    Streaming = 2,
    /// The reader is being stopped and the end-of-burst marker sent.
    Draining = 3,
    /// Everything is shut down.
    Stopped = 4,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Priming,
            2 => Self::Streaming,
            3 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Priming => f.write_str("priming"),
            Self::Streaming => f.write_str("streaming"),
            Self::Draining => f.write_str("draining"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

struct Shared {
    queue: SampleQueue,
    state: AtomicU8,
}

impl Shared {
    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Release);
        debug!("Pipeline is now {}", state);
    }
}

/// A cloneable handle for watching and stopping a [`Player`] from other
/// threads.
#[derive(Clone)]
pub struct PlayerHandle(Arc<Shared>);

impl PlayerHandle {
    /// Ask the pipeline to stop. Calling this more than once does nothing
    /// extra, and it can be called before the pipeline even starts.
    pub fn request_cancel(&self) {
        if !self.0.queue.is_cancelled() {
            info!("Stopping playback");
        }
        self.0.queue.cancel();
    }

    /// Returns true once cancellation has been requested, or the pipeline
    /// has begun shutting down on its own.
    pub fn is_cancelled(&self) -> bool {
        self.0.queue.is_cancelled()
    }

    /// The pipeline's current state.
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.0.state.load(Ordering::Acquire))
    }

    /// Buffers currently waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.0.queue.len()
    }
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("state", &self.state())
            .field("queue", &self.0.queue)
            .finish()
    }
}

/// Totals from a finished [`Player::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Samples accepted by the sink.
    pub samples_sent: u64,
    /// Buffers forwarded to the sink.
    pub buffers_sent: u64,
    /// Sends where the sink took fewer samples than offered.
    pub short_sends: u64,
    /// Samples left behind by short sends.
    pub samples_dropped: u64,
    /// Times the sink side had to wait on an empty queue.
    pub starved: u64,
    /// Times the file wrapped around to the start.
    pub loops: u64,
    /// Read errors the file reader hit, including ones it recovered from.
    pub read_errors: u64,
    /// The file reader gave up on a read error, so playback ended early
    /// instead of being stopped.
    pub reader_failed: bool,
}

/// Plays a sample file into a transmit sink, looping forever until
/// cancelled.
///
/// Opening a player opens the file, so a bad path fails here, before any
/// thread exists. [`run`][Player::run] then drives the pipeline from the
/// calling thread, which acts as the consumer, while a second thread reads
/// the file. See the [crate documentation][crate] for the state sequence.
pub struct Player {
    file: File,
    path: PathBuf,
    config: PipelineConfig,
    shared: Arc<Shared>,
}

impl Player {
    /// Open a sample file for playback.
    pub fn open<P: AsRef<Path>>(path: P, config: PipelineConfig) -> Result<Self, Error> {
        if config.max_buffers == 0 {
            return Err(Error::InvalidParameter("queue depth must be nonzero"));
        }
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(source) => return Err(Error::OpenFailed { path, source }),
        };
        Ok(Self {
            file,
            path,
            config,
            shared: Arc::new(Shared {
                queue: SampleQueue::new(config.max_buffers),
                state: AtomicU8::new(PipelineState::Idle as u8),
            }),
        })
    }

    /// Get a handle for stopping and monitoring this player.
    pub fn handle(&self) -> PlayerHandle {
        PlayerHandle(self.shared.clone())
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Path of the file being played.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file being played, in bytes.
    pub fn file_size(&self) -> Result<u64, Error> {
        Ok(self.file.metadata()?.len())
    }

    /// Run the pipeline until cancelled, or until the reader gives up.
    ///
    /// Once samples have started flowing, this always finishes by stopping
    /// the reader and sending exactly one end-of-burst marker, even when the
    /// sink fails along the way. A sink failure is returned after that.
    pub fn run<S, T>(self, mut sink: S, stats: T) -> Result<RunSummary, Error>
    where
        S: TransmitSink,
        T: StatsSink,
    {
        let Player {
            file,
            path,
            config,
            shared,
        } = self;

        let mut decode = config.decode;
        let max_send = sink.max_single_send_size();
        if max_send > 0 && decode.samples_per_buffer() > max_send {
            warn!(
                "Buffer size of {} samples exceeds the sink maximum of {}, using the maximum",
                decode.samples_per_buffer(),
                max_send
            );
            decode = decode.clamp_samples_per_buffer(max_send);
        }
        let producer = FileLoopReader::from_file(file, &decode).and_then(|reader| {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(String::from("waverave-reader"))
                .spawn(move || reader.run(&shared.queue))
                .map_err(Error::from)
        });
        let producer = match producer {
            Ok(p) => p,
            Err(e) => return Err(abort_start(&shared, &mut sink, e)),
        };
        shared.set_state(PipelineState::Priming);
        info!(
            "Playing {} ({}, {} samples per buffer, queue depth {})",
            path.display(),
            decode.encoding(),
            decode.samples_per_buffer(),
            config.max_buffers
        );
        if decode.shift() > 0 {
            info!("Attenuating by {} bits", decode.shift());
        }

        let mut summary = RunSummary::default();
        let mut stream_result = Ok(());
        if shared.queue.wait_cancelled(config.warmup) {
            debug!("Cancelled while priming, skipping playback");
        } else {
            shared.set_state(PipelineState::Streaming);
            let mut dispatcher =
                StreamDispatcher::new(&shared.queue, &mut sink, stats, config.stats_interval);
            stream_result = dispatcher.run();
            summary.samples_sent = dispatcher.samples_sent();
            summary.buffers_sent = dispatcher.buffers_sent();
            summary.short_sends = dispatcher.short_sends();
            summary.samples_dropped = dispatcher.samples_dropped();
            summary.starved = dispatcher.starved();
        }

        shared.set_state(PipelineState::Draining);
        shared.queue.cancel();
        let reader_result = producer.join();
        let eob_result = sink.send(&[], TxMetadata::end());
        shared.set_state(PipelineState::Stopped);

        if let Ok(reader) = &reader_result {
            summary.loops = reader.loops;
            summary.read_errors = reader.read_errors;
            summary.reader_failed = reader.failed;
        }
        info!(
            "Playback finished: {} samples in {} buffers, {} loops",
            summary.samples_sent, summary.buffers_sent, summary.loops
        );
        if summary.reader_failed {
            warn!("Playback ended early after {} read errors", summary.read_errors);
        }

        if let Err(e) = stream_result {
            if let Err(eob) = eob_result {
                warn!("Failed sending end-of-burst after sink error: {}", eob);
            }
            return Err(e);
        }
        if reader_result.is_err() {
            return Err(Error::ReaderPanicked);
        }
        eob_result?;
        Ok(summary)
    }
}

/// Shut down a pipeline whose reader never started. The sink still gets its
/// end-of-burst marker, and the pipeline still ends up stopped.
fn abort_start<S: TransmitSink>(shared: &Shared, sink: &mut S, err: Error) -> Error {
    error!("Couldn't start the file reader: {}", err);
    shared.set_state(PipelineState::Draining);
    shared.queue.cancel();
    if let Err(eob) = sink.send(&[], TxMetadata::end()) {
        warn!("Failed sending end-of-burst: {}", eob);
    }
    shared.set_state(PipelineState::Stopped);
    err
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
