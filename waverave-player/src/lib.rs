/*!

Continuous playback of recorded IQ sample files into a real-time transmit
sink, looping seamlessly whenever the file runs out.

A playback pipeline has two threads: a producer that reads and decodes the
file, and a consumer that feeds the decoded samples to a [`TransmitSink`].
They only ever meet in a bounded [`SampleQueue`], which is the pipeline's one
source of backpressure. Disk stalls are absorbed by the queue depth, and a
slow sink stalls the reader instead of growing memory.

The standard entry point is [`Player::open`], which checks the file can be
opened before anything else starts. [`Player::run`] then walks the pipeline
through its states:

- [`PipelineState::Idle`] - nothing started.
- [`PipelineState::Priming`] - the reader is running, and the queue gets a
  short head start before any samples go out.
- [`PipelineState::Streaming`] - samples are being delivered to the sink.
- [`PipelineState::Draining`] - the reader is stopped and joined, and an
  end-of-burst marker is sent.
- [`PipelineState::Stopped`] - everything has been released.

Cancellation is requested through a [`PlayerHandle`], which can be cloned and
handed to a signal handler or another thread.

Here's a program that plays a 16-bit file into a paced sink that throws the
samples away, stopping after ten seconds:

```no_run
use std::time::Duration;
use waverave_player::{
    DecodeConfig, Encoding, LogStats, PipelineConfig, Player, StreamSink, WireFormat,
};

fn main() -> Result<(), waverave_player::Error> {
    let config = PipelineConfig {
        decode: DecodeConfig::new(Encoding::Ci16, 0, 8192)?,
        ..PipelineConfig::default()
    };
    let player = Player::open("./capture.cs16", config)?;

    let handle = player.handle();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(10));
        handle.request_cancel();
    });

    let sink = StreamSink::new(std::io::sink(), WireFormat::Fc32, vec![0], 10e6)?;
    let summary = player.run(sink, LogStats)?;
    println!("Sent {} samples", summary.samples_sent);
    Ok(())
}
```

*/

#![warn(missing_docs)]

pub mod decode;
mod dispatch;
mod error;
mod player;
mod queue;
mod reader;
pub mod sink;

pub use crate::decode::{DecodeConfig, Encoding, SampleDecoder};
pub use crate::dispatch::{
    DEFAULT_STATS_INTERVAL, LogStats, StatsReport, StatsSink, StreamDispatcher, StreamStats,
};
pub use crate::error::Error;
pub use crate::player::{PipelineConfig, PipelineState, Player, PlayerHandle, RunSummary};
pub use crate::queue::{DEFAULT_MAX_BUFFERS, SampleQueue};
pub use crate::reader::{FileLoopReader, ReaderSummary};
pub use crate::sink::{StreamSink, TransmitSink, TxMetadata, WireFormat};

/// Complex 32-bit float sample, normalized to roughly `[-1.0, 1.0]`.
pub type Sample = num_complex::Complex<f32>;

/// A block of decoded samples on its way from the file to the sink.
///
/// Buffers are moved, never shared: the reader creates them, the queue holds
/// them, and the dispatcher consumes them. A buffer is normally full, but the
/// last one read before the file wraps around may be shorter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    /// Wrap a set of samples, declaring the buffer size they were read for.
    ///
    /// # Panics
    /// - If there are more samples than `capacity`.
    pub fn new(samples: Vec<Sample>, capacity: usize) -> Self {
        assert!(samples.len() <= capacity);
        Self { samples, capacity }
    }

    /// Size the buffer was read for, in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples in the buffer.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if there are no samples in the buffer.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns true if the buffer holds fewer samples than its capacity.
    pub fn is_short(&self) -> bool {
        self.samples.len() < self.capacity
    }

    /// Get the samples in the buffer.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Iterate over the samples in the buffer.
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Take the samples out of the buffer.
    pub fn into_vec(self) -> Vec<Sample> {
        self.samples
    }
}

impl From<Vec<Sample>> for SampleBuffer {
    fn from(samples: Vec<Sample>) -> Self {
        let capacity = samples.len();
        Self { samples, capacity }
    }
}
