use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::{Error, SampleBuffer, SampleQueue, TransmitSink, TxMetadata};

/// Default time between statistics reports.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

/// One periodic statistics record from a running pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsReport {
    /// Samples accepted by the sink per second, over the report interval.
    pub samples_per_sec: f64,
    /// Buffers waiting in the queue when the report was made.
    pub queue_depth: usize,
    /// Sends in this interval where the sink took fewer samples than offered.
    pub short_sends: u64,
    /// Samples in this interval that short sends left behind.
    pub samples_dropped: u64,
    /// Times in this interval the dispatcher found the queue empty and had to
    /// wait for the reader. Each one is an underrun risk.
    pub starved: u64,
    /// Length of the report interval.
    pub elapsed: Duration,
}

/// Somewhere to deliver [`StatsReport`]s.
pub trait StatsSink {
    /// Handle one report. Called from the dispatching thread, so this should
    /// return quickly.
    fn report(&mut self, report: &StatsReport);
}

/// Writes statistics reports to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogStats;

impl StatsSink for LogStats {
    fn report(&mut self, report: &StatsReport) {
        info!(
            "Throughput: {:.2} MS/s (buffers in queue: {}, short sends: {}, dropped: {}, starved: {})",
            report.samples_per_sec / 1e6,
            report.queue_depth,
            report.short_sends,
            report.samples_dropped,
            report.starved,
        );
    }
}

/// Forwards reports to another thread. Reports are dropped rather than
/// blocking if the channel is full.
impl StatsSink for crossbeam_channel::Sender<StatsReport> {
    fn report(&mut self, report: &StatsReport) {
        let _ = self.try_send(report.clone());
    }
}

/// Discards all reports.
impl StatsSink for () {
    fn report(&mut self, _report: &StatsReport) {}
}

impl<T: StatsSink + ?Sized> StatsSink for &mut T {
    fn report(&mut self, report: &StatsReport) {
        (**self).report(report)
    }
}

/// Sample counts accumulated since the last statistics report.
#[derive(Clone, Debug)]
pub struct StreamStats {
    samples: u64,
    short_sends: u64,
    dropped: u64,
    starved: u64,
    since: Instant,
}

impl StreamStats {
    /// Start a fresh accumulation period.
    pub fn new() -> Self {
        Self {
            samples: 0,
            short_sends: 0,
            dropped: 0,
            starved: 0,
            since: Instant::now(),
        }
    }

    /// Count samples accepted by the sink.
    pub fn record_sent(&mut self, count: usize) {
        self.samples += count as u64;
    }

    /// Count one short send that left `dropped` samples behind.
    pub fn record_short_send(&mut self, dropped: usize) {
        self.short_sends += 1;
        self.dropped += dropped as u64;
    }

    /// Count one wait on an empty queue.
    pub fn record_starved(&mut self) {
        self.starved += 1;
    }

    /// Samples accumulated so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Time since the accumulation period started.
    pub fn elapsed(&self) -> Duration {
        self.since.elapsed()
    }

    /// Finish the current period, returning its report and starting a new
    /// one.
    pub fn take_report(&mut self, queue_depth: usize) -> StatsReport {
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        let samples_per_sec = if secs > 0.0 {
            self.samples as f64 / secs
        } else {
            0.0
        };
        let report = StatsReport {
            samples_per_sec,
            queue_depth,
            short_sends: self.short_sends,
            samples_dropped: self.dropped,
            starved: self.starved,
            elapsed,
        };
        *self = Self::new();
        report
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The consumer side of a pipeline: drains the queue into a transmit sink,
/// in order, and keeps track of throughput.
///
/// Buffers larger than the sink's maximum single send are split up. When the
/// sink accepts fewer samples than it was offered, that's counted as one
/// short send, the samples it left behind are counted as dropped, and
/// playback moves on; the rest of that send is not retried. The
/// first send of a run opens a burst, but the dispatcher never closes it;
/// that's left to whoever owns the sink once dispatching is done.
pub struct StreamDispatcher<'a, S, T> {
    queue: &'a SampleQueue,
    sink: S,
    stats_sink: T,
    interval: Duration,
    stats: StreamStats,
    burst_started: bool,
    samples_sent: u64,
    buffers_sent: u64,
    short_sends: u64,
    samples_dropped: u64,
    starved: u64,
}

impl<'a, S: TransmitSink, T: StatsSink> StreamDispatcher<'a, S, T> {
    /// Set up a dispatcher that reports statistics every `interval`.
    pub fn new(queue: &'a SampleQueue, sink: S, stats_sink: T, interval: Duration) -> Self {
        Self {
            queue,
            sink,
            stats_sink,
            interval,
            stats: StreamStats::new(),
            burst_started: false,
            samples_sent: 0,
            buffers_sent: 0,
            short_sends: 0,
            samples_dropped: 0,
            starved: 0,
        }
    }

    /// Forward buffers until the queue is cancelled, or finished and empty.
    ///
    /// Only a sink error ends this early.
    pub fn run(&mut self) -> Result<(), Error> {
        self.stats = StreamStats::new();
        loop {
            let (buf, starved) = self.queue.pop_watched();
            let Some(buf) = buf else {
                break;
            };
            if starved {
                debug!("Sample queue ran dry, sink may underrun");
                self.stats.record_starved();
                self.starved += 1;
            }
            self.send_buffer(&buf)?;
            if self.stats.elapsed() >= self.interval {
                let report = self.stats.take_report(self.queue.len());
                self.stats_sink.report(&report);
            }
        }
        Ok(())
    }

    /// Send a single buffer to the sink.
    pub fn send_buffer(&mut self, buf: &SampleBuffer) -> Result<(), Error> {
        let max = self.sink.max_single_send_size().max(1);
        for chunk in buf.samples().chunks(max) {
            let md = if self.burst_started {
                TxMetadata::middle()
            } else {
                TxMetadata::start()
            };
            let sent = self.sink.send(chunk, md)?;
            self.burst_started = true;
            if sent < chunk.len() {
                let dropped = chunk.len() - sent;
                debug!("Sink took {} of {} samples", sent, chunk.len());
                self.stats.record_short_send(dropped);
                self.short_sends += 1;
                self.samples_dropped += dropped as u64;
            }
            self.stats.record_sent(sent);
            self.samples_sent += sent as u64;
        }
        self.buffers_sent += 1;
        Ok(())
    }

    /// Total samples accepted by the sink.
    pub fn samples_sent(&self) -> u64 {
        self.samples_sent
    }

    /// Total buffers forwarded.
    pub fn buffers_sent(&self) -> u64 {
        self.buffers_sent
    }

    /// Total short sends.
    pub fn short_sends(&self) -> u64 {
        self.short_sends
    }

    /// Total samples left behind by short sends.
    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped
    }

    /// Total waits on an empty queue.
    pub fn starved(&self) -> u64 {
        self.starved
    }

    /// Returns true once at least one send has gone to the sink.
    pub fn burst_started(&self) -> bool {
        self.burst_started
    }
}
