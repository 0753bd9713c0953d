//! Transmit sinks: where decoded samples end up.
//!
//! A pipeline only needs two things from a sink: a blocking
//! [`send`][TransmitSink::send] that returns how many samples it took, and an
//! upper bound on how many it will take in one call. The sink's own blocking
//! sets the real-time pace of the whole pipeline.

use std::io::Write;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::{Error, Sample};

/// Default for the largest single send a [`StreamSink`] accepts, in samples.
pub const DEFAULT_MAX_SEND: usize = 1 << 17;

/// Burst markers that go along with each [`TransmitSink::send`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxMetadata {
    /// This is the first send of a burst.
    pub start_of_burst: bool,
    /// This is the last send of a burst. An empty send with this set flushes
    /// the sink.
    pub end_of_burst: bool,
}

impl TxMetadata {
    /// Metadata for the first send of a burst.
    pub const fn start() -> Self {
        Self {
            start_of_burst: true,
            end_of_burst: false,
        }
    }

    /// Metadata for a send in the middle of a burst.
    pub const fn middle() -> Self {
        Self {
            start_of_burst: false,
            end_of_burst: false,
        }
    }

    /// Metadata for the end-of-burst marker.
    pub const fn end() -> Self {
        Self {
            start_of_burst: false,
            end_of_burst: true,
        }
    }
}

/// A real-time destination for samples.
pub trait TransmitSink {
    /// Send a block of samples, blocking until the sink has taken them.
    /// Returns the number of samples actually accepted, which may be less
    /// than offered.
    ///
    /// Sending an empty slice with `end_of_burst` set must always be
    /// possible.
    fn send(&mut self, samples: &[Sample], md: TxMetadata) -> Result<usize, Error>;

    /// The most samples a single [`send`][TransmitSink::send] will accept.
    fn max_single_send_size(&self) -> usize;
}

impl<T: TransmitSink + ?Sized> TransmitSink for &mut T {
    fn send(&mut self, samples: &[Sample], md: TxMetadata) -> Result<usize, Error> {
        (**self).send(samples, md)
    }

    fn max_single_send_size(&self) -> usize {
        (**self).max_single_send_size()
    }
}

impl<T: TransmitSink + ?Sized> TransmitSink for Box<T> {
    fn send(&mut self, samples: &[Sample], md: TxMetadata) -> Result<usize, Error> {
        (**self).send(samples, md)
    }

    fn max_single_send_size(&self) -> usize {
        (**self).max_single_send_size()
    }
}

/// Sample format written out by a [`StreamSink`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// Complex signed 8-bit.
    Sc8,
    /// Complex signed 16-bit, little-endian.
    #[default]
    Sc16,
    /// Complex 32-bit float, native-endian.
    Fc32,
}

impl WireFormat {
    /// Size of one complex sample on the wire, in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Sc8 => 2,
            Self::Sc16 => 4,
            Self::Fc32 => 8,
        }
    }

    fn encode(self, s: Sample, out: &mut Vec<u8>) {
        match self {
            Self::Sc8 => {
                out.push(quantize(s.re, 127.0) as i8 as u8);
                out.push(quantize(s.im, 127.0) as i8 as u8);
            }
            Self::Sc16 => {
                out.extend_from_slice(&(quantize(s.re, 32767.0) as i16).to_le_bytes());
                out.extend_from_slice(&(quantize(s.im, 32767.0) as i16).to_le_bytes());
            }
            Self::Fc32 => {
                out.extend_from_slice(&s.re.to_ne_bytes());
                out.extend_from_slice(&s.im.to_ne_bytes());
            }
        }
    }
}

fn quantize(x: f32, full_scale: f32) -> f32 {
    (x * full_scale).round().clamp(-full_scale - 1.0, full_scale)
}

impl FromStr for WireFormat {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sc8" => Ok(Self::Sc8),
            "sc16" => Ok(Self::Sc16),
            "fc32" => Ok(Self::Fc32),
            _ => Err("Wire format must be one of sc8, sc16, or fc32"),
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sc8 => f.write_str("sc8"),
            Self::Sc16 => f.write_str("sc16"),
            Self::Fc32 => f.write_str("fc32"),
        }
    }
}

/// A software transmitter: writes samples to any [`Write`] in a chosen wire
/// format, and optionally blocks so that samples leave at the sample rate,
/// the same way a hardware transmitter would.
///
/// Every sample is written once per channel, so a frame holds one IQ pair
/// for each channel in the channel set.
pub struct StreamSink<W> {
    writer: W,
    wire: WireFormat,
    channels: Vec<usize>,
    sample_rate_hz: f64,
    max_send: usize,
    paced: bool,
    pace: Option<Pace>,
    scratch: Vec<u8>,
}

struct Pace {
    start: Instant,
    sent: u64,
}

impl<W: Write> StreamSink<W> {
    /// Create a paced sink writing the given channel set at `sample_rate_hz`.
    pub fn new(
        writer: W,
        wire: WireFormat,
        channels: Vec<usize>,
        sample_rate_hz: f64,
    ) -> Result<Self, Error> {
        if channels.is_empty() {
            return Err(Error::InvalidParameter("at least one channel is required"));
        }
        let mut sorted = channels.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != channels.len() {
            return Err(Error::InvalidParameter("channels must not repeat"));
        }
        if !(sample_rate_hz.is_finite() && sample_rate_hz >= 1.0) {
            return Err(Error::InvalidParameter("sample rate must be at least 1 Hz"));
        }
        Ok(Self {
            writer,
            wire,
            channels,
            sample_rate_hz,
            max_send: DEFAULT_MAX_SEND,
            paced: true,
            pace: None,
            scratch: Vec::new(),
        })
    }

    /// Limit how many samples a single send accepts. Values of 0 are treated
    /// as 1.
    pub fn with_max_send_size(mut self, max_send: usize) -> Self {
        self.max_send = max_send.max(1);
        self
    }

    /// Turn sample-rate pacing on or off.
    pub fn with_pacing(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// The channel set samples are written for.
    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    /// The wire format.
    pub fn wire_format(&self) -> WireFormat {
        self.wire
    }

    /// Get the underlying writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_samples(&mut self, samples: &[Sample]) -> Result<(), Error> {
        if self.wire == WireFormat::Fc32 && self.channels.len() == 1 {
            self.writer.write_all(bytemuck::cast_slice(samples))?;
            return Ok(());
        }
        self.scratch.clear();
        self.scratch
            .reserve(samples.len() * self.channels.len() * self.wire.bytes_per_sample());
        for &s in samples {
            for _ in 0..self.channels.len() {
                self.wire.encode(s, &mut self.scratch);
            }
        }
        self.writer.write_all(&self.scratch)?;
        Ok(())
    }

    fn wait_for_pace(&mut self, count: usize) {
        if !self.paced {
            return;
        }
        let pace = self.pace.get_or_insert_with(|| Pace {
            start: Instant::now(),
            sent: 0,
        });
        pace.sent += count as u64;
        let due = pace.start + Duration::from_secs_f64(pace.sent as f64 / self.sample_rate_hz);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}

impl<W: Write> TransmitSink for StreamSink<W> {
    fn send(&mut self, samples: &[Sample], md: TxMetadata) -> Result<usize, Error> {
        if md.start_of_burst {
            self.pace = None;
        }
        let count = samples.len().min(self.max_send);
        if count > 0 {
            self.write_samples(&samples[..count])?;
            self.wait_for_pace(count);
        }
        if md.end_of_burst {
            self.writer.flush()?;
            self.pace = None;
        }
        Ok(count)
    }

    fn max_single_send_size(&self) -> usize {
        self.max_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(wire: WireFormat, channels: Vec<usize>) -> StreamSink<Vec<u8>> {
        StreamSink::new(Vec::new(), wire, channels, 1e6)
            .unwrap()
            .with_pacing(false)
    }

    #[test]
    fn sc16_output() {
        let mut s = sink(WireFormat::Sc16, vec![0]);
        let n = s
            .send(&[Sample::new(0.5, -1.0), Sample::new(2.0, 0.0)], TxMetadata::start())
            .unwrap();
        assert_eq!(n, 2);
        let out = s.into_inner();
        let words: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(words, [16384, -32767, 32767, 0]);
    }

    #[test]
    fn sc8_output_per_channel() {
        let mut s = sink(WireFormat::Sc8, vec![0, 1]);
        s.send(&[Sample::new(-1.0, 0.25)], TxMetadata::middle())
            .unwrap();
        let out: Vec<i8> = s.into_inner().into_iter().map(|b| b as i8).collect();
        assert_eq!(out, [-127, 32, -127, 32]);
    }

    #[test]
    fn fc32_output() {
        let samples = [Sample::new(0.125, -0.5), Sample::new(1.0, 0.0)];
        let mut single = sink(WireFormat::Fc32, vec![3]);
        single.send(&samples, TxMetadata::middle()).unwrap();
        let single = single.into_inner();
        assert_eq!(single.len(), 16);
        assert_eq!(&single[0..4], &0.125f32.to_ne_bytes());
        assert_eq!(&single[4..8], &(-0.5f32).to_ne_bytes());

        let mut dual = sink(WireFormat::Fc32, vec![0, 1]);
        dual.send(&samples, TxMetadata::middle()).unwrap();
        let dual = dual.into_inner();
        assert_eq!(dual.len(), 32);
        assert_eq!(&dual[0..8], &single[0..8]);
        assert_eq!(&dual[8..16], &single[0..8]);
    }

    #[test]
    fn caps_single_send() {
        let mut s = sink(WireFormat::Sc8, vec![0]).with_max_send_size(3);
        assert_eq!(s.max_single_send_size(), 3);
        let n = s
            .send(&[Sample::default(); 5], TxMetadata::middle())
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(s.into_inner().len(), 6);
    }

    #[test]
    fn end_of_burst_marker() {
        let mut s = sink(WireFormat::Sc16, vec![0]);
        assert_eq!(s.send(&[], TxMetadata::end()).unwrap(), 0);
        assert!(s.into_inner().is_empty());
    }

    #[test]
    fn paced_send_takes_real_time() {
        let mut s = StreamSink::new(std::io::sink(), WireFormat::Sc16, vec![0], 10_000.0).unwrap();
        let start = Instant::now();
        s.send(&[Sample::default(); 500], TxMetadata::start())
            .unwrap();
        s.send(&[Sample::default(); 500], TxMetadata::middle())
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn rejects_bad_setup() {
        assert!(StreamSink::new(Vec::new(), WireFormat::Sc8, vec![], 1e6).is_err());
        assert!(StreamSink::new(Vec::new(), WireFormat::Sc8, vec![0, 0], 1e6).is_err());
        assert!(StreamSink::new(Vec::new(), WireFormat::Sc8, vec![0], 0.0).is_err());
        assert!(StreamSink::new(Vec::new(), WireFormat::Sc8, vec![0], f64::NAN).is_err());
        assert!(StreamSink::new(Vec::new(), WireFormat::Sc8, vec![0], 1e-300).is_err());
    }

    #[test]
    fn wire_format_names() {
        for w in [WireFormat::Sc8, WireFormat::Sc16, WireFormat::Fc32] {
            assert_eq!(w.to_string().parse::<WireFormat>().unwrap(), w);
        }
        assert!("cs8".parse::<WireFormat>().is_err());
    }
}
