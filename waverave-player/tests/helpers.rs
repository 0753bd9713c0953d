//! Shared test utilities: synthetic IQ files and recording sinks.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use waverave_player::{Error, PlayerHandle, Sample, TransmitSink, TxMetadata};

/// A sample file in the temp directory, removed when dropped.
pub struct TempIq(PathBuf);

impl TempIq {
    pub fn new(name: &str, bytes: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!(
            "waverave-player-it-{}-{}.iq",
            name,
            std::process::id()
        ));
        std::fs::write(&path, bytes).expect("Failed to write test file");
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempIq {
    fn drop(&mut self) {
        std::fs::remove_file(&self.0).ok();
    }
}

/// Interleaved little-endian 16-bit IQ pairs.
pub fn ci16_bytes(pairs: &[(i16, i16)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pairs.len() * 4);
    for (i, q) in pairs {
        out.extend_from_slice(&i.to_le_bytes());
        out.extend_from_slice(&q.to_le_bytes());
    }
    out
}

/// Interleaved 8-bit IQ pairs.
pub fn ci8_bytes(pairs: &[(i8, i8)]) -> Vec<u8> {
    pairs
        .iter()
        .flat_map(|(i, q)| [*i as u8, *q as u8])
        .collect()
}

/// A ramp of `count` samples, each with a distinct I value.
pub fn ramp_ci16(count: usize) -> Vec<(i16, i16)> {
    (0..count)
        .map(|n| ((n as i16 + 1) * 100, -(n as i16) * 50))
        .collect()
}

/// One call made to a [`RecordingSink`].
#[derive(Clone, Debug)]
pub struct Call {
    pub samples: Vec<Sample>,
    pub md: TxMetadata,
}

/// Records every send. Can cancel its pipeline after a number of data
/// sends, sleep on each send, accept only part of each send, or fail.
pub struct RecordingSink {
    pub calls: Vec<Call>,
    pub max_send: usize,
    pub accept: Option<usize>,
    pub delay: Duration,
    pub fail_after: Option<usize>,
    pub cancel_after: Option<(usize, PlayerHandle)>,
}

impl RecordingSink {
    pub fn new(max_send: usize) -> Self {
        Self {
            calls: Vec::new(),
            max_send,
            accept: None,
            delay: Duration::ZERO,
            fail_after: None,
            cancel_after: None,
        }
    }

    pub fn cancel_after(mut self, sends: usize, handle: PlayerHandle) -> Self {
        self.cancel_after = Some((sends, handle));
        self
    }

    pub fn data_calls(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter().filter(|c| !c.md.end_of_burst)
    }

    pub fn end_markers(&self) -> usize {
        self.calls.iter().filter(|c| c.md.end_of_burst).count()
    }

    pub fn sent_samples(&self) -> Vec<Sample> {
        self.data_calls()
            .flat_map(|c| c.samples.iter().copied())
            .collect()
    }
}

impl TransmitSink for RecordingSink {
    fn send(&mut self, samples: &[Sample], md: TxMetadata) -> Result<usize, Error> {
        if !md.end_of_burst {
            if let Some(fail) = self.fail_after {
                if self.data_calls().count() >= fail {
                    return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
                }
            }
        }
        std::thread::sleep(self.delay);
        let accepted = self.accept.map_or(samples.len(), |a| a.min(samples.len()));
        self.calls.push(Call {
            samples: samples[..accepted].to_vec(),
            md,
        });
        if !md.end_of_burst {
            if let Some((after, handle)) = &self.cancel_after {
                if self.data_calls().count() >= *after {
                    handle.request_cancel();
                }
            }
        }
        Ok(accepted)
    }

    fn max_single_send_size(&self) -> usize {
        self.max_send
    }
}
