use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

use tracing::{debug, error, warn};

use crate::{DecodeConfig, Error, SampleBuffer, SampleDecoder, SampleQueue};

/// Read-ahead for the file, in bytes.
const FILE_BUFFER_SIZE: usize = 1 << 20;

/// How a [`FileLoopReader::run`] ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    /// Times the source wrapped around to the start.
    pub loops: u64,
    /// Read errors hit along the way, including ones that were recovered.
    pub read_errors: u64,
    /// The reader gave up on a read error instead of being stopped.
    pub failed: bool,
}

/// The producer side of a pipeline: turns a finite IQ file into an endless
/// stream of [`SampleBuffer`]s by rewinding to the start every time the end
/// is reached.
///
/// Each buffer is filled until it holds `samples_per_buffer` samples or the
/// source runs out. A buffer that hits the end of the file is handed out
/// short, and the next one starts over from offset 0. Reads that come back
/// short without reaching the end are simply continued, so a slow source
/// never causes a premature wrap.
pub struct FileLoopReader<R> {
    reader: R,
    decoder: SampleDecoder,
    capacity: usize,
    raw: Vec<u8>,
    at_start: bool,
    loops: u64,
    buffers: u64,
}

impl FileLoopReader<BufReader<File>> {
    /// Open a sample file for looped reading.
    pub fn open<P: AsRef<Path>>(path: P, config: &DecodeConfig) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file, config)
    }

    /// Wrap an already opened sample file.
    pub fn from_file(file: File, config: &DecodeConfig) -> Result<Self, Error> {
        Self::new(BufReader::with_capacity(FILE_BUFFER_SIZE, file), config)
    }
}

impl<R: Read + Seek> FileLoopReader<R> {
    /// Wrap any seekable byte source. Reading starts from offset 0.
    pub fn new(mut reader: R, config: &DecodeConfig) -> Result<Self, Error> {
        reader.rewind()?;
        let capacity = config.samples_per_buffer();
        Ok(Self {
            reader,
            decoder: config.decoder(),
            capacity,
            raw: vec![0; capacity * config.encoding().bytes_per_sample()],
            at_start: true,
            loops: 0,
            buffers: 0,
        })
    }

    /// Maximum number of samples per buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many times the source has been rewound after reaching its end.
    pub fn loops(&self) -> u64 {
        self.loops
    }

    /// How many buffers have been read so far.
    pub fn buffers_read(&self) -> u64 {
        self.buffers
    }

    /// Read the next buffer, wrapping around at the end of the source.
    ///
    /// Returns `None` if the source doesn't hold a single whole sample, as
    /// there's nothing to loop over.
    pub fn next_buffer(&mut self) -> Result<Option<SampleBuffer>, Error> {
        loop {
            let (filled, eof) = self.fill()?;
            let mut samples = Vec::with_capacity(self.capacity);
            self.decoder.decode_into(&self.raw[..filled], &mut samples);

            if samples.is_empty() {
                if self.at_start {
                    return Ok(None);
                }
                self.rewind()?;
                continue;
            }

            self.at_start = false;
            if eof {
                self.rewind()?;
            }
            self.buffers += 1;
            return Ok(Some(SampleBuffer::new(samples, self.capacity)));
        }
    }

    /// Feed buffers into the queue until it is cancelled, then mark it
    /// finished.
    ///
    /// A read error restarts the source from the beginning. A second error
    /// before any buffer gets through ends the loop early, which lets the
    /// dispatcher drain the queue and stop. The queue is marked finished even
    /// if this panics.
    pub fn run(mut self, queue: &SampleQueue) -> ReaderSummary {
        let _finish = FinishOnDrop(queue);
        let mut summary = ReaderSummary::default();
        let mut retrying = false;
        while !queue.is_cancelled() {
            match self.next_buffer() {
                Ok(Some(buf)) => {
                    retrying = false;
                    if !queue.push(buf) {
                        break;
                    }
                }
                Ok(None) => {
                    warn!("Sample file holds no whole samples, nothing to play");
                    break;
                }
                Err(e) => {
                    summary.read_errors += 1;
                    if retrying {
                        error!("Failed reading sample file again, giving up: {}", e);
                        summary.failed = true;
                        break;
                    }
                    warn!("Failed reading sample file, restarting from the beginning: {}", e);
                    retrying = true;
                    if let Err(e) = self.restart() {
                        error!("Couldn't rewind sample file: {}", e);
                        summary.failed = true;
                        break;
                    }
                }
            }
        }
        debug!(
            "File reader exiting after {} buffers and {} loops",
            self.buffers, self.loops
        );
        summary.loops = self.loops;
        summary
    }

    fn fill(&mut self) -> Result<(usize, bool), Error> {
        let mut filled = 0;
        while filled < self.raw.len() {
            match self.reader.read(&mut self.raw[filled..]) {
                Ok(0) => return Ok((filled, true)),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok((filled, false))
    }

    fn restart(&mut self) -> Result<(), Error> {
        self.reader.rewind()?;
        self.at_start = true;
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), Error> {
        self.reader.rewind()?;
        self.at_start = true;
        self.loops += 1;
        debug!("Reached end of sample file, restarting from the beginning");
        Ok(())
    }
}

struct FinishOnDrop<'a>(&'a SampleQueue);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}
