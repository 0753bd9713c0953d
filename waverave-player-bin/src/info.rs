use clap::Args;
use color_eyre::eyre::{Context, eyre};
use waverave_player::Encoding;

/// Describe a sample file: size, sample count, and play time.
#[derive(Args, Debug)]
pub struct Cmd {
    /// Input file is 8-bit IQ. Default is 16-bit little-endian IQ.
    #[arg(long = "8bit")]
    eight_bit: bool,

    /// Sample rate in Hz, used to work out the play time of one loop.
    #[arg(short = 'r', long = "rate", default_value_t = 10e6)]
    sample_rate_hz: f64,

    /// Sample file to describe.
    filename: String,
}

impl Cmd {
    pub fn cmd(&self) -> color_eyre::Result<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(eyre!(
                "Sample rate must be positive, but got {}",
                self.sample_rate_hz
            ));
        }
        let size = std::fs::metadata(&self.filename)
            .wrap_err_with(|| format!("Couldn't read {}", self.filename))?
            .len();
        let encoding = if self.eight_bit {
            Encoding::Ci8
        } else {
            Encoding::Ci16
        };
        print!("{}", FileInfo::new(size, encoding, self.sample_rate_hz));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
struct FileInfo {
    size: u64,
    encoding: Encoding,
    samples: u64,
    trailing_bytes: u64,
    loop_secs: f64,
}

impl FileInfo {
    fn new(size: u64, encoding: Encoding, sample_rate_hz: f64) -> Self {
        let bytes_per_sample = encoding.bytes_per_sample() as u64;
        let samples = size / bytes_per_sample;
        Self {
            size,
            encoding,
            samples,
            trailing_bytes: size % bytes_per_sample,
            loop_secs: samples as f64 / sample_rate_hz,
        }
    }
}

impl std::fmt::Display for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "File size: {} ({} bytes)", format_size(self.size), self.size)?;
        writeln!(f, "Format: {}", self.encoding)?;
        writeln!(f, "Samples: {}", self.samples)?;
        if self.trailing_bytes > 0 {
            writeln!(
                f,
                "Trailing bytes: {} (not a whole sample, skipped on playback)",
                self.trailing_bytes
            )?;
        }
        writeln!(f, "Loop time: {:.3} s", self.loop_secs)
    }
}

/// Format a byte count with binary units.
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(15 << 20), "15.00 MB");
        assert_eq!(format_size(1 << 50), "1024.00 TB");
    }

    #[test]
    fn file_info() {
        let info = FileInfo::new(4_000_003, Encoding::Ci16, 1e6);
        assert_eq!(info.samples, 1_000_000);
        assert_eq!(info.trailing_bytes, 3);
        assert_eq!(info.loop_secs, 1.0);

        let info = FileInfo::new(30_000_000, Encoding::Ci8, 15e6);
        assert_eq!(info.samples, 15_000_000);
        assert_eq!(info.trailing_bytes, 0);
        assert_eq!(info.loop_secs, 1.0);
        assert!(!info.to_string().contains("Trailing"));
    }
}
