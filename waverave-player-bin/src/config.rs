use std::time::Duration;

use clap::Args;
use color_eyre::eyre::{Context, eyre};
use waverave_player::{DecodeConfig, Encoding, PipelineConfig};

/// Sample rate used for 16-bit files when none is given.
const DEFAULT_RATE_HZ: f64 = 10e6;

#[derive(Args, Debug)]
pub struct StreamParams {
    /// Input file is 8-bit IQ. Default is 16-bit little-endian IQ.
    #[arg(long = "8bit")]
    eight_bit: bool,

    /// Right shift (0-4 bits) applied to every sample, to reduce amplitude.
    #[arg(short, long, default_value_t = 0)]
    shift: u8,

    /// Sample rate in Hz. Required for 8-bit files, 16-bit files default to
    /// 10 MHz.
    #[arg(short, long = "rate")]
    rate_hz: Option<f64>,

    /// Samples per buffer. Clamped to the sink's maximum single send size.
    #[arg(short = 'S', long, default_value_t = 10_000)]
    spb: usize,

    /// Maximum number of buffers queued up between the file and the sink.
    #[arg(short, long, default_value_t = 32)]
    queue_depth: usize,

    /// Seconds between throughput reports.
    #[arg(long, default_value_t = 5.0)]
    stats_secs: f64,

    /// Milliseconds to spend filling the queue before transmitting.
    #[arg(long, default_value_t = 500)]
    warmup_ms: u64,
}

impl StreamParams {
    pub fn encoding(&self) -> Encoding {
        if self.eight_bit {
            Encoding::Ci8
        } else {
            Encoding::Ci16
        }
    }

    pub fn sample_rate_hz(&self) -> color_eyre::Result<f64> {
        let rate = match self.rate_hz {
            Some(rate) => rate,
            None if self.eight_bit => {
                return Err(eyre!("--rate is required for 8-bit files"));
            }
            None => DEFAULT_RATE_HZ,
        };
        if !(rate.is_finite() && rate > 0.0) {
            return Err(eyre!("Sample rate must be positive, but got {rate}"));
        }
        Ok(rate)
    }

    pub fn pipeline_config(&self) -> color_eyre::Result<PipelineConfig> {
        if self.shift > 4 {
            return Err(eyre!("shift valid range is 0-4, but got {}", self.shift));
        }
        if self.queue_depth == 0 {
            return Err(eyre!("queue depth must be at least 1"));
        }
        if !(self.stats_secs.is_finite() && self.stats_secs > 0.0) {
            return Err(eyre!("stats interval must be positive"));
        }
        let stats_interval = Duration::try_from_secs_f64(self.stats_secs)
            .wrap_err("stats interval out of range")?;
        let decode = DecodeConfig::new(self.encoding(), self.shift, self.spb)
            .wrap_err("Invalid decode settings")?;
        Ok(PipelineConfig {
            decode,
            max_buffers: self.queue_depth,
            warmup: Duration::from_millis(self.warmup_ms),
            stats_interval,
        })
    }
}
