use std::fs::File;
use std::io::{BufWriter, Write};

use clap::Args;
use color_eyre::eyre::{Context, eyre};
use tracing::info;
use waverave_player::{LogStats, Player, StreamSink, WireFormat};

/// Play a sample file on repeat until told to stop.
#[derive(Args, Debug)]
pub struct Cmd {
    #[command(flatten)]
    params: crate::config::StreamParams,

    /// Wire format to write: sc8, sc16, or fc32.
    #[arg(short, long, default_value_t = WireFormat::Sc16)]
    wirefmt: WireFormat,

    /// Comma-separated channel list. Each sample is written once per channel.
    #[arg(short, long, value_delimiter = ',', default_value = "0")]
    channels: Vec<usize>,

    /// Largest number of samples the sink takes in one send.
    #[arg(short = 'M', long, default_value_t = 1 << 17)]
    max_send: usize,

    /// Where to write the samples; `-` for stdout. Omit to discard them while
    /// still pacing at the sample rate.
    #[arg(short, long)]
    output: Option<String>,

    /// Sample file to play.
    filename: String,
}

impl Cmd {
    pub async fn cmd(&self) -> color_eyre::Result<()> {
        let config = self.params.pipeline_config()?;
        let rate_hz = self.params.sample_rate_hz()?;

        let player = Player::open(&self.filename, config).wrap_err("Couldn't open sample file")?;
        let size = player
            .file_size()
            .wrap_err("Couldn't get the sample file size")?;
        info!("File: {} ({})", self.filename, crate::info::format_size(size));
        info!("Format: {}", config.decode.encoding());
        info!("Sample rate: {} MS/s", rate_hz / 1e6);

        let writer: Box<dyn Write + Send> = match self.output.as_deref() {
            None => Box::new(std::io::sink()),
            Some("-") => Box::new(BufWriter::new(std::io::stdout())),
            Some(path) => Box::new(BufWriter::new(
                File::create(path).wrap_err_with(|| format!("Couldn't create {path}"))?,
            )),
        };
        let sink = StreamSink::new(writer, self.wirefmt, self.channels.clone(), rate_hz)
            .wrap_err("Invalid output settings")?
            .with_max_send_size(self.max_send);

        // Playback blocks, so it gets its own thread. The async side only
        // waits for it to end, or for the OS to tell us to quit.
        let handle = player.handle();
        let mut playback = tokio::task::spawn_blocking(move || player.run(sink, LogStats));
        let quit = crate::os_signal::quit_watch().await;
        let result = tokio::select! {
            res = &mut playback => res,
            _ = quit.quit() => {
                handle.request_cancel();
                playback.await
            }
        };

        let summary = result
            .wrap_err("Playback thread failed")?
            .wrap_err("Playback failed")?;
        info!(
            "Transmission complete: {} samples, {} loops, {} short sends ({} samples dropped), {} underrun risks",
            summary.samples_sent,
            summary.loops,
            summary.short_sends,
            summary.samples_dropped,
            summary.starved
        );
        if summary.reader_failed {
            return Err(eyre!(
                "Playback ended early after {} read errors",
                summary.read_errors
            ));
        }
        Ok(())
    }
}
