#![forbid(unsafe_code)]

//! Downloads the audio of recent uploads from a list of channels.
//!
//! Channels are given inline or through newline-delimited files. Only videos
//! uploaded after `--start-time`, or within `--since` of now, are considered;
//! optional duration bounds narrow the selection further. A JSON receipt of
//! everything handed to yt-dlp is written to `--receipt` or printed.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{ArgGroup, Parser};
use feedgrab_tools::{
    config::{DEFAULT_CONFIG_PATH, load_settings_from},
    downloader::{DownloadOptions, YtDlp},
    duration::{StartTime, parse_bound, parse_duration, parse_start_time},
    filter::build_filter,
    http::UreqClient,
    manifest::write_receipt,
    orchestrator::{self, RunRequest},
    resolver::load_channel_references,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Download audio from the latest uploads of a set of channels."
)]
#[command(group(
    ArgGroup::new("window")
        .args(["start_time", "since"])
        .required(true)
        .multiple(false)
))]
struct Cli {
    #[arg(
        short = 'T',
        long = "start-time",
        value_name = "DATETIME",
        value_parser = parse_start_time,
        help = "Only process videos uploaded on or after this ISO datetime (e.g. 2024-10-11T11:00:00)"
    )]
    start_time: Option<DateTime<Utc>>,
    #[arg(
        short = 'S',
        long = "since",
        value_name = "DURATION",
        value_parser = parse_duration,
        help = "Only process videos uploaded within this interval: hh:mm:ss, seconds, or ISO-8601 style (1h, 3d, PT30M)"
    )]
    since: Option<f64>,
    #[arg(
        long = "min-duration",
        value_name = "<hh:mm:ss or total seconds>",
        value_parser = parse_bound,
        help = "Only process videos at least this long"
    )]
    min_duration: Option<f64>,
    #[arg(
        long = "max-duration",
        value_name = "<hh:mm:ss or total seconds>",
        value_parser = parse_bound,
        help = "Do not process videos longer than this"
    )]
    max_duration: Option<f64>,
    #[arg(
        long = "channels",
        value_name = "FILE_OR_CHANNEL",
        required = true,
        num_args = 1..,
        help = "Files with newline-delimited channels, or channels given inline"
    )]
    channels: Vec<String>,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        help = "Directory for downloaded files (default from config, else ./videos)"
    )]
    output: Option<PathBuf>,
    #[arg(
        long = "receipt",
        value_name = "PATH",
        help = "Write the JSON receipt here instead of printing it"
    )]
    receipt: Option<PathBuf>,
    #[arg(
        long = "group-by-channel",
        help = "Place downloads in subdirectories named after their channel"
    )]
    group_by_channel: bool,
    #[arg(long = "verbose", help = "Log resolution and feed details")]
    verbose: bool,
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the config file")]
    config: PathBuf,
}

impl Cli {
    fn start(&self) -> Result<StartTime> {
        match (self.start_time, self.since) {
            (Some(instant), _) => Ok(StartTime::At(instant)),
            (None, Some(seconds)) => Ok(StartTime::Since(seconds)),
            (None, None) => bail!("either --start-time or --since is required"),
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = run(cli)?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Returns the downloader's exit code, or 0 when nothing was downloaded.
fn run(cli: Cli) -> Result<i32> {
    let settings = load_settings_from(&cli.config)?;
    let start = cli.start()?;
    let filter = build_filter(cli.min_duration, cli.max_duration);

    let channels = load_channel_references(&cli.channels)?;
    if channels.is_empty() {
        bail!("no channels to process");
    }

    let downloader = YtDlp::new(
        settings.ytdlp_path.clone(),
        DownloadOptions {
            output_dir: cli.output.clone().unwrap_or(settings.output_dir.clone()),
            group_by_channel: cli.group_by_channel,
            extra_args: settings.ytdlp_extra_args.clone(),
        },
    );
    downloader.ensure_available()?;

    let http = UreqClient::new(settings.http_timeout);
    let report = orchestrator::run(
        RunRequest {
            channels,
            start,
            filter,
            site_base_url: settings.site_base_url,
            feed_base_url: settings.feed_base_url,
        },
        &http,
        &downloader,
        Utc::now(),
    )?;

    if !report.resolution.unresolved.is_empty() {
        let names: Vec<&str> = report
            .resolution
            .unresolved
            .iter()
            .map(|unresolved| unresolved.reference.as_str())
            .collect();
        warn!("Unresolved channels: {}", names.join(", "));
    }

    match &cli.receipt {
        Some(target) => {
            let written = write_receipt(&report.manifest, target)?;
            info!("Receipt written to {}", written.display());
        }
        None => println!("{}", report.manifest.to_json_pretty()?),
    }

    Ok(report.exit_code.unwrap_or(0))
}
