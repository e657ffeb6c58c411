//! ReelForge Batch - offline analysis from the command line
//!
//! Usage:
//!   rf-batch hpss <input.wav> -o <dir>      - Split into harmonic/percussive/residual stems
//!   rf-batch slice <input.wav> -o <json>    - Onset frames as JSON
//!   rf-batch stats <input.wav> -o <json>    - Per-hop statistics as JSON
//!
//! Jobs run on a background worker and are polled for progress unless
//! `--sync` is given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use rf_core::{BufferAdaptor, ParamSet, SharedBuffer};
use rf_offline::clients::{HpssClient, OnsetSliceClient, StatsClient, feature_names as stats_feature_names};
use rf_offline::{JobScheduler, NrtClient, OfflineConfig, ProcessResult, load_wav, save_wav};

#[derive(Parser)]
#[command(name = "rf-batch", version, about = "ReelForge offline analysis")]
struct Cli {
    /// Run jobs on the calling thread instead of a background worker
    #[arg(long, global = true)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Region of the source to analyse; -1 means to the end
#[derive(Args, Debug, Clone, Copy)]
struct RangeArgs {
    #[arg(long, default_value_t = 0)]
    start_frame: i64,
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    num_frames: i64,
    #[arg(long, default_value_t = 0)]
    start_chan: i64,
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    num_chans: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Harmonic-percussive separation into three WAV stems
    Hpss {
        input: PathBuf,
        /// Directory for the stems
        #[arg(short, long)]
        output_dir: PathBuf,
        /// classic, coupled or advanced
        #[arg(long, default_value = "classic")]
        mode: String,
        #[arg(long, default_value_t = 17)]
        harm_filter: i64,
        #[arg(long, default_value_t = 31)]
        perc_filter: i64,
        #[arg(long, default_value_t = 1024)]
        window: i64,
        /// 16, 24 or 32 (float)
        #[arg(long, default_value_t = 24)]
        bit_depth: u16,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Onset slicing
    Slice {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Onset detection function
        #[arg(long, default_value = "spectral_flux")]
        metric: String,
        #[arg(long, default_value_t = 0.5)]
        threshold: f64,
        /// In hops
        #[arg(long, default_value_t = 2)]
        min_slice_length: i64,
        #[arg(long, default_value_t = 1024)]
        window: i64,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Per-hop statistics
    Stats {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        num_derivs: i64,
        #[arg(long, default_value_t = 512)]
        hop: i64,
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Serialize)]
struct SliceReport {
    source: PathBuf,
    sample_rate: f64,
    onsets: Vec<u64>,
}

#[derive(Serialize)]
struct StatsReport {
    source: PathBuf,
    /// Frames per second of the feature track
    control_rate: f64,
    features: Vec<String>,
    /// Output channel per (source channel, feature), value per hop
    channels: Vec<Vec<f64>>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = if cli.sync {
        OfflineConfig::blocking()
    } else {
        OfflineConfig::queued()
    };

    match cli.command {
        Commands::Hpss {
            input,
            output_dir,
            mode,
            harm_filter,
            perc_filter,
            window,
            bit_depth,
            range,
        } => {
            let source = load_source(&input)?;
            let sample_rate = source.read().sample_rate();
            let stems = ["harmonic", "percussive", "residual"].map(|name| (name, SharedBuffer::memory(1, 1, sample_rate)));

            run_job(HpssClient::batch(), config, |params| {
                bind_source(params, &source, range)?;
                for (name, buffer) in &stems {
                    params.set_buffer(name, Some(buffer.clone()))?;
                }
                params.set_choice_named("maskingMode", &mode)?;
                params.set_long("harmFilterSize", harm_filter)?;
                params.set_long("percFilterSize", perc_filter)?;
                params.set_long("windowSize", window)?;
                Ok(())
            })?;

            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
            for (name, buffer) in &stems {
                let path = output_dir.join(format!("{}_{}.wav", stem, name));
                save_wav(&*buffer.read(), &path, bit_depth)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("{}", path.display());
            }
        }
        Commands::Slice {
            input,
            output,
            metric,
            threshold,
            min_slice_length,
            window,
            range,
        } => {
            let source = load_source(&input)?;
            let indices = SharedBuffer::memory(1, 1, source.read().sample_rate());

            run_job(OnsetSliceClient::batch(), config, |params| {
                bind_source(params, &source, range)?;
                params.set_buffer("indices", Some(indices.clone()))?;
                params.set_choice_named("metric", &metric)?;
                params.set_float("threshold", threshold)?;
                params.set_long("minSliceLength", min_slice_length)?;
                params.set_long("windowSize", window)?;
                Ok(())
            })?;

            let indices = indices.read();
            let report = SliceReport {
                source: input.clone(),
                sample_rate: indices.sample_rate(),
                onsets: indices.channel(0)?.iter().map(|&frame| frame as u64).collect(),
            };
            log::info!("[rf-batch] {} onsets", report.onsets.len());
            write_json(&output, &report)?;
        }
        Commands::Stats {
            input,
            output,
            num_derivs,
            hop,
            range,
        } => {
            let source = load_source(&input)?;
            let stats = SharedBuffer::memory(1, 1, source.read().sample_rate());
            let features = stats_feature_names(num_derivs.clamp(0, 2) as usize);

            run_job(StatsClient::batch(), config, |params| {
                bind_source(params, &source, range)?;
                params.set_buffer("stats", Some(stats.clone()))?;
                params.set_long("numDerivs", num_derivs)?;
                params.set_long("hopSize", hop)?;
                Ok(())
            })?;

            let stats = stats.read();
            let channels = (0..stats.num_chans())
                .map(|ch| stats.channel(ch).map(<[f64]>::to_vec))
                .collect::<Result<Vec<_>, _>>()?;
            let report = StatsReport {
                source: input.clone(),
                control_rate: stats.sample_rate(),
                features,
                channels,
            };
            write_json(&output, &report)?;
        }
    }

    Ok(())
}

fn load_source(path: &Path) -> Result<SharedBuffer> {
    let buffer = load_wav(path).with_context(|| format!("Failed to load {}", path.display()))?;
    log::info!(
        "[rf-batch] {}: {} frames, {} channels, {} Hz",
        path.display(),
        buffer.num_frames(),
        buffer.num_chans(),
        buffer.sample_rate()
    );
    Ok(buffer.into_shared())
}

fn bind_source(params: &mut ParamSet, source: &SharedBuffer, range: RangeArgs) -> Result<()> {
    params.set_buffer("source", Some(source.clone()))?;
    params.set_long("startFrame", range.start_frame)?;
    params.set_long("numFrames", range.num_frames)?;
    params.set_long("startChan", range.start_chan)?;
    params.set_long("numChans", range.num_chans)?;
    Ok(())
}

/// Run one job through a scheduler, polling when it runs in the background
fn run_job<N, F>(client: N, config: OfflineConfig, configure: F) -> Result<ProcessResult>
where
    N: NrtClient,
    F: FnOnce(&mut ParamSet) -> Result<()>,
{
    let synchronous = config.synchronous;
    let mut scheduler = JobScheduler::new(client, config);
    let mut params = scheduler.default_params();
    configure(&mut params)?;

    scheduler.enqueue(&params)?;
    let mut result = scheduler.process();

    if !synchronous && result.is_ok() {
        result = loop {
            let update = scheduler.check_progress();
            if let Some(result) = update.result {
                break result;
            }
            log::info!("[rf-batch] {:.0}%", scheduler.progress() * 100.0);
            std::thread::sleep(Duration::from_millis(100));
        };
    }

    for message in result.messages() {
        log::warn!("[rf-batch] {}", message);
    }
    if !result.is_ok() {
        bail!("Job failed: {}", result);
    }
    Ok(result)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}
