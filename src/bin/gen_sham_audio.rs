//! Sham audio generator
//!
//! # Usage
//!
//! ```bash
//! # Gated square-wave mask matching a 5 Hz / 10 % protocol
//! gen-sham-audio gated --prf 5 --duty 0.1 --duration 80
//!
//! # Batch of pulse-train replicas between 1 and 2 kHz
//! gen-sham-audio replica --n-files 20 --freq-min 1000 --freq-max 2000
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tus_stim::audio::{generate_replica_batch, write_wav, ReplicaParams};
use tus_stim::{ConfigLoader, ShamAudioGenerator, ShamParams};

/// Sham audio generator
#[derive(Parser, Debug)]
#[command(name = "gen-sham-audio")]
#[command(
    author,
    version,
    about = "Generate sham audio WAV files with square-wave pulses and noise",
    long_about = None
)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file layered over tus.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// One gated track: tone during each burst, noise floor between bursts
    Gated {
        /// Pulse repetition frequency (Hz)
        #[arg(long)]
        prf: Option<f64>,

        /// Fraction of each period carrying the tone, in [0, 1]
        #[arg(long)]
        duty: Option<f64>,

        /// Track length (s)
        #[arg(long)]
        duration: Option<f64>,

        /// Sample rate (Hz)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Square-wave tone frequency (Hz)
        #[arg(long)]
        tone_hz: Option<f64>,

        /// Noise seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output WAV path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Batch of pulse-train replicas spread over a carrier frequency range
    Replica {
        /// Directory where WAV files will be written
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Number of WAV files to generate
        #[arg(long)]
        n_files: Option<usize>,

        /// Minimum carrier frequency (Hz)
        #[arg(long)]
        freq_min: Option<f64>,

        /// Maximum carrier frequency (Hz)
        #[arg(long)]
        freq_max: Option<f64>,

        /// Pulse duration (s)
        #[arg(long)]
        pulse_duration: Option<f64>,

        /// Total pulses per file
        #[arg(long)]
        total_pulses: Option<usize>,

        /// Sample rate (Hz)
        #[arg(long)]
        fs: Option<u32>,

        /// Total duration per file (s)
        #[arg(long)]
        total_duration: Option<f64>,

        /// Extra per-pulse jitter (ms)
        #[arg(long)]
        jitter_ms: Option<f64>,

        /// Signal-to-noise ratio
        #[arg(long)]
        snr_ratio: Option<f64>,

        /// Base seed; file i uses seed + i
        #[arg(long)]
        seed: Option<u64>,
    },
}

type LoggingError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn init_logging(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("failed to initialise logging: {e}");
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let config = loader.load().context("loading configuration")?;

    match cli.command {
        Commands::Gated {
            prf,
            duty,
            duration,
            sample_rate,
            tone_hz,
            seed,
            output,
        } => {
            let defaults = config.sham;
            let params = ShamParams {
                prf_hz: prf.unwrap_or(defaults.prf_hz),
                duty_cycle: duty.unwrap_or(defaults.duty_cycle),
                duration_s: duration.unwrap_or(defaults.duration_s),
                sample_rate: sample_rate.unwrap_or(defaults.sample_rate),
                tone_hz: tone_hz.unwrap_or(defaults.tone_hz),
                seed: seed.unwrap_or(defaults.seed),
                ..defaults
            };
            let output = output.unwrap_or_else(|| {
                config.paths.assets_dir.join(format!(
                    "sham_gated_{}Hz_duty{}.wav",
                    params.prf_hz,
                    (params.duty_cycle * 100.0).round()
                ))
            });

            let mask = ShamAudioGenerator::new(params)?.generate()?;
            write_wav(&mask, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(
                path = %output.display(),
                seconds = mask.duration().as_secs_f64(),
                "Written"
            );
        }
        Commands::Replica {
            output_dir,
            n_files,
            freq_min,
            freq_max,
            pulse_duration,
            total_pulses,
            fs,
            total_duration,
            jitter_ms,
            snr_ratio,
            seed,
        } => {
            let defaults = config.replica;
            let params = ReplicaParams {
                n_files: n_files.unwrap_or(defaults.n_files),
                freq_min_hz: freq_min.unwrap_or(defaults.freq_min_hz),
                freq_max_hz: freq_max.unwrap_or(defaults.freq_max_hz),
                pulse_duration_s: pulse_duration.unwrap_or(defaults.pulse_duration_s),
                total_pulses: total_pulses.unwrap_or(defaults.total_pulses),
                sample_rate: fs.unwrap_or(defaults.sample_rate),
                total_duration_s: total_duration.unwrap_or(defaults.total_duration_s),
                jitter_ms: jitter_ms.unwrap_or(defaults.jitter_ms),
                snr_ratio: snr_ratio.unwrap_or(defaults.snr_ratio),
                seed: seed.unwrap_or(defaults.seed),
            };
            let output_dir = output_dir.unwrap_or(config.paths.assets_dir);

            let written = generate_replica_batch(&params, &output_dir)
                .with_context(|| format!("generating replicas in {}", output_dir.display()))?;
            info!(files = written.len(), dir = %output_dir.display(), "Replica batch complete");
        }
    }

    Ok(())
}
