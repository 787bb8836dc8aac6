//! TUS protocol runner
//!
//! Drives one stimulation session: configures the waveform generator, loops
//! the masking track, marks session start and stop on the EEG trigger line and
//! toggles the output at the protocol's PRF.
//!
//! # Usage
//!
//! ```bash
//! # Dry run against the simulated AWG with the default protocol
//! run-stimulus
//!
//! # Real instrument, 10 Hz PRF, 20 % duty, no masking
//! run-stimulus --real --awg 192.168.1.100:5025 --prf 10 --duty 0.2 --no-mask
//! ```
//!
//! Exit codes: 0 completed or interrupted, 2 invalid configuration,
//! 3 instrument unreachable, 1 any other failure.

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tus_stim::audio::{read_wav, AudioMask, MaskPlayer};
use tus_stim::hal::{Awg, AwgFactory, AwgTransport, BiosemiTrigger, MarkerCodes};
use tus_stim::runner::{ProtocolRunner, SessionLog, SessionOutcome, SessionReport, StopSignal};
use tus_stim::{ConfigLoader, LabConfig, StimulationProtocol, TusError, TusResult};

/// TUS stimulation protocol runner
#[derive(Parser, Debug)]
#[command(name = "run-stimulus")]
#[command(author, version, about = "Run a TUS stimulation session", long_about = None)]
struct Cli {
    /// Drive the real AWG instead of the simulator
    #[arg(long)]
    real: bool,

    /// Pulse repetition frequency in Hz [default: 5]
    #[arg(long)]
    prf: Option<f64>,

    /// Fraction of each period the output is on, in (0, 1] [default: 0.1]
    #[arg(long)]
    duty: Option<f64>,

    /// Output amplitude in mVpp [default: 250]
    #[arg(long)]
    vpp: Option<f64>,

    /// Carrier frequency in kHz [default: 265]
    #[arg(long)]
    freq: Option<f64>,

    /// Session length in seconds [default: 80]
    #[arg(long)]
    duration: Option<f64>,

    /// Disable the auditory mask
    #[arg(long)]
    no_mask: bool,

    /// Masking track (WAV)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Directory for session logs [default: out]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Configuration file layered over tus.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instrument address as host:port
    #[arg(long)]
    awg: Option<String>,

    /// Serial port of the EEG trigger interface
    #[arg(long)]
    trigger_port: Option<String>,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Command line flags win over every configuration layer
    fn apply(&self, config: &mut LabConfig) {
        let protocol = &mut config.protocol;
        if let Some(prf) = self.prf {
            protocol.prf_hz = prf;
        }
        if let Some(duty) = self.duty {
            protocol.duty_cycle = duty;
        }
        if let Some(vpp) = self.vpp {
            protocol.vpp_mv = vpp;
        }
        if let Some(freq) = self.freq {
            protocol.carrier_khz = freq;
        }
        if let Some(duration) = self.duration {
            protocol.duration_s = duration;
        }
        if self.no_mask {
            protocol.mask_enabled = false;
        }
        if let Some(dir) = &self.log_dir {
            config.paths.log_dir = dir.clone();
        }
        if let Some(address) = &self.awg {
            config.awg.transport = AwgTransport::Tcp {
                address: address.clone(),
            };
        }
        if let Some(port) = &self.trigger_port {
            config.trigger.port_name = Some(port.clone());
        }
    }
}

type LoggingError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn init_logging(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("failed to initialise logging: {e}");
    }
    info!("TUS runner v{}", tus_stim::VERSION);

    match run(cli).await {
        Ok(report) => {
            match report.outcome {
                SessionOutcome::Completed => info!(pulses = report.pulses, "Session completed"),
                SessionOutcome::Interrupted => warn!(pulses = report.pulses, "Session interrupted"),
            }
            info!(log = %report.log_path.display(), "Session log written");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> TusResult<SessionReport> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load()?;
    cli.apply(&mut config);

    let protocol = StimulationProtocol::new(config.protocol.clone())?;

    // A missing mask must stop us before any hardware is touched
    let mask = if protocol.mask_enabled() {
        let path = cli.mask.clone().unwrap_or_else(|| config.paths.mask_path());
        let mask = read_wav(&path)?;
        info!(path = %path.display(), seconds = mask.duration().as_secs_f64(), "Mask loaded");
        Some(Arc::new(mask))
    } else {
        None
    };

    let stop = StopSignal::new();
    let session_stop = stop.clone();
    let real = cli.real;
    let mut task = tokio::task::spawn_blocking(move || {
        run_session(config, protocol, mask, real, session_stop)
    });

    let finished = tokio::select! {
        joined = &mut task => Some(joined),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    warn!("Interrupt received; stopping session");
                    stop.trigger();
                }
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
            }
            None
        }
    };
    let joined = match finished {
        Some(joined) => joined,
        None => task.await,
    };

    joined.map_err(|e| TusError::Io(std::io::Error::other(e)))?
}

/// Blocking part of the session; owns every device handle
fn run_session(
    config: LabConfig,
    protocol: StimulationProtocol,
    mask: Option<Arc<AudioMask>>,
    real: bool,
    stop: StopSignal,
) -> TusResult<SessionReport> {
    let awg = AwgFactory::create(real, &config.awg)?;

    let header = json!({
        "protocol": protocol.params(),
        "pulse_width_s": protocol.pulse_width_s(),
        "pulses": protocol.pulse_count(),
        "mode": if real { "real" } else { "mock" },
        "awg": awg.describe(),
        "gating": config.awg.gating,
        "mask": mask.as_ref().map(|m| m.duration().as_secs_f64()),
    });
    let log = SessionLog::create(&config.paths.log_dir, &header)?;
    info!(path = %log.path().display(), "Session log opened");

    let mut runner = ProtocolRunner::new(protocol, awg, log).with_stop_signal(stop);

    if let Some(mask) = mask {
        runner = runner.with_mask(mask_player(), mask);
    }

    if config.trigger.port_name.is_some() {
        match BiosemiTrigger::open(&config.trigger) {
            Ok(trigger) => {
                runner = runner.with_trigger(Box::new(trigger), MarkerCodes::from(&config.trigger));
            }
            Err(e) => warn!(
                error = %e,
                "Trigger interface unavailable; continuing without markers"
            ),
        }
    }

    runner.run()
}

#[cfg(feature = "playback")]
fn mask_player() -> Box<dyn MaskPlayer> {
    Box::new(tus_stim::audio::CpalMaskPlayer::new())
}

#[cfg(not(feature = "playback"))]
fn mask_player() -> Box<dyn MaskPlayer> {
    warn!("Built without the playback feature; the mask will not be audible");
    Box::new(tus_stim::audio::SilentMaskPlayer::new())
}
