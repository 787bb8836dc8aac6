// src/runner/mod.rs
//! Protocol runner: drives one stimulation session end to end
//!
//! The session is a straight line: configure the AWG, start the mask and the
//! start marker, run the timing loop, then tear everything down. Teardown
//! always turns the output off and closes the instrument, in that order,
//! whether the loop completed, was interrupted, or failed.

pub mod session_log;

pub use session_log::SessionLog;

use crate::audio::{AudioMask, MaskPlayer};
use crate::config::constants::timing::*;
use crate::error::TusError;
use crate::hal::{
    Awg, AwgSession, DeviceSettings, DeviceType, HalError, MarkerCodes, TriggerPort,
};
use crate::protocol::StimulationProtocol;
use crate::utils::time::{MonotonicTimeProvider, TimeProvider};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cooperative stop request shared between the runner and whoever may
/// interrupt it (a signal handler, a test)
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Interrupted,
}

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub pulses: u64,
    pub outcome: SessionOutcome,
    pub elapsed: Duration,
    pub log_path: PathBuf,
}

enum LoopEnd {
    Completed,
    Interrupted,
}

pub struct ProtocolRunner<A: Awg> {
    protocol: StimulationProtocol,
    session: AwgSession<A>,
    log: SessionLog,
    clock: Arc<dyn TimeProvider>,
    stop: StopSignal,
    mask: Option<(Box<dyn MaskPlayer>, Arc<AudioMask>)>,
    trigger: Option<(Box<dyn TriggerPort>, MarkerCodes)>,
    origin: Duration,
    pulses: u64,
}

impl<A: Awg> ProtocolRunner<A> {
    pub fn new(protocol: StimulationProtocol, awg: A, log: SessionLog) -> Self {
        Self {
            protocol,
            session: AwgSession::open(awg),
            log,
            clock: Arc::new(MonotonicTimeProvider::new()),
            stop: StopSignal::new(),
            mask: None,
            trigger: None,
            origin: Duration::ZERO,
            pulses: 0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Loop `mask` through `player` for the duration of the session
    ///
    /// Ignored when the protocol has masking disabled.
    pub fn with_mask(mut self, player: Box<dyn MaskPlayer>, mask: Arc<AudioMask>) -> Self {
        self.mask = Some((player, mask));
        self
    }

    pub fn with_trigger(mut self, port: Box<dyn TriggerPort>, markers: MarkerCodes) -> Self {
        self.trigger = Some((port, markers));
        self
    }

    /// Handle that interrupts this runner when triggered
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run the session to completion or interruption
    pub fn run(mut self) -> Result<SessionReport, TusError> {
        self.origin = self.clock.now();
        let mode = match self.session.device_type() {
            DeviceType::Simulator => "mock",
            _ => "real",
        };
        info!(
            mode,
            prf_hz = self.protocol.prf_hz(),
            duty_cycle = self.protocol.duty_cycle(),
            duration_s = self.protocol.duration_s(),
            pulses = self.protocol.pulse_count(),
            "Session start"
        );
        self.record("session_start", mode);
        let open_event = if mode == "mock" { "awg_open_mock" } else { "awg_open" };
        let device = self.session.describe();
        self.record(open_event, &device);

        // A stop during connect or trigger settle skips the whole session
        if self.stop.is_triggered() {
            info!("Stop requested before configuration");
            self.record("interrupted", "stop requested before configuration");
            self.release();
            self.record("quit", "");
            if let Err(e) = self.log.flush() {
                warn!(error = %e, "Failed to flush session log");
            }
            return Ok(SessionReport {
                pulses: 0,
                outcome: SessionOutcome::Interrupted,
                elapsed: self.elapsed(),
                log_path: self.log.path().to_path_buf(),
            });
        }

        let settings = DeviceSettings::from_protocol(&self.protocol);
        if let Err(e) = self.session.configure(&settings) {
            warn!(error = %e, "AWG rejected configuration");
            self.record("error", &e.to_string());
            self.release();
            self.record("quit", "configuration failed");
            return Err(e.into());
        }
        let details = serde_json::to_string(&settings).unwrap_or_default();
        self.record("awg_configure", &details);

        self.start_mask();
        self.send_marker(|m| m.start, "start");

        let loop_result = self.timing_loop();

        let outcome = match &loop_result {
            Ok(LoopEnd::Completed) => SessionOutcome::Completed,
            Ok(LoopEnd::Interrupted) => {
                info!(pulses = self.pulses, "Session interrupted");
                self.record("interrupted", "stop requested");
                SessionOutcome::Interrupted
            }
            Err(e) => {
                warn!(error = %e, "Timing loop aborted");
                self.record("error", &e.to_string());
                SessionOutcome::Interrupted
            }
        };
        let pulses = self.pulses.to_string();
        self.record("burst_count", &pulses);

        let output_off = self.session.set_output(false);
        match &output_off {
            Ok(()) => self.record("awg_output_off", ""),
            Err(e) => warn!(error = %e, "Failed to turn AWG output off"),
        }
        self.stop_mask();
        self.send_marker(|m| m.stop, "stop");
        let closed = self.session.close();
        self.record("awg_close", &device);
        self.record("quit", "");
        if let Err(e) = self.log.flush() {
            warn!(error = %e, "Failed to flush session log");
        }

        loop_result?;
        output_off?;
        closed?;

        let elapsed = self.elapsed();
        info!(
            pulses = self.pulses,
            elapsed_s = elapsed.as_secs_f64(),
            log = %self.log.path().display(),
            "Session finished"
        );
        Ok(SessionReport {
            pulses: self.pulses,
            outcome,
            elapsed,
            log_path: self.log.path().to_path_buf(),
        })
    }

    fn timing_loop(&mut self) -> Result<LoopEnd, HalError> {
        let period_s = self.protocol.period_s();
        let width_s = self.protocol.pulse_width_s();
        let total = self.protocol.duration();
        let progress_every = Duration::from_secs_f64(
            (self.protocol.duration_s() / PROGRESS_REPORTS).max(MIN_PROGRESS_INTERVAL_S),
        );
        let mut next_progress = progress_every;

        for k in 0..self.protocol.pulse_count() {
            let on_at = Duration::from_secs_f64(k as f64 * period_s);
            if on_at >= total {
                break;
            }
            let off_at = Duration::from_secs_f64(k as f64 * period_s + width_s).min(total);

            if !self.wait_until(on_at, &mut next_progress, progress_every) {
                return Ok(LoopEnd::Interrupted);
            }
            self.session.set_output(true)?;
            self.pulses += 1;
            let tag = format!("#{}", k + 1);
            self.record("pulse_on", &tag);

            if !self.wait_until(off_at, &mut next_progress, progress_every) {
                return Ok(LoopEnd::Interrupted);
            }
            self.session.set_output(false)?;
            self.record("pulse_off", &tag);
        }

        // The session lasts its full duration even after the last burst
        if !self.wait_until(total, &mut next_progress, progress_every) {
            return Ok(LoopEnd::Interrupted);
        }
        Ok(LoopEnd::Completed)
    }

    /// Sleep in short slices until `deadline` after the session origin.
    /// Returns false if a stop was requested first.
    fn wait_until(
        &self,
        deadline: Duration,
        next_progress: &mut Duration,
        every: Duration,
    ) -> bool {
        let slice = Duration::from_millis(SLEEP_SLICE_MS);
        loop {
            if self.stop.is_triggered() {
                return false;
            }
            let now = self.elapsed();
            if now >= *next_progress {
                self.report_progress(now);
                *next_progress += every;
            }
            if now >= deadline {
                return true;
            }
            self.clock.sleep((deadline - now).min(slice));
        }
    }

    fn report_progress(&self, now: Duration) {
        let total = self.protocol.duration_s();
        let percent = (now.as_secs_f64() / total * 100.0).min(100.0);
        info!(
            elapsed_s = (now.as_secs_f64() * 10.0).round() / 10.0,
            total_s = total,
            percent = percent.round(),
            pulses = self.pulses,
            "Progress"
        );
    }

    fn start_mask(&mut self) {
        if !self.protocol.mask_enabled() {
            debug!("Masking disabled");
            return;
        }
        let Some((player, mask)) = self.mask.as_mut() else {
            return;
        };
        let result = player.start(Arc::clone(mask));
        let details = format!(
            "{:.1} s @ {} Hz",
            mask.duration().as_secs_f64(),
            mask.sample_rate()
        );
        match result {
            Ok(()) => self.record("mask_start", &details),
            Err(e) => {
                warn!(error = %e, "Mask playback failed; continuing without mask");
                self.record("mask_error", &e.to_string());
            }
        }
    }

    fn stop_mask(&mut self) {
        let Some((player, _)) = self.mask.as_mut() else {
            return;
        };
        if player.is_playing() {
            player.stop();
            self.record("mask_stop", "");
        }
    }

    fn send_marker(&mut self, pick: fn(&MarkerCodes) -> u8, label: &str) {
        let Some((port, markers)) = self.trigger.as_mut() else {
            return;
        };
        let code = pick(markers);
        let result = port.send(code);
        match result {
            Ok(()) => self.record("trigger", &format!("{label} code={code}")),
            Err(e) => {
                warn!(error = %e, code, "Trigger failed");
                self.record("trigger_error", &format!("{label}: {e}"));
            }
        }
    }

    /// Output off and close when the session never got going
    fn release(&mut self) {
        if let Err(e) = self.session.set_output(false) {
            debug!(error = %e, "Output off before close failed");
        }
        if let Err(e) = self.session.close() {
            warn!(error = %e, "Failed to close AWG");
        }
        let device = self.session.describe();
        self.record("awg_close", &device);
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.origin)
    }

    fn record(&mut self, event: &str, details: &str) {
        let elapsed = self.elapsed();
        if let Err(e) = self.log.event(elapsed, event, details) {
            warn!(error = %e, event, "Failed to write session log");
        }
    }
}
