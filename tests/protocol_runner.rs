// tests/protocol_runner.rs
//! End-to-end sessions against the simulated AWG on a virtual clock

use parking_lot::Mutex;
use serde_json::json;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tus_stim::audio::{AudioMask, AudioResult, MaskPlayer};
use tus_stim::hal::simulator::{CallJournal, SimulatedAwg};
use tus_stim::hal::{
    Awg, AwgCall, BiosemiTrigger, DeviceSettings, DeviceType, HalError, HalResult, MarkerCodes,
};
use tus_stim::protocol::{ProtocolParams, StimulationProtocol};
use tus_stim::runner::{ProtocolRunner, SessionLog, SessionOutcome, StopSignal};
use tus_stim::utils::time::{MockTimeProvider, TimeProvider};
use tus_stim::TusError;

fn protocol(duration_s: f64, mask_enabled: bool) -> StimulationProtocol {
    StimulationProtocol::new(ProtocolParams {
        prf_hz: 5.0,
        duty_cycle: 0.1,
        duration_s,
        mask_enabled,
        ..ProtocolParams::default()
    })
    .unwrap()
}

fn open_log(dir: &std::path::Path) -> SessionLog {
    SessionLog::create(dir, &json!({"test": true})).unwrap()
}

/// Event names in log order, header skipped
fn events(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(3)
        .map(|line| line.split('\t').nth(1).unwrap_or_default().to_string())
        .collect()
}

/// Virtual clock that requests a stop once time passes `at`
struct InterruptingClock {
    inner: MockTimeProvider,
    stop: StopSignal,
    at: Duration,
}

impl TimeProvider for InterruptingClock {
    fn now_nanos(&self) -> u64 {
        self.inner.now_nanos()
    }

    fn sleep(&self, duration: Duration) {
        self.inner.sleep(duration);
        if self.inner.now() >= self.at {
            self.stop.trigger();
        }
    }
}

#[test]
fn test_two_second_mock_session_emits_ten_pulses() {
    let dir = tempfile::tempdir().unwrap();
    let awg = SimulatedAwg::with_default_config();
    let journal = awg.journal();

    let report = ProtocolRunner::new(protocol(2.0, false), awg, open_log(dir.path()))
        .with_clock(Arc::new(MockTimeProvider::new(0)))
        .run()
        .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.pulses, 10);
    assert_eq!(journal.output_on_count(), 10);

    let events = events(&report.log_path);
    assert_eq!(events.iter().filter(|e| *e == "pulse_on").count(), 10);
    assert_eq!(events.iter().filter(|e| *e == "pulse_off").count(), 10);
    assert_eq!(events.first().map(String::as_str), Some("session_start"));
    assert_eq!(events.last().map(String::as_str), Some("quit"));
    assert!(events.contains(&"awg_open_mock".to_string()));
    assert!(events.contains(&"burst_count".to_string()));

    let calls = journal.snapshot();
    assert!(matches!(calls[0], AwgCall::Configure(_)));
    assert_eq!(&calls[calls.len() - 2..], &[AwgCall::SetOutput(false), AwgCall::Close]);
}

#[test]
fn test_pulse_edges_follow_the_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let report = ProtocolRunner::new(
        protocol(1.0, false),
        SimulatedAwg::with_default_config(),
        open_log(dir.path()),
    )
    .with_clock(Arc::new(MockTimeProvider::new(0)))
    .run()
    .unwrap();

    let content = std::fs::read_to_string(&report.log_path).unwrap();
    let edges: Vec<(f64, &str)> = content
        .lines()
        .skip(3)
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let t: f64 = cols.next()?.parse().ok()?;
            let event = cols.next()?;
            matches!(event, "pulse_on" | "pulse_off").then_some((t, event))
        })
        .collect();

    assert_eq!(edges.len(), 10);
    for (k, pair) in edges.chunks(2).enumerate() {
        let onset = k as f64 * 0.2;
        assert_eq!(pair[0].1, "pulse_on");
        assert_eq!(pair[1].1, "pulse_off");
        assert!((pair[0].0 - onset).abs() < 0.002, "onset {} at {}", k, pair[0].0);
        assert!((pair[1].0 - (onset + 0.02)).abs() < 0.002, "offset {} at {}", k, pair[1].0);
    }
}

#[test]
fn test_interrupt_mid_burst_turns_output_off_before_close() {
    let dir = tempfile::tempdir().unwrap();
    let awg = SimulatedAwg::with_default_config();
    let journal = awg.journal();
    let stop = StopSignal::new();
    let clock = InterruptingClock {
        inner: MockTimeProvider::new(0),
        stop: stop.clone(),
        // Inside the third burst (0.40 s .. 0.42 s)
        at: Duration::from_millis(410),
    };

    let report = ProtocolRunner::new(protocol(5.0, false), awg, open_log(dir.path()))
        .with_clock(Arc::new(clock))
        .with_stop_signal(stop)
        .run()
        .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Interrupted);
    assert_eq!(report.pulses, 3);
    assert!(report.elapsed < Duration::from_millis(420));

    let calls = journal.snapshot();
    let n = calls.len();
    assert_eq!(calls[n - 3], AwgCall::SetOutput(true));
    assert_eq!(&calls[n - 2..], &[AwgCall::SetOutput(false), AwgCall::Close]);

    let events = events(&report.log_path);
    assert!(events.contains(&"interrupted".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("quit"));
}

#[test]
fn test_rejected_configuration_aborts_before_timing_loop() {
    let dir = tempfile::tempdir().unwrap();
    let awg = SimulatedAwg::with_default_config();
    let journal = awg.journal();
    let protocol = StimulationProtocol::new(ProtocolParams {
        // 20 Vpp is beyond the generator's 10 Vpp ceiling
        vpp_mv: 20_000.0,
        duration_s: 1.0,
        mask_enabled: false,
        ..ProtocolParams::default()
    })
    .unwrap();

    let err = ProtocolRunner::new(protocol, awg, open_log(dir.path()))
        .with_clock(Arc::new(MockTimeProvider::new(0)))
        .run()
        .unwrap_err();

    assert!(matches!(err, TusError::Hal(HalError::Configuration(_))));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(journal.output_on_count(), 0);
    assert_eq!(journal.snapshot().last(), Some(&AwgCall::Close));

    let log = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap().path();
    let events = events(&log);
    assert!(events.contains(&"error".to_string()));
    assert!(!events.contains(&"pulse_on".to_string()));
}

/// Simulator whose output switch fails after a number of bursts
struct FlakyAwg {
    inner: SimulatedAwg,
    bursts_left: u32,
}

impl Awg for FlakyAwg {
    fn configure(&mut self, settings: &DeviceSettings) -> HalResult<()> {
        self.inner.configure(settings)
    }

    fn set_output(&mut self, on: bool) -> HalResult<()> {
        if on {
            if self.bursts_left == 0 {
                return Err(HalError::Protocol("instrument stopped responding".to_string()));
            }
            self.bursts_left -= 1;
        }
        self.inner.set_output(on)
    }

    fn close(&mut self) -> HalResult<()> {
        self.inner.close()
    }

    fn device_type(&self) -> DeviceType {
        self.inner.device_type()
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

#[test]
fn test_device_failure_mid_session_still_releases_awg() {
    let dir = tempfile::tempdir().unwrap();
    let inner = SimulatedAwg::with_default_config();
    let journal = inner.journal();
    let awg = FlakyAwg {
        inner,
        bursts_left: 2,
    };

    let err = ProtocolRunner::new(protocol(2.0, false), awg, open_log(dir.path()))
        .with_clock(Arc::new(MockTimeProvider::new(0)))
        .run()
        .unwrap_err();

    assert!(matches!(err, TusError::Hal(HalError::Protocol(_))));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(journal.output_on_count(), 2);
    let calls = journal.snapshot();
    assert_eq!(&calls[calls.len() - 2..], &[AwgCall::SetOutput(false), AwgCall::Close]);
}

#[derive(Clone, Default)]
struct RecordingPlayer {
    log: Arc<Mutex<Vec<&'static str>>>,
    playing: bool,
    fail: bool,
}

impl MaskPlayer for RecordingPlayer {
    fn start(&mut self, _mask: Arc<AudioMask>) -> AudioResult<()> {
        if self.fail {
            return Err(tus_stim::audio::AudioError::Playback("no device".to_string()));
        }
        self.log.lock().push("start");
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().push("stop");
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

fn tiny_mask() -> Arc<AudioMask> {
    Arc::new(AudioMask::new(8_000, 1, vec![0.1; 8_000]).unwrap())
}

#[test]
fn test_mask_plays_for_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let player = RecordingPlayer::default();
    let calls = Arc::clone(&player.log);

    let report = ProtocolRunner::new(
        protocol(1.0, true),
        SimulatedAwg::with_default_config(),
        open_log(dir.path()),
    )
    .with_clock(Arc::new(MockTimeProvider::new(0)))
    .with_mask(Box::new(player), tiny_mask())
    .run()
    .unwrap();

    assert_eq!(*calls.lock(), vec!["start", "stop"]);
    let events = events(&report.log_path);
    let start = events.iter().position(|e| e == "mask_start").unwrap();
    let first_pulse = events.iter().position(|e| e == "pulse_on").unwrap();
    let stop = events.iter().position(|e| e == "mask_stop").unwrap();
    assert!(start < first_pulse && first_pulse < stop);
}

#[test]
fn test_playback_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let player = RecordingPlayer {
        fail: true,
        ..RecordingPlayer::default()
    };

    let report = ProtocolRunner::new(
        protocol(0.4, true),
        SimulatedAwg::with_default_config(),
        open_log(dir.path()),
    )
    .with_clock(Arc::new(MockTimeProvider::new(0)))
    .with_mask(Box::new(player), tiny_mask())
    .run()
    .unwrap();

    assert_eq!(report.pulses, 2);
    assert!(events(&report.log_path).contains(&"mask_error".to_string()));
}

/// Byte sink shared with the test
#[derive(Clone, Default)]
struct SharedWire(Arc<Mutex<Vec<u8>>>);

impl Write for SharedWire {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BrokenWire;

impl Write for BrokenWire {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_markers_bracket_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let wire = SharedWire::default();

    ProtocolRunner::new(
        protocol(0.4, false),
        SimulatedAwg::with_default_config(),
        open_log(dir.path()),
    )
    .with_clock(Arc::new(MockTimeProvider::new(0)))
    .with_trigger(
        Box::new(BiosemiTrigger::from_writer(wire.clone(), "test")),
        MarkerCodes { start: 4, stop: 8 },
    )
    .run()
    .unwrap();

    assert_eq!(*wire.0.lock(), vec![4, 8]);
}

#[test]
fn test_trigger_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let report = ProtocolRunner::new(
        protocol(0.4, false),
        SimulatedAwg::with_default_config(),
        open_log(dir.path()),
    )
    .with_clock(Arc::new(MockTimeProvider::new(0)))
    .with_trigger(
        Box::new(BiosemiTrigger::from_writer(BrokenWire, "broken")),
        MarkerCodes::default(),
    )
    .run()
    .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    let events = events(&report.log_path);
    assert_eq!(events.iter().filter(|e| *e == "trigger_error").count(), 2);
}

#[test]
fn test_shared_journal_sees_boxed_device() {
    let dir = tempfile::tempdir().unwrap();
    let awg = SimulatedAwg::with_default_config();
    let journal: CallJournal = awg.journal();
    let boxed: Box<dyn Awg> = Box::new(awg);

    let report = ProtocolRunner::new(protocol(0.2, false), boxed, open_log(dir.path()))
        .with_clock(Arc::new(MockTimeProvider::new(0)))
        .run()
        .unwrap();

    assert_eq!(report.pulses, 1);
    assert_eq!(journal.output_on_count(), 1);
}
