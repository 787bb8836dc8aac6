// src/hal/scpi_driver.rs
//! SCPI waveform generator driver
//!
//! Speaks plain SCPI text over a raw TCP socket (port 5025 on most
//! instruments) or a serial line. The command set targets 33500-series
//! style generators; only configure / set_output / close are exposed.

use crate::config::constants::hal::*;
use crate::hal::{Awg, DeviceLimits, DeviceSettings, DeviceType, GatingMode, HalError, HalResult};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Byte stream an instrument is reachable through
pub trait ScpiTransport: Read + Write + Send {}

impl<T: Read + Write + Send> ScpiTransport for T {}

/// Where the instrument lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AwgTransport {
    Tcp { address: String },
    Serial {
        port_name: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

fn default_baud_rate() -> u32 {
    DEFAULT_AWG_BAUD_RATE
}

impl Default for AwgTransport {
    fn default() -> Self {
        AwgTransport::Tcp {
            address: DEFAULT_AWG_ADDRESS.to_string(),
        }
    }
}

impl AwgTransport {
    pub fn target(&self) -> String {
        match self {
            AwgTransport::Tcp { address } => address.clone(),
            AwgTransport::Serial { port_name, .. } => port_name.clone(),
        }
    }

    fn device_type(&self) -> DeviceType {
        match self {
            AwgTransport::Tcp { .. } => DeviceType::Tcp,
            AwgTransport::Serial { .. } => DeviceType::Serial,
        }
    }
}

/// SCPI instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScpiConfig {
    #[serde(default)]
    pub gating: GatingMode,
    #[serde(default = "default_channel")]
    pub channel: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
    #[serde(default = "default_retry_attempts")]
    pub connection_retry_attempts: u32,
    #[serde(default)]
    pub transport: AwgTransport,
    #[serde(default)]
    pub limits: DeviceLimits,
}

fn default_channel() -> u8 {
    DEFAULT_CHANNEL
}

fn default_timeout_ms() -> u32 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for ScpiConfig {
    fn default() -> Self {
        Self {
            transport: AwgTransport::default(),
            gating: GatingMode::default(),
            channel: default_channel(),
            timeout_ms: default_timeout_ms(),
            connection_retry_attempts: default_retry_attempts(),
            limits: DeviceLimits::default(),
        }
    }
}

impl ScpiConfig {
    pub fn validate(&self) -> HalResult<()> {
        if self.transport.target().is_empty() {
            return Err(HalError::Configuration(
                "instrument address cannot be empty".to_string(),
            ));
        }
        if let AwgTransport::Serial { baud_rate, .. } = &self.transport {
            if *baud_rate == 0 || *baud_rate > 4_000_000 {
                return Err(HalError::Configuration(format!(
                    "invalid baud rate: {}",
                    baud_rate
                )));
            }
        }
        if !(1..=4).contains(&self.channel) {
            return Err(HalError::Configuration(format!(
                "invalid output channel: {}",
                self.channel
            )));
        }
        if self.timeout_ms == 0 || self.timeout_ms > 60_000 {
            return Err(HalError::Configuration(format!(
                "invalid timeout: {} ms",
                self.timeout_ms
            )));
        }
        if self.connection_retry_attempts == 0 {
            return Err(HalError::Configuration(
                "at least one connection attempt is required".to_string(),
            ));
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms as u64)
    }
}

/// Waveform generator driven by SCPI commands
pub struct ScpiAwg {
    config: ScpiConfig,
    transport: Option<Box<dyn ScpiTransport>>,
    identity: String,
}

impl ScpiAwg {
    /// Open the configured transport and identify the instrument
    pub fn connect(config: ScpiConfig) -> HalResult<Self> {
        config.validate()?;
        let transport = Self::open_with_retry(&config)?;
        Self::with_transport(transport, config)
    }

    /// Wrap an already open transport
    pub fn with_transport(
        transport: Box<dyn ScpiTransport>,
        config: ScpiConfig,
    ) -> HalResult<Self> {
        config.validate()?;
        let target = config.transport.target();
        let mut awg = Self {
            config,
            transport: Some(transport),
            identity: String::new(),
        };

        let identity = awg
            .query("*IDN?")
            .map_err(|e| HalError::connection(target.clone(), e))?;
        if identity.is_empty() {
            return Err(HalError::connection(target, "instrument did not identify itself"));
        }
        info!(instrument = %identity, "AWG connection opened");
        awg.identity = identity;
        awg.write_command("*CLS")?;
        Ok(awg)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn open_with_retry(config: &ScpiConfig) -> HalResult<Box<dyn ScpiTransport>> {
        let target = config.transport.target();
        let mut last_error = None;

        for attempt in 1..=config.connection_retry_attempts {
            match Self::try_open(config) {
                Ok(transport) => return Ok(transport),
                Err(e) => {
                    warn!(attempt, target = %target, error = %e, "AWG connection attempt failed");
                    last_error = Some(e);
                    if attempt < config.connection_retry_attempts {
                        std::thread::sleep(Duration::from_millis(100 * attempt as u64));
                    }
                }
            }
        }

        Err(HalError::connection(
            target,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no connection attempt made".to_string()),
        ))
    }

    fn try_open(config: &ScpiConfig) -> std::io::Result<Box<dyn ScpiTransport>> {
        match &config.transport {
            AwgTransport::Tcp { address } => {
                let addr: SocketAddr = address.to_socket_addrs()?.next().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("cannot resolve {}", address),
                    )
                })?;
                let stream = TcpStream::connect_timeout(&addr, config.timeout())?;
                stream.set_read_timeout(Some(config.timeout()))?;
                stream.set_write_timeout(Some(config.timeout()))?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            AwgTransport::Serial {
                port_name,
                baud_rate,
            } => {
                let port = serialport::new(port_name, *baud_rate)
                    .timeout(config.timeout())
                    .open()
                    .map_err(std::io::Error::from)?;
                Ok(Box::new(port))
            }
        }
    }

    fn transport(&mut self) -> HalResult<&mut Box<dyn ScpiTransport>> {
        self.transport.as_mut().ok_or(HalError::Closed)
    }

    fn write_command(&mut self, command: &str) -> HalResult<()> {
        debug!(command, "SCPI >");
        let transport = self.transport()?;
        transport.write_all(command.as_bytes())?;
        transport.write_all(b"\n")?;
        transport.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> HalResult<String> {
        let transport = self.transport()?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let n = transport.read(&mut byte)?;
            if n == 0 {
                return Err(HalError::Protocol(
                    "connection closed while awaiting response".to_string(),
                ));
            }
            if byte[0] == b'\n' {
                break;
            }
            if line.len() >= MAX_RESPONSE_BYTES {
                return Err(HalError::Protocol(format!(
                    "response exceeds {} bytes",
                    MAX_RESPONSE_BYTES
                )));
            }
            line.push(byte[0]);
        }

        let response = String::from_utf8_lossy(&line).trim().to_string();
        debug!(response = %response, "SCPI <");
        Ok(response)
    }

    fn query(&mut self, command: &str) -> HalResult<String> {
        self.write_command(command)?;
        self.read_line()
    }

    /// Drain the instrument error queue
    fn take_errors(&mut self) -> HalResult<Vec<String>> {
        let mut errors = Vec::new();
        // The queue is finite; bound the loop in case a device never reports "0"
        for _ in 0..32 {
            let response = self.query("SYST:ERR?")?;
            let code = parse_error_code(&response)?;
            if code == 0 {
                break;
            }
            errors.push(response);
        }
        Ok(errors)
    }

    fn configuration_commands(&self, settings: &DeviceSettings) -> Vec<String> {
        let ch = self.config.channel;
        let mut commands = vec![
            format!("OUTP{ch} OFF"),
            format!("SOUR{ch}:FUNC SIN"),
            format!("SOUR{ch}:FREQ {}", settings.carrier_hz),
            format!("SOUR{ch}:VOLT:UNIT VPP"),
            format!("SOUR{ch}:VOLT {}", settings.amplitude_vpp),
            format!("SOUR{ch}:VOLT:OFFS 0"),
        ];

        match self.config.gating {
            GatingMode::BusTrigger => {
                commands.extend([
                    format!("SOUR{ch}:BURS:MODE TRIG"),
                    format!("SOUR{ch}:BURS:NCYC {}", settings.burst_cycles),
                    format!("TRIG{ch}:SOUR BUS"),
                    format!("SOUR{ch}:BURS:STAT ON"),
                    format!("OUTP{ch} ON"),
                ]);
            }
            GatingMode::OutputGate => {
                commands.push(format!("SOUR{ch}:BURS:STAT OFF"));
            }
        }
        commands
    }
}

fn parse_error_code(response: &str) -> HalResult<i32> {
    let code = response.split(',').next().unwrap_or_default().trim();
    code.parse::<i32>()
        .map_err(|_| HalError::Protocol(format!("unexpected error queue entry: {:?}", response)))
}

impl Awg for ScpiAwg {
    fn configure(&mut self, settings: &DeviceSettings) -> HalResult<()> {
        self.config.limits.check(settings)?;

        info!(
            carrier_khz = settings.carrier_hz / 1e3,
            amplitude_mvpp = settings.amplitude_vpp * 1e3,
            burst_ms = settings.gate_width_s * 1e3,
            burst_cycles = settings.burst_cycles,
            gating = ?self.config.gating,
            "Uploading US parameters to AWG"
        );

        for command in self.configuration_commands(settings) {
            self.write_command(&command)?;
        }

        let errors = self.take_errors()?;
        if !errors.is_empty() {
            return Err(HalError::Configuration(format!(
                "instrument rejected parameters: {}",
                errors.join("; ")
            )));
        }
        Ok(())
    }

    fn set_output(&mut self, on: bool) -> HalResult<()> {
        let ch = self.config.channel;
        let command = match (self.config.gating, on) {
            (GatingMode::BusTrigger, true) => "*TRG".to_string(),
            (GatingMode::BusTrigger, false) => "ABOR".to_string(),
            (GatingMode::OutputGate, true) => format!("OUTP{ch} ON"),
            (GatingMode::OutputGate, false) => format!("OUTP{ch} OFF"),
        };
        self.write_command(&command)
    }

    fn close(&mut self) -> HalResult<()> {
        if self.transport.is_none() {
            return Err(HalError::Closed);
        }
        // Internal triggering may keep running unless the output is disabled
        let ch = self.config.channel;
        let result = self.write_command(&format!("OUTP{ch} OFF"));
        self.transport = None;
        info!(instrument = %self.identity, "AWG connection closed");
        result
    }

    fn device_type(&self) -> DeviceType {
        self.config.transport.device_type()
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.identity, self.config.transport.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// In-memory instrument: records writes, replays canned responses
    struct FakeInstrument {
        written: Arc<Mutex<Vec<u8>>>,
        responses: VecDeque<u8>,
    }

    impl Read for FakeInstrument {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.responses.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for FakeInstrument {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn fake(responses: &str) -> (Box<dyn ScpiTransport>, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let instrument = FakeInstrument {
            written: written.clone(),
            responses: responses.bytes().collect(),
        };
        (Box::new(instrument), written)
    }

    fn lines(written: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
        String::from_utf8(written.lock().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn settings() -> DeviceSettings {
        DeviceSettings {
            carrier_hz: 265_000.0,
            amplitude_vpp: 0.25,
            gate_width_s: 0.02,
            burst_period_s: 0.2,
            burst_cycles: 5300,
        }
    }

    #[test]
    fn test_connect_identifies_instrument() {
        let (transport, written) = fake("Agilent,33522B,MY1234,5.0\n");
        let awg = ScpiAwg::with_transport(transport, ScpiConfig::default()).unwrap();

        assert_eq!(awg.identity(), "Agilent,33522B,MY1234,5.0");
        assert_eq!(lines(&written), vec!["*IDN?", "*CLS"]);
    }

    #[test]
    fn test_silent_instrument_is_connection_error() {
        let (transport, _) = fake("");
        let err = ScpiAwg::with_transport(transport, ScpiConfig::default()).err().unwrap();
        assert!(matches!(err, HalError::Connection { .. }));
    }

    #[test]
    fn test_bus_trigger_configuration_sequence() {
        let (transport, written) = fake("AWG\n+0,\"No error\"\n");
        let mut awg = ScpiAwg::with_transport(transport, ScpiConfig::default()).unwrap();

        awg.configure(&settings()).unwrap();
        awg.set_output(true).unwrap();
        awg.set_output(false).unwrap();
        awg.close().unwrap();

        let sent = lines(&written);
        assert!(sent.contains(&"SOUR1:FREQ 265000".to_string()));
        assert!(sent.contains(&"SOUR1:VOLT 0.25".to_string()));
        assert!(sent.contains(&"SOUR1:BURS:NCYC 5300".to_string()));
        assert!(sent.contains(&"TRIG1:SOUR BUS".to_string()));
        assert_eq!(
            &sent[sent.len() - 4..],
            &["SYST:ERR?", "*TRG", "ABOR", "OUTP1 OFF"]
        );
    }

    #[test]
    fn test_output_gate_mode_toggles_relay() {
        let (transport, written) = fake("AWG\n0,\"No error\"\n");
        let config = ScpiConfig {
            gating: GatingMode::OutputGate,
            channel: 2,
            ..ScpiConfig::default()
        };
        let mut awg = ScpiAwg::with_transport(transport, config).unwrap();

        awg.configure(&settings()).unwrap();
        awg.set_output(true).unwrap();
        awg.set_output(false).unwrap();

        let sent = lines(&written);
        assert!(sent.contains(&"SOUR2:BURS:STAT OFF".to_string()));
        assert_eq!(&sent[sent.len() - 2..], &["OUTP2 ON", "OUTP2 OFF"]);
    }

    #[test]
    fn test_instrument_error_queue_is_configuration_error() {
        let (transport, _) = fake("AWG\n-222,\"Data out of range\"\n+0,\"No error\"\n");
        let mut awg = ScpiAwg::with_transport(transport, ScpiConfig::default()).unwrap();

        match awg.configure(&settings()) {
            Err(HalError::Configuration(msg)) => assert!(msg.contains("Data out of range")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_limits_checked_before_any_command() {
        let (transport, written) = fake("AWG\n");
        let mut awg = ScpiAwg::with_transport(transport, ScpiConfig::default()).unwrap();
        let before = lines(&written).len();

        let mut bad = settings();
        bad.carrier_hz = 50e6;
        assert!(matches!(awg.configure(&bad), Err(HalError::Configuration(_))));
        assert_eq!(lines(&written).len(), before);
    }

    #[test]
    fn test_close_twice_fails() {
        let (transport, _) = fake("AWG\n");
        let mut awg = ScpiAwg::with_transport(transport, ScpiConfig::default()).unwrap();
        awg.close().unwrap();
        assert!(matches!(awg.close(), Err(HalError::Closed)));
        assert!(matches!(awg.set_output(false), Err(HalError::Closed)));
    }

    #[test]
    fn test_config_validation() {
        let config = ScpiConfig {
            channel: 0,
            ..ScpiConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ScpiConfig {
            transport: AwgTransport::Serial {
                port_name: "/dev/ttyUSB0".to_string(),
                baud_rate: 0,
            },
            ..ScpiConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ScpiConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unreachable_address_is_connection_error() {
        let config = ScpiConfig {
            transport: AwgTransport::Tcp {
                address: "127.0.0.1:1".to_string(),
            },
            timeout_ms: 200,
            connection_retry_attempts: 1,
            ..ScpiConfig::default()
        };
        assert!(matches!(
            ScpiAwg::connect(config),
            Err(HalError::Connection { .. })
        ));
    }
}
