// src/config/constants.rs
//! System-wide configuration constants

/// Stimulation protocol defaults and bounds
pub mod protocol {
    pub const DEFAULT_PRF_HZ: f64 = 5.0;
    pub const DEFAULT_DUTY_CYCLE: f64 = 0.1;
    pub const DEFAULT_VPP_MV: f64 = 250.0;
    pub const DEFAULT_CARRIER_KHZ: f64 = 265.0;
    pub const DEFAULT_DURATION_S: f64 = 80.0;

    /// Shortest burst the runner will schedule
    pub const MIN_PULSE_WIDTH_S: f64 = 0.001;

    /// Slack used when turning duration * PRF into a whole pulse count
    pub const PULSE_COUNT_TOLERANCE: f64 = 1e-6;
}

/// Timing loop constants
pub mod timing {
    /// Longest single sleep inside the timing loop; bounds interrupt latency
    pub const SLEEP_SLICE_MS: u64 = 5;
    pub const MIN_PROGRESS_INTERVAL_S: f64 = 1.0;
    pub const PROGRESS_REPORTS: f64 = 10.0;
}

/// Hardware abstraction layer constants
pub mod hal {
    pub const DEFAULT_AWG_ADDRESS: &str = "192.168.1.100:5025";
    pub const DEFAULT_AWG_BAUD_RATE: u32 = 115_200;
    pub const DEFAULT_CONNECTION_TIMEOUT_MS: u32 = 5000;
    pub const DEFAULT_CHANNEL: u8 = 1;
    pub const MAX_RESPONSE_BYTES: usize = 1024;

    pub const DEFAULT_MIN_CARRIER_HZ: f64 = 1e-6;
    pub const DEFAULT_MAX_CARRIER_HZ: f64 = 30e6;
    pub const DEFAULT_MIN_AMPLITUDE_VPP: f64 = 0.001;
    pub const DEFAULT_MAX_AMPLITUDE_VPP: f64 = 10.0;
    pub const DEFAULT_MAX_BURST_CYCLES: u64 = 100_000_000;
}

/// EEG trigger interface constants
pub mod trigger {
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 3000;
    pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 100;
    pub const DEFAULT_START_CODE: u8 = 0b0000_0001;
    pub const DEFAULT_STOP_CODE: u8 = 0b0000_0010;
}

/// Sham audio constants
pub mod audio {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;
    pub const DEFAULT_TONE_HZ: f64 = 2000.0;
    pub const DEFAULT_TONE_AMPLITUDE: f64 = 0.9;
    pub const DEFAULT_SNR_RATIO: f64 = 50.0;
    pub const DEFAULT_NOISE_FLOOR: f64 = 0.02;
    pub const DEFAULT_PEAK_CEILING: f64 = 0.95;
    pub const DEFAULT_SEED: u64 = 0x5EED_7005;
    pub const BITS_PER_SAMPLE: u16 = 16;

    pub const DEFAULT_REPLICA_FILES: usize = 20;
    pub const DEFAULT_REPLICA_FREQ_MIN_HZ: f64 = 1000.0;
    pub const DEFAULT_REPLICA_FREQ_MAX_HZ: f64 = 2000.0;
    pub const DEFAULT_REPLICA_PULSE_DURATION_S: f64 = 0.020;
    pub const DEFAULT_REPLICA_TOTAL_PULSES: usize = 400;
    pub const REPLICA_GROUP_SIZE: usize = 5;
    pub const REPLICA_GROUP_DURATION_MS: f64 = 1000.0;
    pub const REPLICA_GROUP_JITTER_MS: f64 = 15.0;
}

/// File system layout
pub mod paths {
    pub const ASSETS_DIR: &str = "sham_audio_realistic_with_noise";
    pub const DEFAULT_MASK_FILE: &str = "sham_replica_2000Hz.wav";
    pub const DEFAULT_LOG_DIR: &str = "out";
    pub const DEFAULT_CONFIG_FILE: &str = "tus.toml";
    pub const LOCAL_CONFIG_FILE: &str = "config/tus.toml";
    pub const ENV_PREFIX: &str = "TUS_";
}

/// Session log format
pub mod session_log {
    pub const FORMAT_VERSION: u32 = 2;
    pub const COLUMNS: [&str; 3] = ["time", "event", "details"];
}
