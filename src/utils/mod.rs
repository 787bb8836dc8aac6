//! Common utility functions for the stimulation suite

pub mod time;

pub use time::{frequency_to_period, MockTimeProvider, MonotonicTimeProvider, TimeProvider};
