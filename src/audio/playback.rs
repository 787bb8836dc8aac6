// src/audio/playback.rs
//! Looping mask playback
//!
//! The runner only needs start and stop. The device-backed player lives
//! behind the `playback` feature so headless builds and tests never touch an
//! audio host.

use crate::audio::{AudioMask, AudioResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Something that can loop a mask in the background until stopped
pub trait MaskPlayer {
    /// Begin looping `mask`; returns once playback is running
    fn start(&mut self, mask: Arc<AudioMask>) -> AudioResult<()>;

    /// Stop playback. Idempotent.
    fn stop(&mut self);

    fn is_playing(&self) -> bool;
}

/// Player that logs instead of producing sound
#[derive(Debug, Default)]
pub struct SilentMaskPlayer {
    playing: bool,
    started: usize,
}

impl SilentMaskPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `start` succeeded
    pub fn start_count(&self) -> usize {
        self.started
    }
}

impl MaskPlayer for SilentMaskPlayer {
    fn start(&mut self, mask: Arc<AudioMask>) -> AudioResult<()> {
        info!(
            frames = mask.frames(),
            sample_rate = mask.sample_rate(),
            "Mask playback (silent)"
        );
        self.playing = true;
        self.started += 1;
        Ok(())
    }

    fn stop(&mut self) {
        if self.playing {
            debug!("Silent mask stopped");
        }
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// Read cursor that loops over a mask, resampling by nearest frame
#[derive(Debug)]
pub struct LoopCursor {
    mask: Arc<AudioMask>,
    position: f64,
    step: f64,
}

impl LoopCursor {
    pub fn new(mask: Arc<AudioMask>, output_rate: u32) -> Self {
        let step = if output_rate == 0 {
            1.0
        } else {
            mask.sample_rate() as f64 / output_rate as f64
        };
        Self {
            mask,
            position: 0.0,
            step,
        }
    }

    /// Fill one interleaved output frame of `out.len()` channels
    pub fn next_frame(&mut self, out: &mut [f32]) {
        let frames = self.mask.frames();
        if frames == 0 {
            out.iter_mut().for_each(|s| *s = 0.0);
            return;
        }
        let frame = (self.position as usize) % frames;
        let channels = self.mask.channels();
        for (c, slot) in out.iter_mut().enumerate() {
            *slot = self.mask.frame_sample(frame, (c % channels as usize) as u16);
        }
        self.position += self.step;
        if self.position >= frames as f64 {
            self.position -= frames as f64;
        }
    }
}

#[cfg(feature = "playback")]
pub use device::CpalMaskPlayer;

#[cfg(feature = "playback")]
mod device {
    use super::{LoopCursor, MaskPlayer};
    use crate::audio::{AudioError, AudioMask, AudioResult};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{info, warn};

    /// Plays the mask on the default output device
    #[derive(Default)]
    pub struct CpalMaskPlayer {
        stream: Option<cpal::Stream>,
    }

    impl CpalMaskPlayer {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn fill<T>(data: &mut [T], channels: usize, cursor: &mut LoopCursor, convert: fn(f32) -> T) {
        let mut frame = vec![0.0f32; channels];
        for chunk in data.chunks_mut(channels) {
            cursor.next_frame(&mut frame);
            for (out, s) in chunk.iter_mut().zip(frame.iter()) {
                *out = convert(*s);
            }
        }
    }

    fn to_i16(s: f32) -> i16 {
        (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }

    fn to_u16(s: f32) -> u16 {
        ((s.clamp(-1.0, 1.0) * 0.5 + 0.5) * u16::MAX as f32) as u16
    }

    fn playback_err(e: impl ToString) -> AudioError {
        AudioError::Playback(e.to_string())
    }

    impl MaskPlayer for CpalMaskPlayer {
        fn start(&mut self, mask: Arc<AudioMask>) -> AudioResult<()> {
            self.stop();

            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| playback_err("no default output device"))?;
            let config = device.default_output_config().map_err(playback_err)?;
            let stream_config: cpal::StreamConfig = config.clone().into();
            let channels = stream_config.channels as usize;
            let mut cursor = LoopCursor::new(mask, stream_config.sample_rate.0);
            let on_error = |err: cpal::StreamError| warn!(error = %err, "Mask stream error");
            let timeout = Some(Duration::from_millis(200));

            let stream = match config.sample_format() {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _| fill(data, channels, &mut cursor, |s| s),
                    on_error,
                    timeout,
                ),
                cpal::SampleFormat::I16 => device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _| fill(data, channels, &mut cursor, to_i16),
                    on_error,
                    timeout,
                ),
                cpal::SampleFormat::U16 => device.build_output_stream(
                    &stream_config,
                    move |data: &mut [u16], _| fill(data, channels, &mut cursor, to_u16),
                    on_error,
                    timeout,
                ),
                other => {
                    return Err(playback_err(format!(
                        "unsupported output sample format: {other:?}"
                    )))
                }
            }
            .map_err(playback_err)?;

            stream.play().map_err(playback_err)?;
            info!(
                device = %device.name().unwrap_or_default(),
                sample_rate = stream_config.sample_rate.0,
                channels,
                "Mask playback started"
            );
            self.stream = Some(stream);
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(stream) = self.stream.take() {
                if let Err(e) = stream.pause() {
                    warn!(error = %e, "Failed to pause mask stream");
                }
                info!("Mask playback stopped");
            }
        }

        fn is_playing(&self) -> bool {
            self.stream.is_some()
        }
    }

    impl Drop for CpalMaskPlayer {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
