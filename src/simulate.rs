//! Synthetic captures for exercising replay and analysis without a board.
//!
//! The generator produces exactly what a [`RecordingSource`] would have
//! written during a live run: framed blocks, with a few stray bytes between
//! them and, optionally, an occasional frame with a broken terminator.
//!
//! [`RecordingSource`]: crate::hardware::RecordingSource

use crate::conversion::ThermistorModel;
use crate::error::{AppResult, DaqError};
use crate::protocol::{encode_block, Block, END_BYTE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use tracing::info;

/// Bytes the generator sprinkles between frames. None of them is a sync byte.
const NOISE_BYTES: [u8; 4] = [0x00, 0xff, b'\r', b'\n'];

/// Shape of the synthetic temperature signal and of the capture around it.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticCapture {
    pub blocks: usize,
    pub samples_per_block: u16,
    pub sample_rate_hz: f64,
    pub seed: u64,
    pub base_temperature_c: f64,
    pub tone_amplitude_c: f64,
    pub tone_hz: f64,
    /// Half-width of the uniform noise added to every sample, in °C.
    pub noise_c: f64,
    /// Every n-th block gets a wrong terminator; 0 disables.
    pub corrupt_every: usize,
    pub model: ThermistorModel,
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self {
            blocks: 200,
            samples_per_block: 100,
            sample_rate_hz: 1000.0,
            seed: 0,
            base_temperature_c: 25.0,
            tone_amplitude_c: 0.5,
            tone_hz: 2.0,
            noise_c: 0.2,
            corrupt_every: 0,
            model: ThermistorModel::default(),
        }
    }
}

impl SyntheticCapture {
    /// Wall time covered by one block, in microseconds.
    pub fn block_duration_micros(&self) -> u32 {
        (f64::from(self.samples_per_block) / self.sample_rate_hz * 1e6).round() as u32
    }

    /// Builds the capture bytes.
    pub fn generate(&self) -> AppResult<Vec<u8>> {
        if self.samples_per_block == 0 {
            return Err(DaqError::Configuration(
                "samples_per_block must be at least 1".into(),
            ));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(DaqError::Configuration(format!(
                "sample rate must be positive, got {}",
                self.sample_rate_hz
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let duration_micros = self.block_duration_micros();
        let per_block = usize::from(self.samples_per_block);
        let mut capture = Vec::with_capacity(self.blocks * (per_block * 2 + 12));

        for index in 0..self.blocks {
            let samples = (0..per_block)
                .map(|j| {
                    let t = (index * per_block + j) as f64 / self.sample_rate_hz;
                    let noise = if self.noise_c > 0.0 {
                        rng.gen_range(-self.noise_c..self.noise_c)
                    } else {
                        0.0
                    };
                    let temperature = self.base_temperature_c
                        + self.tone_amplitude_c * (2.0 * PI * self.tone_hz * t).sin()
                        + noise;
                    self.model.temperature_to_adc(temperature)
                })
                .collect();
            let block = Block::new(duration_micros, samples).ok_or_else(|| {
                DaqError::Processing("synthetic block has no samples".into())
            })?;

            let mut frame = encode_block(&block);
            if self.corrupt_every > 0 && (index + 1) % self.corrupt_every == 0 {
                if let Some(last) = frame.last_mut() {
                    *last = END_BYTE ^ 0x20;
                }
            }
            capture.extend_from_slice(&frame);

            for _ in 0..rng.gen_range(0..3) {
                capture.push(NOISE_BYTES[rng.gen_range(0..NOISE_BYTES.len())]);
            }
        }

        Ok(capture)
    }

    /// Generates the capture and writes it to `path`.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> AppResult<usize> {
        let capture = self.generate()?;
        fs::write(path.as_ref(), &capture)?;
        info!(
            path = %path.as_ref().display(),
            blocks = self.blocks,
            bytes = capture.len(),
            "Synthetic capture written"
        );
        Ok(capture.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::StopReason;
    use crate::hardware::ReplaySource;
    use crate::replay::replay;
    use std::time::Duration;

    #[test]
    fn same_seed_same_bytes() {
        let cfg = SyntheticCapture {
            blocks: 5,
            ..Default::default()
        };
        assert_eq!(cfg.generate().unwrap(), cfg.generate().unwrap());
        let other = SyntheticCapture { seed: 1, ..cfg.clone() };
        assert_ne!(cfg.generate().unwrap(), other.generate().unwrap());
    }

    #[test]
    fn capture_replays_to_expected_rate_and_level() {
        let cfg = SyntheticCapture {
            blocks: 20,
            samples_per_block: 50,
            sample_rate_hz: 500.0,
            tone_amplitude_c: 0.0,
            noise_c: 0.0,
            ..Default::default()
        };
        let capture = cfg.generate().unwrap();
        let run = replay(
            &mut ReplaySource::new(capture.as_slice()),
            &cfg.model,
            Duration::from_millis(10),
        )
        .unwrap();

        assert_eq!(run.stop_reason, StopReason::EndOfCapture);
        assert_eq!(run.decoder.blocks, 20);
        assert_eq!(run.series.len(), 1000);
        assert!((run.ledger.average_rate().unwrap() - 500.0).abs() < 1e-9);
        // ADC quantisation near 25 °C is about 0.1 °C per count.
        let mean = run.series.temperatures().iter().sum::<f64>() / 1000.0;
        assert!((mean - 25.0).abs() < 0.1, "mean {mean}");
    }

    #[test]
    fn corrupted_frames_are_dropped_on_replay() {
        let cfg = SyntheticCapture {
            blocks: 10,
            corrupt_every: 5,
            ..Default::default()
        };
        let capture = cfg.generate().unwrap();
        let run = replay(
            &mut ReplaySource::new(capture.as_slice()),
            &cfg.model,
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(run.decoder.blocks, 8);
        assert_eq!(run.decoder.frame_corrupt, 2);
    }

    #[test]
    fn noise_bytes_never_look_like_a_frame_start() {
        assert!(!NOISE_BYTES.contains(&crate::protocol::SYNC_BYTE));
    }

    #[test]
    fn zero_sized_blocks_are_rejected() {
        let cfg = SyntheticCapture {
            samples_per_block: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.generate(), Err(DaqError::Configuration(_))));
    }
}
