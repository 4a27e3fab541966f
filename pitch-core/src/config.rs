//! # Analyzer Configuration
//!
//! Every constant the detector depends on, gathered in one serializable
//! struct so front ends can load it from JSON and override single fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sound_utils::{HIGHEST_PIANO_FREQUENCY, LOWEST_PIANO_FREQUENCY};

/// Number of samples per analysis block.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Sample rate assumed when none is supplied.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Uncalibrated level below which a block is treated as background noise.
pub const DEFAULT_NOISE_FLOOR_DB: f64 = 32.0;

/// Upper bound on the number of peaks kept from one spectrum.
pub const DEFAULT_MAX_PEAKS: usize = 10;

/// Problems detected while validating an [`AnalyzerConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("buffer size {0} is not a power of two (minimum 16)")]
    BufferSizeNotPowerOfTwo(usize),
    #[error("sample rate {0} Hz must be finite and positive")]
    InvalidSampleRate(f64),
    #[error("frequency range {low} Hz..{high} Hz is empty or not positive")]
    InvalidFrequencyRange { low: f64, high: f64 },
    #[error("highest frequency {high} Hz is above the Nyquist limit {nyquist} Hz")]
    RangeAboveNyquist { high: f64, nyquist: f64 },
    #[error("max_peaks must be at least 1")]
    ZeroMaxPeaks,
}

/// Tunable parameters of the detection pipeline.
///
/// Missing fields fall back to [`AnalyzerConfig::default`] when
/// deserializing, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Sample rate of the incoming blocks, fixed per analyzer.
    pub sample_rate_hz: f64,
    /// Block length; must be a power of two for the radix-2 FFT.
    pub buffer_size: usize,
    /// Lower edge of the frequency range searched for peaks.
    pub lowest_frequency_hz: f64,
    /// Upper edge of the frequency range searched for peaks.
    pub highest_frequency_hz: f64,
    /// Blocks quieter than this (in uncalibrated dB) are rejected.
    pub noise_floor_db: f64,
    /// Maximum number of spectral peaks carried into harmonic analysis.
    pub max_peaks: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            lowest_frequency_hz: LOWEST_PIANO_FREQUENCY,
            highest_frequency_hz: HIGHEST_PIANO_FREQUENCY,
            noise_floor_db: DEFAULT_NOISE_FLOOR_DB,
            max_peaks: DEFAULT_MAX_PEAKS,
        }
    }
}

impl AnalyzerConfig {
    /// Default configuration at the given sample rate.
    pub fn with_sample_rate(sample_rate_hz: f64) -> Self {
        Self {
            sample_rate_hz,
            ..Self::default()
        }
    }

    /// Checks that the FFT and bin-range arithmetic is well defined.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.buffer_size.is_power_of_two() || self.buffer_size < 16 {
            return Err(ConfigError::BufferSizeNotPowerOfTwo(self.buffer_size));
        }
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate_hz));
        }
        let (low, high) = (self.lowest_frequency_hz, self.highest_frequency_hz);
        if !(low.is_finite() && high.is_finite()) || low <= 0.0 || high <= low {
            return Err(ConfigError::InvalidFrequencyRange { low, high });
        }
        let nyquist = self.sample_rate_hz / 2.0;
        if high > nyquist {
            return Err(ConfigError::RangeAboveNyquist { high, nyquist });
        }
        if self.max_peaks == 0 {
            return Err(ConfigError::ZeroMaxPeaks);
        }
        Ok(())
    }

    /// FFT bin index for a frequency: `freq * buffer_size / sample_rate`.
    pub fn frequency_to_index(&self, frequency_hz: f64) -> usize {
        (frequency_hz * self.buffer_size as f64 / self.sample_rate_hz) as usize
    }

    /// Center frequency of an FFT bin.
    pub fn index_to_frequency(&self, index: usize) -> f64 {
        index as f64 * self.sample_rate_hz / self.buffer_size as f64
    }
}
