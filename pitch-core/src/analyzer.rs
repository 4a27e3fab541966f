//! # Fundamental Frequency Detection
//!
//! Orchestrates one detection call:
//! samples -> level gates -> FFT peaks -> Goertzel refinement ->
//! harmonic ratios -> fundamental vote.
//!
//! The analyzer holds only immutable configuration; every buffer is
//! allocated per call, so a shared `&AudioAnalyzer` can serve several
//! threads and repeated calls on the same block give the same answer.

use std::iter;

use log::debug;

use crate::config::{AnalyzerConfig, ConfigError};
use crate::fft_analyzer::FftAnalyzer;
use crate::goertzel::{self, GoertzelAnalyzer};
use crate::harmonics;
use crate::peak::{Harmonic, Peak};
use crate::sound_utils::{self, Note};

/// Why a block produced no frequency.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// At least half of the block is exactly zero (silence or a dropout).
    MostlyZero { zero_samples: usize },
    /// The block's level is below the configured noise floor.
    TooQuiet { decibels: f64 },
    /// No spectral peak passed the strength and prominence thresholds.
    NoPeaks,
}

/// How the reported frequency was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Only one peak was found; its refined frequency is the answer.
    SinglePeak,
    /// Mean of the winning bucket of harmonic candidates.
    HarmonicVote { votes: usize },
    /// Several peaks but no harmonic relation between them.
    StrongestPeakFallback,
}

/// Everything one detection call found out about a block.
#[derive(Debug, Clone)]
pub struct PitchAnalysis {
    /// The fundamental in Hz, if one was found.
    pub frequency: Option<f64>,
    pub rejection: Option<Rejection>,
    pub method: Option<Method>,
    /// Uncalibrated level of the block.
    pub decibels: f64,
    /// Refined peaks, strongest first.
    pub peaks: Vec<Peak>,
    /// Harmonic relations after adjustment.
    pub harmonics: Vec<Harmonic>,
}

impl PitchAnalysis {
    fn rejected(rejection: Rejection, decibels: f64) -> Self {
        Self {
            frequency: None,
            rejection: Some(rejection),
            method: None,
            decibels,
            peaks: Vec::new(),
            harmonics: Vec::new(),
        }
    }

    /// Nearest piano key to the detected frequency.
    pub fn note(&self) -> Option<&'static Note> {
        self.frequency.and_then(sound_utils::find_nearest_note)
    }
}

#[derive(Debug, Clone)]
pub struct AudioAnalyzer {
    config: AnalyzerConfig,
    fft: FftAnalyzer,
    goertzel: GoertzelAnalyzer,
}

impl AudioAnalyzer {
    /// Creates an analyzer for fixed-size blocks described by `config`.
    ///
    /// # Arguments
    /// * `config` - Block size, sample rate, search range and peak limits
    ///
    /// # Returns
    /// The analyzer, or the first [`ConfigError`] `config` violates.
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            fft: FftAnalyzer::new(&config),
            goertzel: GoertzelAnalyzer::new(config.sample_rate_hz),
            config,
        })
    }

    /// Default configuration at `sample_rate_hz`.
    pub fn with_sample_rate(sample_rate_hz: f64) -> Result<Self, ConfigError> {
        Self::new(AnalyzerConfig::with_sample_rate(sample_rate_hz))
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate_hz
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    /// Estimated fundamental of one block, or `None` when the block is
    /// silent, too quiet, or has no usable spectral peak.
    pub fn detect_fundamental_frequency(&self, samples: &[i16]) -> Option<f64> {
        self.analyze(samples).frequency
    }

    /// Runs the full pipeline and keeps the intermediate results.
    ///
    /// The block is truncated or zero-padded to `buffer_size` first, and
    /// both level gates are evaluated on that padded block.
    pub fn analyze(&self, samples: &[i16]) -> PitchAnalysis {
        let size = self.config.buffer_size;
        let block: Vec<i16> = samples
            .iter()
            .copied()
            .chain(iter::repeat(0))
            .take(size)
            .collect();

        let decibels = sound_utils::decibels(&block);
        let zero_samples = block.iter().filter(|&&s| s == 0).count();
        if zero_samples * 2 >= size {
            debug!("rejected: {zero_samples} of {size} samples are zero");
            return PitchAnalysis::rejected(Rejection::MostlyZero { zero_samples }, decibels);
        }
        if decibels < self.config.noise_floor_db {
            debug!(
                "rejected: {:.1} dB is below the {:.1} dB floor",
                decibels, self.config.noise_floor_db
            );
            return PitchAnalysis::rejected(Rejection::TooQuiet { decibels }, decibels);
        }

        let mut peaks = self.fft.find_peaks(&block);
        if peaks.is_empty() {
            debug!("rejected: no spectral peaks");
            return PitchAnalysis::rejected(Rejection::NoPeaks, decibels);
        }

        let normalized = goertzel::normalize(&block);
        for peak in peaks.iter_mut() {
            let refined = self.goertzel.refine(&normalized, peak.frequency_estimate());
            peak.set_goertzel_frequency(refined);
        }

        let (frequency, method, relations) = if peaks.len() == 1 {
            (peaks[0].goertzel_frequency(), Method::SinglePeak, Vec::new())
        } else {
            let mut relations = harmonics::find_harmonics(&mut peaks);
            harmonics::adjust_harmonics(&peaks, &mut relations);
            match harmonics::vote_fundamental(&peaks, &relations) {
                Some((fundamental, votes)) => {
                    (fundamental, Method::HarmonicVote { votes }, relations)
                }
                None => (
                    peaks[0].goertzel_frequency(),
                    Method::StrongestPeakFallback,
                    relations,
                ),
            }
        };

        debug!(
            "fundamental {:.2} Hz via {:?} from {} peaks, {} harmonics",
            frequency,
            method,
            peaks.len(),
            relations.len()
        );

        PitchAnalysis {
            frequency: Some(frequency),
            rejection: None,
            method: Some(method),
            decibels,
            peaks,
            harmonics: relations,
        }
    }
}
