// pitch-core/src/lib.rs

//! The core logic for the harmonic pitch detector.
//! This crate turns one fixed-size block of 16-bit PCM samples into a
//! single fundamental-frequency estimate. It is completely headless:
//! capture helpers live in [`audio`], everything else is pure computation
//! scoped to a single call.

pub mod analyzer;
pub mod audio;
pub mod config;
pub mod fft;
pub mod fft_analyzer;
pub mod goertzel;
pub mod harmonics;
pub mod moving_average;
pub mod peak;
pub mod sound_utils;

pub use analyzer::{AudioAnalyzer, Method, PitchAnalysis, Rejection};
pub use config::{AnalyzerConfig, ConfigError};
pub use fft_analyzer::FftAnalyzer;
pub use goertzel::GoertzelAnalyzer;
pub use moving_average::MovingAverage;
pub use peak::{Harmonic, HarmonicId, Peak, PeakId};
pub use sound_utils::Note;
