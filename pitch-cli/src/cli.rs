//! Command-line argument parsing.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pitch_core::AnalyzerConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "pitch-cli")]
#[command(about = "Fundamental-frequency detection for instruments and voices", long_about = None)]
pub struct Args {
    /// JSON file with analyzer settings; missing fields use defaults
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Samples per analysis block (power of two)
    #[arg(long, value_name = "SAMPLES", global = true)]
    pub buffer_size: Option<usize>,

    /// Sample rate for synthesized tones (files and devices report their own)
    #[arg(long, value_name = "HZ", global = true)]
    pub sample_rate: Option<f64>,

    /// Print the peaks and harmonics behind every estimate
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect the pitch of every block of a WAV file
    File {
        path: PathBuf,

        /// Step between block starts; defaults to the block size
        #[arg(long, value_name = "SAMPLES")]
        hop: Option<usize>,
    },
    /// Synthesize a harmonic tone and run it through the detector
    Tone {
        /// Fundamental frequency of the tone
        #[arg(value_name = "HZ")]
        frequency: f64,

        /// Number of partials, with 1/k amplitudes
        #[arg(long, default_value = "1")]
        harmonics: usize,

        /// Extra gain applied to the fundamental only
        #[arg(long, value_name = "GAIN", default_value = "1.0")]
        fundamental_gain: f64,
    },
    /// Detect the pitch of the default input device in real time
    Listen {
        /// Stop after this many blocks
        #[arg(long, value_name = "COUNT")]
        blocks: Option<usize>,
    },
}

impl Args {
    /// Analyzer settings from the config file (if any) with flag overrides.
    pub fn analyzer_config(&self) -> Result<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open config {}", path.display()))?;
                serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => AnalyzerConfig::default(),
        };
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate_hz = sample_rate;
        }
        Ok(config)
    }
}
