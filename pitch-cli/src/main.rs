//! # pitch-cli
//!
//! Command-line front end for `pitch-core`.
//!
//! ## Commands
//! - **file**: block-by-block detection over a WAV file
//! - **tone**: synthesized self-check
//! - **listen**: live detection from the default microphone, with the
//!   caller-side spike rejection the core leaves to its users

mod cli;
mod tracker;
mod wav;

use std::f64::consts::PI;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};
use pitch_core::{AnalyzerConfig, AudioAnalyzer, PitchAnalysis, audio, sound_utils};

use cli::{Args, Command};
use tracker::{PitchTracker, TrackEvent};

/// Blocks averaged for the displayed pitch in listen mode.
const SMOOTHING_WINDOW: usize = 3;

/// Consecutive spikes tolerated before the tracker follows the new pitch.
const SPIKES_BEFORE_RELOCK: usize = 2;

/// Blocks waiting for analysis before the capture side starts dropping.
const CAPTURE_QUEUE: usize = 2;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.analyzer_config()?;

    match &args.command {
        Command::File { path, hop } => {
            let audio = wav::read_wav(path)?;
            info!(
                "{}: {} samples at {} Hz",
                path.display(),
                audio.samples.len(),
                audio.sample_rate
            );
            let analyzer = build_analyzer(config, f64::from(audio.sample_rate))?;
            let hop = hop.unwrap_or(analyzer.buffer_size());
            let results = analyze_file(&analyzer, &audio.samples, hop)?;
            for (seconds, analysis) in &results {
                print_analysis(*seconds, analysis, args.verbose);
            }
            let detected = results
                .iter()
                .filter(|(_, analysis)| analysis.frequency.is_some())
                .count();
            info!("Pitch found in {detected} of {} blocks", results.len());
            Ok(())
        }
        Command::Tone {
            frequency,
            harmonics,
            fundamental_gain,
        } => {
            let sample_rate = config.sample_rate_hz;
            let analyzer = build_analyzer(config, sample_rate)?;
            let block = synthesize(
                *frequency,
                (*harmonics).max(1),
                *fundamental_gain,
                sample_rate,
                analyzer.buffer_size(),
            );
            let analysis = analyzer.analyze(&block);
            print_analysis(0.0, &analysis, args.verbose);
            Ok(())
        }
        Command::Listen { blocks } => listen(config, *blocks, args.verbose),
    }
}

/// Builds an analyzer for `sample_rate`, pulling the upper search bound
/// under Nyquist for low device rates.
fn build_analyzer(mut config: AnalyzerConfig, sample_rate: f64) -> Result<AudioAnalyzer> {
    config.sample_rate_hz = sample_rate;
    let nyquist = sample_rate / 2.0;
    if config.highest_frequency_hz > nyquist {
        info!(
            "Limiting search range to {:.0} Hz at {:.0} Hz sample rate",
            nyquist, sample_rate
        );
        config.highest_frequency_hz = nyquist;
    }
    AudioAnalyzer::new(config).context("invalid analyzer configuration")
}

/// Cuts `samples` into `buffer_size` blocks starting every `hop` samples
/// and analyzes each one.
///
/// # Returns
/// The start time in seconds and the analysis of every block. A file
/// shorter than one block yields a single zero-padded block; a trailing
/// partial block is dropped otherwise.
fn analyze_file(
    analyzer: &AudioAnalyzer,
    samples: &[i16],
    hop: usize,
) -> Result<Vec<(f64, PitchAnalysis)>> {
    if hop == 0 {
        bail!("--hop must be at least 1");
    }
    let size = analyzer.buffer_size();
    if samples.len() < size {
        warn!("File is shorter than one block; it will be zero-padded");
    }

    let mut results = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(samples.len());
        let seconds = start as f64 / analyzer.sample_rate();
        results.push((seconds, analyzer.analyze(&samples[start..end])));

        start += hop;
        if start + size > samples.len() {
            break;
        }
    }
    Ok(results)
}

fn listen(config: AnalyzerConfig, max_blocks: Option<usize>, verbose: bool) -> Result<()> {
    // The Nyquist clamp waits for the device rate; everything else is
    // checked before the microphone opens.
    config.validate().context("invalid analyzer configuration")?;
    let (block_tx, block_rx) = crossbeam_channel::bounded::<Vec<i16>>(CAPTURE_QUEUE);
    let capture = audio::start_audio_capture(config.buffer_size, block_tx)?;
    let analyzer = build_analyzer(config, f64::from(capture.sample_rate()))?;
    info!("Listening on {} (Ctrl-C to stop)", capture.device_name());

    let mut tracker = PitchTracker::new(SMOOTHING_WINDOW, SPIKES_BEFORE_RELOCK);
    let mut blocks = 0usize;
    while max_blocks.is_none_or(|max| blocks < max) {
        let block = match block_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(block) => block,
            Err(RecvTimeoutError::Timeout) => {
                warn!("No audio received for 2 seconds");
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Audio channel closed");
                break;
            }
        };
        blocks += 1;

        let analysis = analyzer.analyze(&block);
        let seconds = (blocks * analyzer.buffer_size()) as f64 / analyzer.sample_rate();
        if verbose {
            print_analysis(seconds, &analysis, true);
        }
        match analysis.frequency.map(|f| tracker.update(f)) {
            Some(TrackEvent::Spike(f)) => {
                info!("Ignoring jump to {f:.2} Hz");
            }
            Some(TrackEvent::Accepted(_) | TrackEvent::Relocked(_)) => {
                if let Some(smoothed) = tracker.display() {
                    println!("{:>8.2}s  {}", seconds, describe(smoothed));
                }
            }
            None => {}
        }
    }

    if capture.dropped_blocks() > 0 {
        info!("{} blocks dropped while analysis was busy", capture.dropped_blocks());
    }
    capture.pause()?;
    Ok(())
}

/// Harmonic test tone: partial `k` has amplitude `1/k`, the fundamental
/// is scaled by `fundamental_gain`, and the sum peaks at half scale.
fn synthesize(
    frequency: f64,
    harmonics: usize,
    fundamental_gain: f64,
    sample_rate: f64,
    len: usize,
) -> Vec<i16> {
    let raw: Vec<f64> = (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (1..=harmonics)
                .map(|k| {
                    let gain = if k == 1 { fundamental_gain } else { 1.0 };
                    gain / k as f64 * (2.0 * PI * frequency * k as f64 * t).sin()
                })
                .sum()
        })
        .collect();
    let peak = raw.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if peak == 0.0 {
        return vec![0; len];
    }
    let scale = 0.5 * f64::from(i16::MAX) / peak;
    raw.iter().map(|v| (v * scale).round() as i16).collect()
}

/// "440.02 Hz  A4 +0.1 cents"
fn describe(frequency: f64) -> String {
    match sound_utils::find_nearest_note(frequency) {
        Some(note) => format!(
            "{:>9.2} Hz  {:<4} {:+6.1} cents",
            frequency,
            note.name,
            sound_utils::cents_deviation(frequency, note.frequency)
        ),
        None => format!("{frequency:>9.2} Hz"),
    }
}

fn print_analysis(seconds: f64, analysis: &PitchAnalysis, verbose: bool) {
    match (analysis.frequency, &analysis.rejection) {
        (Some(frequency), _) => println!("{:>8.2}s  {}", seconds, describe(frequency)),
        (None, Some(rejection)) => println!("{seconds:>8.2}s  no pitch ({rejection:?})"),
        (None, None) => println!("{seconds:>8.2}s  no pitch"),
    }
    if !verbose {
        return;
    }
    println!("           level {:.1} dB, method {:?}", analysis.decibels, analysis.method);
    for peak in &analysis.peaks {
        println!(
            "           peak bin {:>4}  {:>9.2} Hz  value {:>10.2}  prominence {:>6.2}",
            peak.fft_index(),
            peak.goertzel_frequency(),
            peak.fft_value(),
            peak.fft_prominence()
        );
    }
    for harmonic in &analysis.harmonics {
        let a = &analysis.peaks[harmonic.peak_a().0];
        let b = &analysis.peaks[harmonic.peak_b().0];
        println!(
            "           harmonic {}:{}  {:.2} Hz / {:.2} Hz",
            harmonic.term_a(),
            harmonic.term_b(),
            a.goertzel_frequency(),
            b.goertzel_frequency()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_tone_is_detected() {
        let analyzer = build_analyzer(AnalyzerConfig::default(), 44100.0).unwrap();
        let block = synthesize(196.0, 6, 0.5, 44100.0, analyzer.buffer_size());
        assert_eq!(block.len(), 4096);
        let peak = block.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!((16_000..=16_384).contains(&peak), "peak {peak}");

        let frequency = analyzer.detect_fundamental_frequency(&block).unwrap();
        assert!((frequency - 196.0).abs() < 2.0, "got {frequency}");
    }

    #[test]
    fn low_rates_clamp_the_search_range() {
        let analyzer = build_analyzer(AnalyzerConfig::default(), 8000.0).unwrap();
        assert_eq!(analyzer.config().highest_frequency_hz, 4000.0);
    }

    fn file_blocks(len: usize, hop: usize) -> Vec<(f64, PitchAnalysis)> {
        let analyzer = build_analyzer(AnalyzerConfig::default(), 44100.0).unwrap();
        let samples = synthesize(220.0, 4, 1.0, 44100.0, len);
        analyze_file(&analyzer, &samples, hop).unwrap()
    }

    #[test]
    fn file_is_cut_into_whole_blocks() {
        let results = file_blocks(3 * 4096, 4096);
        assert_eq!(results.len(), 3);
        let starts: Vec<f64> = results.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0.0, 4096.0 / 44100.0, 8192.0 / 44100.0]);
        for (_, analysis) in &results {
            let frequency = analysis.frequency.unwrap();
            assert!((frequency - 220.0).abs() < 2.0, "got {frequency}");
        }
    }

    #[test]
    fn trailing_partial_block_is_dropped() {
        assert_eq!(file_blocks(2 * 4096 - 1, 4096).len(), 1);
    }

    #[test]
    fn short_file_yields_one_padded_block() {
        let results = file_blocks(4095, 4096);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0.0);
        assert!(results[0].1.frequency.is_some());
    }

    #[test]
    fn half_hop_overlaps_blocks() {
        assert_eq!(file_blocks(3 * 4096, 2048).len(), 2 * 3 - 1);
    }

    #[test]
    fn hop_longer_than_a_block_skips_samples() {
        let results = file_blocks(3 * 4096, 2 * 4096);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].0, 8192.0 / 44100.0);
    }

    #[test]
    fn zero_hop_is_rejected() {
        let analyzer = build_analyzer(AnalyzerConfig::default(), 44100.0).unwrap();
        let samples = vec![0i16; 4096];
        assert!(analyze_file(&analyzer, &samples, 0).is_err());
    }

    #[test]
    fn listen_rejects_bad_config_before_opening_the_microphone() {
        let config = AnalyzerConfig {
            buffer_size: 3000,
            ..AnalyzerConfig::default()
        };
        // Returns before any audio device is touched.
        let err = listen(config, Some(1), false).unwrap_err();
        assert!(err.to_string().contains("invalid analyzer configuration"), "{err}");
    }

    #[test]
    fn describe_names_the_note() {
        let text = describe(440.0);
        assert!(text.contains("A4"), "{text}");
        assert!(text.contains("+0.0"), "{text}");
    }
}
