//! # Spectral Peak Detection
//!
//! Finds the strongest, most prominent peaks of one block's magnitude
//! spectrum inside the configured frequency range.
//!
//! Steps per block:
//! 1. normalize and zero-pad the samples, run the radix-2 FFT
//! 2. smooth the magnitudes with a 5-bin trailing moving average
//! 3. accept bins at least twice the mean smoothed level whose prominence
//!    exceeds [`MINIMUM_PROMINENCE`]
//! 4. snap each accepted bin back to the raw magnitude maximum (the
//!    trailing average lags the true peak)
//! 5. rank by `magnitude * prominence`, keep the strongest few

use log::trace;

use crate::config::AnalyzerConfig;
use crate::fft;
use crate::moving_average::MovingAverage;
use crate::peak::Peak;

/// Width of the trailing moving average applied to the magnitudes.
pub const MOVING_AVERAGE_WINDOW: usize = 5;

/// A strictly higher smoothed value this close to a candidate disqualifies it.
pub const PEAK_NEIGHBORHOOD: usize = 5;

/// Candidates must stand strictly above this prominence.
pub const MINIMUM_PROMINENCE: f64 = 1.0;

/// Smoothed level must reach this multiple of the mean level.
const MEAN_MULTIPLIER: f64 = 2.0;

/// Peaks weaker than `strongest / WEAK_PEAK_RATIO` are dropped.
const WEAK_PEAK_RATIO: f64 = 25.0;

/// Scans stop once the valley drops below `mean / BOUNDARY_DIVISOR`.
const BOUNDARY_DIVISOR: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct FftAnalyzer {
    config: AnalyzerConfig,
    lowest_index: usize,
    highest_index: usize,
}

impl FftAnalyzer {
    /// Precomputes the bin bounds of the frequency range.
    ///
    /// The configuration is expected to be validated already; bounds are
    /// clamped to `1..=buffer_size / 2` regardless.
    pub fn new(config: &AnalyzerConfig) -> Self {
        let nyquist_index = config.buffer_size / 2;
        let highest_index = config
            .frequency_to_index(config.highest_frequency_hz)
            .clamp(1, nyquist_index.max(1));
        let lowest_index = config
            .frequency_to_index(config.lowest_frequency_hz)
            .clamp(1, highest_index);
        Self {
            config: config.clone(),
            lowest_index,
            highest_index,
        }
    }

    pub fn lowest_index(&self) -> usize {
        self.lowest_index
    }

    pub fn highest_index(&self) -> usize {
        self.highest_index
    }

    /// Spectral peaks of one block.
    ///
    /// # Arguments
    /// * `samples` - One block of PCM samples, zero-padded to the buffer size
    ///
    /// # Returns
    /// The qualifying peaks, strongest first, at most `max_peaks` of them.
    /// Empty if none qualify.
    pub fn find_peaks(&self, samples: &[i16]) -> Vec<Peak> {
        let mut spectrum = fft::normalize_samples(samples, self.config.buffer_size);
        fft::fft_in_place(&mut spectrum);

        // Both vectors are indexed from `lowest_index`.
        let raw = fft::magnitudes(&spectrum, self.lowest_index..=self.highest_index);
        if raw.is_empty() {
            return Vec::new();
        }
        let mut moving_average = MovingAverage::new(MOVING_AVERAGE_WINDOW);
        let smoothed: Vec<f64> = raw.iter().map(|&m| moving_average.insert(m)).collect();

        let mean = smoothed.iter().sum::<f64>() / smoothed.len() as f64;
        if !(mean > 0.0) {
            return Vec::new();
        }
        let boundary = mean / BOUNDARY_DIVISOR;

        let mut peaks: Vec<Peak> = Vec::new();
        for (offset, &value) in smoothed.iter().enumerate() {
            if value < MEAN_MULTIPLIER * mean {
                continue;
            }
            let prominence = prominence(&smoothed, offset, boundary);
            if prominence <= MINIMUM_PROMINENCE {
                continue;
            }

            let window_start = offset.saturating_sub(MOVING_AVERAGE_WINDOW - 1);
            let Some((peak_offset, magnitude)) = raw[window_start..=offset]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, &m)| (window_start + k, m))
            else {
                continue;
            };

            let fft_index = self.lowest_index + peak_offset;
            let peak = Peak::new(
                fft_index,
                self.config.index_to_frequency(fft_index),
                magnitude,
                prominence,
            );
            trace!(
                "candidate bin {} ({:.2} Hz): magnitude {:.4}, prominence {:.2}",
                fft_index,
                peak.frequency_estimate(),
                magnitude,
                prominence
            );
            insert_candidate(&mut peaks, peak);
        }

        peaks.sort_by(|a, b| b.fft_value().total_cmp(&a.fft_value()));
        peaks.truncate(self.config.max_peaks);
        if let Some(strongest) = peaks.first().map(Peak::fft_value) {
            let cutoff = strongest / WEAK_PEAK_RATIO;
            peaks.retain(|p| p.fft_value() >= cutoff);
        }
        peaks
    }
}

/// Adds `peak` unless a candidate already sits on its bin. Of two
/// candidates snapped to the same bin the more prominent one is kept, so
/// the result does not depend on scan order.
fn insert_candidate(peaks: &mut Vec<Peak>, peak: Peak) {
    match peaks.iter_mut().find(|p| p.fft_index() == peak.fft_index()) {
        Some(existing) => {
            if peak.fft_prominence() > existing.fft_prominence() {
                *existing = peak;
            }
        }
        None => peaks.push(peak),
    }
}

/// Height of `smoothed[center]` relative to the valleys on either side.
///
/// Returns 0.0 (not a peak) when a strictly higher value sits within
/// [`PEAK_NEIGHBORHOOD`] bins, or when no usable valley exists.
fn prominence(smoothed: &[f64], center: usize, boundary: f64) -> f64 {
    let value = smoothed[center];

    let near_start = center.saturating_sub(PEAK_NEIGHBORHOOD);
    let near_end = (center + PEAK_NEIGHBORHOOD).min(smoothed.len() - 1);
    if smoothed[near_start..=near_end].iter().any(|&v| v > value) {
        return 0.0;
    }

    let left = valley(smoothed[..center].iter().rev(), value, boundary);
    let right = valley(smoothed[center + 1..].iter(), value, boundary);
    let (sum, count) = [left, right]
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return 0.0;
    }
    let base = sum / count as f64;
    if base > 0.0 { value / base } else { 0.0 }
}

/// Lowest value met while walking away from a peak of height `value`.
///
/// The walk ends at the first higher value or once it has dropped under
/// `boundary`. `None` when there is nothing to walk.
fn valley<'a>(neighbors: impl Iterator<Item = &'a f64>, value: f64, boundary: f64) -> Option<f64> {
    let mut lowest: Option<f64> = None;
    for &neighbor in neighbors {
        if neighbor > value {
            break;
        }
        let current = lowest.map_or(neighbor, |l| l.min(neighbor));
        lowest = Some(current);
        if current < boundary {
            break;
        }
    }
    lowest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn same_bin_keeps_the_more_prominent_candidate() {
        let mut peaks = Vec::new();
        insert_candidate(&mut peaks, Peak::new(12, 129.2, 3.0, 1.5));
        insert_candidate(&mut peaks, Peak::new(12, 129.2, 3.0, 4.0));
        insert_candidate(&mut peaks, Peak::new(12, 129.2, 3.0, 2.0));
        insert_candidate(&mut peaks, Peak::new(20, 215.3, 1.0, 1.2));

        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].fft_prominence(), 4.0);
        assert_eq!(peaks[0].fft_value(), 12.0);
        assert_eq!(peaks[1].fft_index(), 20);
    }

    fn tone(partials: &[(f64, f64)], sample_rate: f64, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate;
                let v: f64 = partials
                    .iter()
                    .map(|&(freq, amp)| amp * (2.0 * PI * freq * t).sin())
                    .sum();
                (v * 8000.0).round() as i16
            })
            .collect()
    }

    #[test]
    fn index_bounds_cover_the_piano() {
        let analyzer = FftAnalyzer::new(&AnalyzerConfig::default());
        assert_eq!(analyzer.lowest_index(), 2);
        assert_eq!(analyzer.highest_index(), 388);
    }

    #[test]
    fn silence_has_no_peaks() {
        let analyzer = FftAnalyzer::new(&AnalyzerConfig::default());
        assert!(analyzer.find_peaks(&[0; 4096]).is_empty());
        assert!(analyzer.find_peaks(&[]).is_empty());
    }

    #[test]
    fn sine_gives_one_peak_at_its_bin() {
        let config = AnalyzerConfig::default();
        let analyzer = FftAnalyzer::new(&config);
        let peaks = analyzer.find_peaks(&tone(&[(440.0, 1.0)], 44100.0, 4096));
        assert!(!peaks.is_empty());
        let strongest = &peaks[0];
        // 440 Hz sits at bin 40.87
        assert_eq!(strongest.fft_index(), 41);
        assert!((strongest.frequency_estimate() - 440.0).abs() < config.index_to_frequency(1));
        assert!(strongest.fft_prominence() > MINIMUM_PROMINENCE);
    }

    #[test]
    fn peaks_are_ranked_and_bounded() {
        let partials: Vec<(f64, f64)> = (1..=16)
            .map(|k| (97.0 * k as f64 + 3.0 * k as f64 * k as f64, 1.0 / k as f64))
            .collect();
        let analyzer = FftAnalyzer::new(&AnalyzerConfig::default());
        let peaks = analyzer.find_peaks(&tone(&partials, 44100.0, 4096));
        assert!(!peaks.is_empty());
        assert!(peaks.len() <= 10, "got {} peaks", peaks.len());
        for pair in peaks.windows(2) {
            assert!(pair[0].fft_value() >= pair[1].fft_value());
        }
        let cutoff = peaks[0].fft_value() / 25.0;
        assert!(peaks.iter().all(|p| p.fft_value() >= cutoff));
    }

    #[test]
    fn prominence_rejects_shoulders() {
        let smoothed = [1.0, 2.0, 6.0, 9.0, 6.0, 2.0, 1.0, 1.0];
        assert_eq!(prominence(&smoothed, 2, 0.1), 0.0);
        // Valleys are 1.0 on both sides.
        assert_eq!(prominence(&smoothed, 3, 0.1), 9.0);
    }

    #[test]
    fn prominence_guards_zero_valleys() {
        let smoothed = [0.0, 0.0, 5.0, 0.0, 0.0];
        assert_eq!(prominence(&smoothed, 2, 0.1), 0.0);
        assert_eq!(prominence(&[3.0], 0, 0.1), 0.0);
    }
}
