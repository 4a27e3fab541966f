//! # Goertzel Refinement
//!
//! Narrows an FFT bin estimate down to sub-hertz precision by measuring
//! single-frequency power with the Goertzel recurrence and repeatedly
//! zooming in on the two strongest probe frequencies.

use std::f64::consts::PI;

/// Half width of the initial search interval around the estimate.
const SEARCH_RADIUS_HZ: f64 = 10.0;

/// Each iteration probes this many equal sub-intervals.
const SUBDIVISIONS: usize = 4;

/// Hard stop for the zoom loop; convergence normally takes under 15 rounds.
const MAX_ITERATIONS: usize = 64;

#[derive(Debug, Clone)]
pub struct GoertzelAnalyzer {
    sample_rate_hz: f64,
}

impl GoertzelAnalyzer {
    /// # Arguments
    /// * `sample_rate_hz` - Rate of the samples later passed to [`Self::power`]
    pub fn new(sample_rate_hz: f64) -> Self {
        Self { sample_rate_hz }
    }

    /// Target precision for an estimate of the given magnitude.
    pub fn accuracy_for(frequency_estimate: f64) -> f64 {
        if frequency_estimate < 100.0 {
            0.01
        } else if frequency_estimate < 1000.0 {
            0.1
        } else {
            1.0
        }
    }

    /// Goertzel power of `samples` at `frequency`.
    ///
    /// Runs the second-order recurrence `s = x + coeff * s1 - s2` with
    /// `coeff = 2 cos(2 pi f / rate)` and returns
    /// `s2^2 + s1^2 - coeff * s1 * s2`.
    pub fn power(&self, samples: &[f64], frequency: f64) -> f64 {
        let coeff = 2.0 * (2.0 * PI * frequency / self.sample_rate_hz).cos();
        let (mut s_prev1, mut s_prev2) = (0.0_f64, 0.0_f64);
        for &x in samples {
            let s = x + coeff * s_prev1 - s_prev2;
            s_prev2 = s_prev1;
            s_prev1 = s;
        }
        s_prev2 * s_prev2 + s_prev1 * s_prev1 - coeff * s_prev1 * s_prev2
    }

    /// Frequency near `frequency_estimate` with the highest Goertzel power.
    ///
    /// Starts from `estimate +/- 10 Hz`, probes the interior points of four
    /// equal sub-intervals each round and keeps the two strongest
    /// frequencies as the next bounds. Stops once the interval is within
    /// [`GoertzelAnalyzer::accuracy_for`] or when a round leaves the bounds
    /// unchanged.
    pub fn find_frequency_with_highest_power(
        &self,
        samples: &[i16],
        frequency_estimate: f64,
    ) -> f64 {
        let samples = normalize(samples);
        self.refine(&samples, frequency_estimate)
    }

    /// Same as [`GoertzelAnalyzer::find_frequency_with_highest_power`] over
    /// already normalized samples.
    pub fn refine(&self, samples: &[f64], frequency_estimate: f64) -> f64 {
        let accuracy = Self::accuracy_for(frequency_estimate);

        let mut low = Probe::new(self, samples, frequency_estimate - SEARCH_RADIUS_HZ);
        let mut high = Probe::new(self, samples, frequency_estimate + SEARCH_RADIUS_HZ);

        for _ in 0..MAX_ITERATIONS {
            if high.frequency - low.frequency <= accuracy {
                break;
            }
            let step = (high.frequency - low.frequency) / SUBDIVISIONS as f64;
            let mut first = low;
            let mut second = high;
            if second.power > first.power {
                std::mem::swap(&mut first, &mut second);
            }
            for k in 1..SUBDIVISIONS {
                let probe = Probe::new(self, samples, low.frequency + step * k as f64);
                if probe.power > first.power {
                    second = first;
                    first = probe;
                } else if probe.power > second.power {
                    second = probe;
                }
            }

            let (next_low, next_high) = if first.frequency <= second.frequency {
                (first, second)
            } else {
                (second, first)
            };
            if next_low.frequency == low.frequency && next_high.frequency == high.frequency {
                break;
            }
            low = next_low;
            high = next_high;
        }

        if high.power > low.power {
            high.frequency
        } else {
            low.frequency
        }
    }
}

/// A probed frequency and its measured power.
#[derive(Debug, Clone, Copy)]
struct Probe {
    frequency: f64,
    power: f64,
}

impl Probe {
    fn new(analyzer: &GoertzelAnalyzer, samples: &[f64], frequency: f64) -> Self {
        Self {
            frequency,
            power: analyzer.power(samples, frequency),
        }
    }
}

/// Scales raw samples to `[-1, 1]`.
pub fn normalize(samples: &[i16]) -> Vec<f64> {
    let scale = f64::from(i16::MAX);
    samples.iter().map(|&s| f64::from(s) / scale).collect()
}
