//! # Peaks and Harmonics
//!
//! Value objects shared by the FFT stage and the harmonic analysis.
//! Cross links between the two are plain indices into per-call arenas
//! (`Vec<Peak>` and `Vec<Harmonic>`), so nothing here outlives one
//! detection call and there is no shared ownership to untangle.

use std::hash::{Hash, Hasher};

/// Index of a [`Peak`] in the peak arena of one analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeakId(pub usize);

/// Index of a [`Harmonic`] in the harmonic arena of one analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HarmonicId(pub usize);

/// A local maximum of the magnitude spectrum.
///
/// Identity is the FFT bin (`fft_index`), which is only meaningful within
/// the bin numbering of a single call.
#[derive(Debug, Clone)]
pub struct Peak {
    fft_index: usize,
    frequency_estimate: f64,
    fft_magnitude: f64,
    fft_prominence: f64,
    goertzel_frequency: f64,
    harmonics: Vec<HarmonicId>,
}

impl Peak {
    pub fn new(
        fft_index: usize,
        frequency_estimate: f64,
        fft_magnitude: f64,
        fft_prominence: f64,
    ) -> Self {
        Self {
            fft_index,
            frequency_estimate,
            fft_magnitude,
            fft_prominence,
            goertzel_frequency: 0.0,
            harmonics: Vec::new(),
        }
    }

    pub fn fft_index(&self) -> usize {
        self.fft_index
    }

    /// Center frequency of the peak's bin.
    pub fn frequency_estimate(&self) -> f64 {
        self.frequency_estimate
    }

    pub fn fft_magnitude(&self) -> f64 {
        self.fft_magnitude
    }

    pub fn fft_prominence(&self) -> f64 {
        self.fft_prominence
    }

    /// Ranking score: magnitude scaled by prominence.
    pub fn fft_value(&self) -> f64 {
        self.fft_magnitude * self.fft_prominence
    }

    /// Refined frequency, 0.0 until [`Peak::set_goertzel_frequency`] runs.
    pub fn goertzel_frequency(&self) -> f64 {
        self.goertzel_frequency
    }

    pub fn set_goertzel_frequency(&mut self, frequency: f64) {
        self.goertzel_frequency = frequency;
    }

    /// The refined frequency when available, else the bin estimate.
    pub fn frequency(&self) -> f64 {
        if self.goertzel_frequency > 0.0 {
            self.goertzel_frequency
        } else {
            self.frequency_estimate
        }
    }

    /// Harmonics this peak takes part in, in registration order.
    pub fn harmonics(&self) -> &[HarmonicId] {
        &self.harmonics
    }

    pub(crate) fn add_harmonic(&mut self, id: HarmonicId) {
        self.harmonics.push(id);
    }
}

impl PartialEq for Peak {
    fn eq(&self, other: &Self) -> bool {
        self.fft_index == other.fft_index
    }
}

impl Eq for Peak {}

impl Hash for Peak {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fft_index.hash(state);
    }
}

/// A ratio `term_b / term_a` approximating `freq(peak_b) / freq(peak_a)`.
///
/// `peak_a` is always the lower of the two peaks, so `term_a < term_b`.
/// Equality is the `(peak_a, peak_b)` pair; the terms may be rescaled by
/// [`Harmonic::adjust`].
#[derive(Debug, Clone)]
pub struct Harmonic {
    peak_a: PeakId,
    peak_b: PeakId,
    term_a: u32,
    term_b: u32,
}

impl Harmonic {
    pub fn new(peak_a: PeakId, peak_b: PeakId, term_a: u32, term_b: u32) -> Self {
        Self {
            peak_a,
            peak_b,
            term_a,
            term_b,
        }
    }

    pub fn peak_a(&self) -> PeakId {
        self.peak_a
    }

    pub fn peak_b(&self) -> PeakId {
        self.peak_b
    }

    pub fn term_a(&self) -> u32 {
        self.term_a
    }

    pub fn term_b(&self) -> u32 {
        self.term_b
    }

    /// The term this harmonic assigns to `peak`, if it references it.
    pub fn term_for(&self, peak: PeakId) -> Option<u32> {
        if peak == self.peak_a {
            Some(self.term_a)
        } else if peak == self.peak_b {
            Some(self.term_b)
        } else {
            None
        }
    }

    /// Scales both terms by `multiplier`, keeping the ratio.
    pub fn adjust(&mut self, multiplier: u32) {
        self.term_a *= multiplier;
        self.term_b *= multiplier;
    }
}

impl PartialEq for Harmonic {
    fn eq(&self, other: &Self) -> bool {
        self.peak_a == other.peak_a && self.peak_b == other.peak_b
    }
}

impl Eq for Harmonic {}

impl Hash for Harmonic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.peak_a.hash(state);
        self.peak_b.hash(state);
    }
}
