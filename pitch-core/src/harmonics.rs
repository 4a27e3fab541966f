//! # Harmonic Relationships
//!
//! Relates refined peaks to each other through small integer ratios and
//! turns those ratios into votes for a common fundamental.
//!
//! All functions work on the per-call arenas: `&[Peak]` indexed by
//! [`PeakId`] and `&[Harmonic]` indexed by [`HarmonicId`].

use log::trace;

use crate::peak::{Harmonic, HarmonicId, Peak, PeakId};

/// Largest allowed deviation between a frequency ratio and `b / a`.
pub const RATIO_TOLERANCE: f64 = 0.01;

/// Smallest exclusive upper bound for the ratio terms.
pub const MIN_MAX_HARMONIC: usize = 8;

/// Candidates whose rounded values are this close share a bucket.
pub const BUCKET_WIDTH_HZ: i64 = 10;

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Reduced fraction `b / a` closest to `ratio` with `1 <= a < b < max_harmonic`.
///
/// `None` if no fraction is within [`RATIO_TOLERANCE`].
pub fn closest_ratio(ratio: f64, max_harmonic: u32) -> Option<(u32, u32)> {
    let mut best: Option<(u32, u32, f64)> = None;
    for a in 1..max_harmonic {
        for b in (a + 1)..max_harmonic {
            if gcd(a, b) != 1 {
                continue;
            }
            let error = (ratio - f64::from(b) / f64::from(a)).abs();
            if error <= RATIO_TOLERANCE && best.is_none_or(|(_, _, e)| error < e) {
                best = Some((a, b, error));
            }
        }
    }
    best.map(|(a, b, _)| (a, b))
}

/// Registers a [`Harmonic`] for every pair of peaks whose frequency ratio
/// is close to a small reduced fraction.
///
/// Pairs are visited in ascending frequency order, so `peak_a` is always
/// the lower peak. Each new harmonic is linked from both of its peaks.
pub fn find_harmonics(peaks: &mut [Peak]) -> Vec<Harmonic> {
    let mut ascending: Vec<PeakId> = (0..peaks.len()).map(PeakId).collect();
    ascending.sort_by(|a, b| peaks[a.0].frequency().total_cmp(&peaks[b.0].frequency()));
    let max_harmonic = MIN_MAX_HARMONIC.max(peaks.len()) as u32;

    let mut harmonics = Vec::new();
    for (i, &low) in ascending.iter().enumerate() {
        let low_frequency = peaks[low.0].frequency();
        if low_frequency <= 0.0 {
            continue;
        }
        for &high in &ascending[i + 1..] {
            let ratio = peaks[high.0].frequency() / low_frequency;
            let Some((term_a, term_b)) = closest_ratio(ratio, max_harmonic) else {
                continue;
            };
            let id = HarmonicId(harmonics.len());
            trace!(
                "harmonic {}/{}: {:.2} Hz and {:.2} Hz (ratio {:.4})",
                term_b,
                term_a,
                low_frequency,
                peaks[high.0].frequency(),
                ratio
            );
            harmonics.push(Harmonic::new(low, high, term_a, term_b));
            peaks[low.0].add_harmonic(id);
            peaks[high.0].add_harmonic(id);
        }
    }
    harmonics
}

/// Smallest proper multiple of `term` among the terms `peak` holds in its
/// other harmonics, expressed as the multiplier.
fn multiplier_for(
    peaks: &[Peak],
    harmonics: &[Harmonic],
    skip: HarmonicId,
    peak: PeakId,
    term: u32,
) -> Option<u32> {
    peaks[peak.0]
        .harmonics()
        .iter()
        .filter(|&&id| id != skip)
        .filter_map(|id| harmonics[id.0].term_for(peak))
        .filter(|&other| other > term && other % term == 0)
        .min()
        .map(|other| other / term)
}

/// Reconciles each harmonic with finer ratios already known for its peaks.
///
/// For both ends of a harmonic, looks for the smallest larger term that is
/// an exact multiple of that end's term; both terms are scaled by the larger
/// of the two multipliers. Harmonics are processed in registration order and
/// see the adjustments made before them.
pub fn adjust_harmonics(peaks: &[Peak], harmonics: &mut [Harmonic]) {
    for index in 0..harmonics.len() {
        let id = HarmonicId(index);
        let harmonic = &harmonics[index];
        let multiplier = [
            multiplier_for(peaks, harmonics, id, harmonic.peak_a(), harmonic.term_a()),
            multiplier_for(peaks, harmonics, id, harmonic.peak_b(), harmonic.term_b()),
        ]
        .into_iter()
        .flatten()
        .max();
        if let Some(multiplier) = multiplier {
            trace!(
                "adjusting harmonic {}/{} by {}",
                harmonic.term_b(),
                harmonic.term_a(),
                multiplier
            );
            harmonics[index].adjust(multiplier);
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    key: i64,
    candidates: Vec<f64>,
}

/// Groups candidate fundamentals into 10 Hz buckets.
///
/// A candidate joins the first existing bucket whose key is within
/// [`BUCKET_WIDTH_HZ`] of its rounded value, otherwise it opens a new one.
/// Buckets are never merged afterwards, so the grouping depends on
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct FundamentalVote {
    buckets: Vec<Bucket>,
}

impl FundamentalVote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one candidate; non-finite and non-positive values are ignored.
    pub fn insert(&mut self, candidate: f64) {
        if !candidate.is_finite() || candidate <= 0.0 {
            return;
        }
        let key = candidate.round() as i64;
        match self
            .buckets
            .iter_mut()
            .find(|bucket| (bucket.key - key).abs() <= BUCKET_WIDTH_HZ)
        {
            Some(bucket) => bucket.candidates.push(candidate),
            None => self.buckets.push(Bucket {
                key,
                candidates: vec![candidate],
            }),
        }
    }

    /// Number of candidates accepted so far.
    pub fn total_votes(&self) -> usize {
        self.buckets.iter().map(|b| b.candidates.len()).sum()
    }

    /// Mean of the fullest bucket and its vote count.
    ///
    /// Ties go to the bucket created first.
    pub fn winner(&self) -> Option<(f64, usize)> {
        let mut best: Option<&Bucket> = None;
        for bucket in &self.buckets {
            if best.is_none_or(|b| bucket.candidates.len() > b.candidates.len()) {
                best = Some(bucket);
            }
        }
        let bucket = best?;
        let votes = bucket.candidates.len();
        if votes == 0 {
            return None;
        }
        Some((bucket.candidates.iter().sum::<f64>() / votes as f64, votes))
    }
}

/// Collects `freq(peak_a) / term_a` and `freq(peak_b) / term_b` from every
/// harmonic and returns the winning fundamental with its vote count.
pub fn vote_fundamental(peaks: &[Peak], harmonics: &[Harmonic]) -> Option<(f64, usize)> {
    let mut vote = FundamentalVote::new();
    for harmonic in harmonics {
        vote.insert(peaks[harmonic.peak_a().0].frequency() / f64::from(harmonic.term_a()));
        vote.insert(peaks[harmonic.peak_b().0].frequency() / f64::from(harmonic.term_b()));
    }
    vote.winner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refined_peaks(frequencies: &[f64]) -> Vec<Peak> {
        frequencies
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let mut peak = Peak::new(i * 10 + 5, f, 1.0, 2.0);
                peak.set_goertzel_frequency(f);
                peak
            })
            .collect()
    }

    #[test]
    fn closest_ratio_prefers_reduced_fractions() {
        assert_eq!(closest_ratio(2.004, 8), Some((1, 2)));
        assert_eq!(closest_ratio(1.5, 8), Some((2, 3)));
        assert_eq!(closest_ratio(1.3333, 8), Some((3, 4)));
        assert_eq!(closest_ratio(7.0, 8), Some((1, 7)));
        // Terms must stay below the bound.
        assert_eq!(closest_ratio(8.0, 8), None);
        assert_eq!(closest_ratio(8.0, 9), Some((1, 8)));
        // 5/4 and 6/5 are both more than 0.01 away.
        assert_eq!(closest_ratio(1.23, 8), None);
    }

    #[test]
    fn harmonics_link_both_peaks() {
        // Strength order differs from frequency order on purpose.
        let mut peaks = refined_peaks(&[440.0, 220.0]);
        let harmonics = find_harmonics(&mut peaks);
        assert_eq!(harmonics.len(), 1);
        let h = &harmonics[0];
        assert_eq!((h.peak_a(), h.peak_b()), (PeakId(1), PeakId(0)));
        assert_eq!((h.term_a(), h.term_b()), (1, 2));
        assert_eq!(peaks[0].harmonics(), &[HarmonicId(0)]);
        assert_eq!(peaks[1].harmonics(), &[HarmonicId(0)]);
    }

    #[test]
    fn unrelated_peaks_have_no_harmonics() {
        let mut peaks = refined_peaks(&[300.0, 369.0]);
        assert!(find_harmonics(&mut peaks).is_empty());
        assert!(peaks.iter().all(|p| p.harmonics().is_empty()));
        assert_eq!(vote_fundamental(&peaks, &[]), None);
    }

    #[test]
    fn adjustment_rescales_octave_between_overtones() {
        let mut peaks = refined_peaks(&[220.0, 440.0, 660.0, 880.0]);
        let mut harmonics = find_harmonics(&mut peaks);
        assert_eq!(harmonics.len(), 6);

        // 880/440 is first seen as 2/1.
        let octave = harmonics
            .iter()
            .position(|h| h.peak_a() == PeakId(1) && h.peak_b() == PeakId(3))
            .unwrap();
        assert_eq!((harmonics[octave].term_a(), harmonics[octave].term_b()), (1, 2));

        adjust_harmonics(&peaks, &mut harmonics);
        assert_eq!((harmonics[octave].term_a(), harmonics[octave].term_b()), (2, 4));

        let (fundamental, votes) = vote_fundamental(&peaks, &harmonics).unwrap();
        assert!((fundamental - 220.0).abs() < 1e-9);
        assert_eq!(votes, 12);
    }

    #[test]
    fn buckets_merge_on_first_match_only() {
        let mut vote = FundamentalVote::new();
        for candidate in [100.0, 108.0, 116.0, 95.0] {
            vote.insert(candidate);
        }
        // 116 opened its own bucket even though 108 is within 10 Hz of it.
        assert_eq!(vote.total_votes(), 4);
        let (mean, votes) = vote.winner().unwrap();
        assert_eq!(votes, 3);
        assert!((mean - 101.0).abs() < 1e-9);
    }

    #[test]
    fn ties_go_to_the_earliest_bucket() {
        let mut vote = FundamentalVote::new();
        vote.insert(300.0);
        vote.insert(150.0);
        vote.insert(f64::NAN);
        vote.insert(0.0);
        assert_eq!(vote.winner(), Some((300.0, 1)));
        assert_eq!(FundamentalVote::new().winner(), None);
    }
}
