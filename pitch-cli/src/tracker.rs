//! Cross-block smoothing owned by the caller.
//!
//! The detector is stateless; anything that depends on earlier blocks
//! (spike rejection, display smoothing) lives here.

use pitch_core::MovingAverage;

/// New estimates further than this fraction from the last accepted one are spikes.
const SPIKE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackEvent {
    Accepted(f64),
    /// Discarded as a jump away from the current pitch.
    Spike(f64),
    /// Enough consecutive spikes agreed that the pitch really changed.
    Relocked(f64),
}

#[derive(Debug, Clone)]
pub struct PitchTracker {
    last_accepted: Option<f64>,
    consecutive_spikes: usize,
    spikes_before_relock: usize,
    smoothing: MovingAverage,
}

impl PitchTracker {
    pub fn new(smoothing_window: usize, spikes_before_relock: usize) -> Self {
        Self {
            last_accepted: None,
            consecutive_spikes: 0,
            spikes_before_relock,
            smoothing: MovingAverage::new(smoothing_window),
        }
    }

    pub fn update(&mut self, frequency: f64) -> TrackEvent {
        let Some(last) = self.last_accepted else {
            self.accept(frequency);
            return TrackEvent::Accepted(frequency);
        };

        if ((frequency - last) / last).abs() <= SPIKE_RATIO {
            self.consecutive_spikes = 0;
            self.accept(frequency);
            return TrackEvent::Accepted(frequency);
        }

        self.consecutive_spikes += 1;
        if self.consecutive_spikes > self.spikes_before_relock {
            self.reset();
            self.accept(frequency);
            TrackEvent::Relocked(frequency)
        } else {
            TrackEvent::Spike(frequency)
        }
    }

    /// Smoothed pitch for display.
    pub fn display(&self) -> Option<f64> {
        (!self.smoothing.is_empty()).then(|| self.smoothing.average())
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.consecutive_spikes = 0;
        self.smoothing.clear();
    }

    fn accept(&mut self, frequency: f64) {
        self.last_accepted = Some(frequency);
        self.smoothing.insert(frequency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_estimate_is_accepted() {
        let mut tracker = PitchTracker::new(3, 2);
        assert_eq!(tracker.display(), None);
        assert_eq!(tracker.update(440.0), TrackEvent::Accepted(440.0));
        assert_eq!(tracker.display(), Some(440.0));
    }

    #[test]
    fn octave_jumps_are_spikes() {
        let mut tracker = PitchTracker::new(3, 2);
        tracker.update(220.0);
        assert_eq!(tracker.update(440.0), TrackEvent::Spike(440.0));
        assert_eq!(tracker.update(225.0), TrackEvent::Accepted(225.0));
        assert_eq!(tracker.display(), Some(222.5));
    }

    #[test]
    fn persistent_change_relocks() {
        let mut tracker = PitchTracker::new(3, 2);
        tracker.update(100.0);
        assert_eq!(tracker.update(300.0), TrackEvent::Spike(300.0));
        assert_eq!(tracker.update(301.0), TrackEvent::Spike(301.0));
        assert_eq!(tracker.update(302.0), TrackEvent::Relocked(302.0));
        assert_eq!(tracker.display(), Some(302.0));
        assert_eq!(tracker.update(303.0), TrackEvent::Accepted(303.0));
    }
}
