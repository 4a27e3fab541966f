//! # Sound Utilities
//!
//! Level estimation and the equal-temperament piano table. The detector
//! itself only needs the level gate and the range bounds; the note lookups
//! are for front ends that want to show a note name next to a frequency.

use once_cell::sync::Lazy;

/// A0, the lowest key of a standard piano.
pub const LOWEST_PIANO_FREQUENCY: f64 = 27.5;

/// C8, the highest key of a standard piano.
pub const HIGHEST_PIANO_FREQUENCY: f64 = 4186.01;

const PIANO_KEYS: usize = 88;

/// A4 is the 49th key.
const A4_KEY_INDEX: usize = 48;

/// A single key of the piano table.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Note name with octave (e.g. "A4", "C#3").
    pub name: String,
    /// Key index, 0 (A0) to 87 (C8).
    pub key_index: u8,
    /// Equal-temperament frequency in Hz with A4 = 440 Hz.
    pub frequency: f64,
}

/// Statically computed notes for a standard 88-key piano (A0 to C8).
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
    ];
    (0..PIANO_KEYS)
        .map(|i| {
            let frequency = 440.0 * 2.0_f64.powf((i as f64 - A4_KEY_INDEX as f64) / 12.0);
            // The octave number changes at C, three keys above A.
            let octave = (i + 9) / 12;
            Note {
                name: format!("{}{}", NOTE_NAMES[i % 12], octave),
                key_index: i as u8,
                frequency,
            }
        })
        .collect()
});

/// All 88 piano notes, lowest first.
pub fn piano_notes() -> &'static [Note] {
    &NOTES
}

/// Looks up a key by its 0-based index.
pub fn note_by_key_index(key_index: u8) -> Option<&'static Note> {
    NOTES.get(key_index as usize)
}

/// The piano key closest to `frequency`, compared in cents so the choice
/// is symmetric in pitch rather than in hertz.
pub fn find_nearest_note(frequency: f64) -> Option<&'static Note> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    NOTES.iter().min_by(|a, b| {
        cents_deviation(frequency, a.frequency)
            .abs()
            .total_cmp(&cents_deviation(frequency, b.frequency).abs())
    })
}

/// Deviation of `frequency` from `target` in cents (positive = sharp).
pub fn cents_deviation(frequency: f64, target: f64) -> f64 {
    1200.0 * (frequency / target).log2()
}

/// Root mean square of raw 16-bit samples.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_of_squares / samples.len() as f64).sqrt()
}

/// Uncalibrated sound level, `20 * log10(rms)` over raw sample values.
///
/// Returns negative infinity for an empty or all-zero block.
pub fn decibels(samples: &[i16]) -> f64 {
    let rms = rms(samples);
    if rms > 0.0 {
        20.0 * rms.log10()
    } else {
        f64::NEG_INFINITY
    }
}
