use crate::keys::KeyLayout;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

pub const SPEED_RANGE: RangeInclusive<f64> = 0.2..=3.0;
pub const SPEED_STEP: f64 = 0.05;
pub const TRANSPOSE_RANGE: RangeInclusive<i32> = -48..=48;
pub const DEFAULT_REFERENCE_NOTE: u8 = 60;

/// How a flushed note turns into key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Articulation {
    /// Hold the key until the note ends.
    #[default]
    Hold,
    /// Press and release at once; note lengths are ignored.
    Tap,
}

#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Note-ons closer together than this are pressed as one chord
    pub chord_window: Duration,
    /// Delay before the first note so the target window can be focused
    pub pre_roll: Duration,
    /// Longest single sleep between stop-flag checks
    pub sleep_quantum: Duration,
    pub layout: KeyLayout,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chord_window: Duration::from_millis(30),
            pre_roll: Duration::from_secs(2),
            sleep_quantum: Duration::from_millis(20),
            layout: KeyLayout::default(),
        }
    }
}

/// Per-run parameters picked in the control panel.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSettings {
    pub path: PathBuf,
    /// MIDI note played by the lower-row DO key
    pub reference_note: u8,
    /// Semitones added to the reference note
    pub transpose: i32,
    pub articulation: Articulation,
}

impl PlaybackSettings {
    /// Reference note with the transpose applied.
    pub fn effective_reference(&self) -> i32 {
        self.reference_note as i32 + self.transpose
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            reference_note: DEFAULT_REFERENCE_NOTE,
            transpose: 0,
            articulation: Articulation::Hold,
        }
    }
}
