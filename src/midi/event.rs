use std::fmt;

/// What a flattened MIDI message means to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// Controllers, program changes, meta events and the like. They carry no
    /// note but still mark a point in time.
    Other,
}

/// One message of the merged, time-ordered stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    pub kind: EventKind,
    pub note: u8,
    pub velocity: u8,
    /// Seconds since the previous event in the stream
    pub delta: f64,
}

impl MidiEvent {
    pub fn note_on(note: u8, velocity: u8, delta: f64) -> Self {
        Self { kind: EventKind::NoteOn, note, velocity, delta }
    }

    pub fn note_off(note: u8, delta: f64) -> Self {
        Self { kind: EventKind::NoteOff, note, velocity: 0, delta }
    }

    pub fn other(delta: f64) -> Self {
        Self { kind: EventKind::Other, note: 0, velocity: 0, delta }
    }

    /// A note-on that actually starts a note.
    pub fn is_attack(&self) -> bool {
        self.kind == EventKind::NoteOn && self.velocity > 0
    }

    /// A note-off, or a note-on with velocity 0 used as one.
    pub fn is_release(&self) -> bool {
        match self.kind {
            EventKind::NoteOff => true,
            EventKind::NoteOn => self.velocity == 0,
            EventKind::Other => false,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::NoteOn => write!(f, "note_on note={} vel={} +{:.3}s", self.note, self.velocity, self.delta),
            EventKind::NoteOff => write!(f, "note_off note={} +{:.3}s", self.note, self.delta),
            EventKind::Other => write!(f, "other +{:.3}s", self.delta),
        }
    }
}
