pub mod event;
pub mod file;

pub use self::event::{EventKind, MidiEvent};
pub use self::file::{load, parse_bytes, MidiFileError, MidiSong};
