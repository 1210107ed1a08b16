use super::event::MidiEvent;
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tempo assumed until the first tempo meta event (120 BPM).
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Debug, Error)]
pub enum MidiFileError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a valid MIDI file: {0}")]
    Parse(#[from] midly::Error),
    #[error("unsupported time division: {0} ticks per beat")]
    InvalidTiming(u16),
}

/// A MIDI file flattened into a single stream of timed events.
#[derive(Debug, Clone, Default)]
pub struct MidiSong {
    pub events: Vec<MidiEvent>,
}

impl MidiSong {
    /// Length of the stream in seconds at normal speed.
    pub fn duration(&self) -> f64 {
        self.events.iter().map(|e| e.delta).sum()
    }

    pub fn note_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_attack()).count()
    }
}

/// Stream element before tick positions are turned into seconds.
enum Flat {
    Event(MidiEvent),
    Tempo(u32),
}

/// Read and flatten a MIDI file from disk.
pub fn load(path: impl AsRef<Path>) -> Result<MidiSong, MidiFileError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| MidiFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let song = parse_bytes(&bytes)?;
    log::info!(
        "Loaded {}: {} notes, {:.1}s",
        path.display(),
        song.note_count(),
        song.duration()
    );
    Ok(song)
}

/// Parse SMF bytes and merge every track into one time-ordered stream.
///
/// Parallel files (format 0 and 1) are merged by absolute tick, keeping track
/// order for events on the same tick. Sequential files (format 2) play their
/// tracks one after the other. Tempo changes apply to the whole stream from
/// the tick they occur on.
pub fn parse_bytes(bytes: &[u8]) -> Result<MidiSong, MidiFileError> {
    let smf = Smf::parse(bytes)?;

    let mut flat: Vec<(u64, Flat)> = Vec::new();
    let mut track_offset = 0u64;
    for track in &smf.tracks {
        let mut tick = track_offset;
        for event in track {
            tick += event.delta.as_int() as u64;
            if let Some(item) = flatten_kind(&event.kind) {
                flat.push((tick, item));
            }
        }
        if smf.header.format == Format::Sequential {
            track_offset = tick;
        }
    }

    // Stable, so events sharing a tick keep their track order
    flat.sort_by_key(|(tick, _)| *tick);

    let mut clock = TickClock::new(smf.header.timing)?;
    let mut events = Vec::with_capacity(flat.len());
    let mut last_tick = 0u64;
    let mut now = 0.0f64;
    let mut last_emitted = 0.0f64;

    for (tick, item) in flat {
        now += clock.seconds(tick - last_tick);
        last_tick = tick;

        let delta = now - last_emitted;
        last_emitted = now;
        match item {
            Flat::Event(mut ev) => {
                ev.delta = delta;
                events.push(ev);
            }
            Flat::Tempo(us_per_beat) => {
                clock.tempo_us = us_per_beat;
                events.push(MidiEvent::other(delta));
            }
        }
    }

    Ok(MidiSong { events })
}

fn flatten_kind(kind: &TrackEventKind<'_>) -> Option<Flat> {
    match kind {
        TrackEventKind::Midi { message, .. } => Some(Flat::Event(match *message {
            MidiMessage::NoteOn { key, vel } => MidiEvent::note_on(key.as_int(), vel.as_int(), 0.0),
            MidiMessage::NoteOff { key, .. } => MidiEvent::note_off(key.as_int(), 0.0),
            _ => MidiEvent::other(0.0),
        })),
        TrackEventKind::Meta(MetaMessage::Tempo(us)) => Some(Flat::Tempo(us.as_int())),
        // End-of-track markers only delimit chunks
        TrackEventKind::Meta(MetaMessage::EndOfTrack) => None,
        _ => Some(Flat::Event(MidiEvent::other(0.0))),
    }
}

/// Converts tick counts to seconds under the current tempo.
struct TickClock {
    timing: Timing,
    tempo_us: u32,
}

impl TickClock {
    fn new(timing: Timing) -> Result<Self, MidiFileError> {
        if let Timing::Metrical(ppq) = timing {
            if ppq.as_int() == 0 {
                return Err(MidiFileError::InvalidTiming(0));
            }
        }
        Ok(Self { timing, tempo_us: DEFAULT_TEMPO_US })
    }

    fn seconds(&self, ticks: u64) -> f64 {
        if ticks == 0 {
            return 0.0;
        }
        match self.timing {
            Timing::Metrical(ppq) => {
                ticks as f64 * self.tempo_us as f64 / 1_000_000.0 / ppq.as_int() as f64
            }
            Timing::Timecode(fps, subframes) => {
                let per_second = fps.as_f32() as f64 * subframes.max(1) as f64;
                ticks as f64 / per_second
            }
        }
    }
}
