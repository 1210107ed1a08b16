/// Scale degree (1 = DO) for each pitch class of the major scale.
const MAJOR_DEGREES: [Option<u8>; 12] = [
    Some(1),
    None,
    Some(2),
    None,
    Some(3),
    Some(4),
    None,
    Some(5),
    None,
    Some(6),
    None,
    Some(7),
];

/// Register a note lands in, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    Lower,
    Upper,
    /// Only DO two octaves above the reference uses this.
    DoubleHigh,
}

impl Band {
    /// Octave 0 and below share the lower row; everything from octave 2 up
    /// reuses the upper row except DO, which gets its own key.
    pub fn select(octave: i32, degree: u8) -> Self {
        match octave {
            o if o <= 0 => Band::Lower,
            1 => Band::Upper,
            _ if degree == 1 => Band::DoubleHigh,
            _ => Band::Upper,
        }
    }
}

/// The 15 keys an in-game instrument listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    pub lower: [char; 7],
    pub upper: [char; 7],
    pub double_high: char,
}

impl KeyLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Degree of `note` within the major scale built on `reference`, and the
    /// octave it sits in relative to `reference`.
    pub fn degree(note: u8, reference: i32) -> Option<(u8, i32)> {
        let diff = note as i32 - reference;
        let octave = diff.div_euclid(12);
        let pitch_class = diff.rem_euclid(12) as usize;
        MAJOR_DEGREES[pitch_class].map(|degree| (degree, octave))
    }

    pub fn key(&self, degree: u8, band: Band) -> char {
        let idx = (degree.clamp(1, 7) - 1) as usize;
        match band {
            Band::Lower => self.lower[idx],
            Band::Upper => self.upper[idx],
            Band::DoubleHigh => self.double_high,
        }
    }

    /// Key for a MIDI note, or `None` for notes outside the major scale.
    pub fn map(&self, note: u8, reference: i32) -> Option<char> {
        let (degree, octave) = Self::degree(note, reference)?;
        Some(self.key(degree, Band::select(octave, degree)))
    }

    pub fn keys(&self) -> impl Iterator<Item = char> + '_ {
        self.lower
            .iter()
            .chain(self.upper.iter())
            .copied()
            .chain(std::iter::once(self.double_high))
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            lower: ['a', 's', 'd', 'f', 'g', 'h', 'j'],
            upper: ['q', 'w', 'e', 'r', 't', 'y', 'u'],
            double_high: 'i',
        }
    }
}
