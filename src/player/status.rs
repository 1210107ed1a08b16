use std::fmt;

/// Human-readable playback state shown in the control panel.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    /// Waiting out the pre-roll of `seconds`.
    Starting { seconds: f64 },
    /// `seconds` is the song length at the speed in effect when playback began.
    Playing { seconds: f64 },
    Stopping,
    Stopped,
    Finished,
    AlreadyPlaying,
    Error(String),
}

impl Status {
    /// Whether this status ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Stopped | Status::Finished | Status::Error(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "Idle."),
            Status::Starting { seconds } => {
                write!(f, "Starting in {:.0}s… focus the game/app window.", seconds)
            }
            Status::Playing { seconds } => {
                let total = seconds.max(0.0).round() as u64;
                write!(f, "Playing… (F3 stop)  {}:{:02}", total / 60, total % 60)
            }
            Status::Stopping => write!(f, "Stopping..."),
            Status::Stopped => write!(f, "Stopped."),
            Status::Finished => write!(f, "Finished."),
            Status::AlreadyPlaying => write!(f, "Already playing. Press F3 to stop."),
            Status::Error(message) => write!(f, "Error: {}", message),
        }
    }
}
