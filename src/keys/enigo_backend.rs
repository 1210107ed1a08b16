use super::{OutputDevice, OutputError};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};

/// Sends key events to whichever window has focus.
pub struct EnigoBackend {
    enigo: Enigo,
}

impl EnigoBackend {
    pub fn new() -> Result<Self, OutputError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| OutputError::Unavailable(e.to_string()))?;
        log::debug!("Keyboard output connected");
        Ok(Self { enigo })
    }

    /// Boxed constructor for callers that pick the device at runtime.
    pub fn connect() -> Result<Box<dyn OutputDevice>, OutputError> {
        Ok(Box::new(Self::new()?))
    }
}

impl OutputDevice for EnigoBackend {
    fn press(&mut self, key: char) -> Result<(), OutputError> {
        self.enigo
            .key(Key::Unicode(key), Direction::Press)
            .map_err(|e| OutputError::Press { key, reason: e.to_string() })
    }

    fn release(&mut self, key: char) -> Result<(), OutputError> {
        self.enigo
            .key(Key::Unicode(key), Direction::Release)
            .map_err(|e| OutputError::Release { key, reason: e.to_string() })
    }
}
