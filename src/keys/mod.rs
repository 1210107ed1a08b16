mod enigo_backend;
pub mod layout;

pub use self::enigo_backend::EnigoBackend;
pub use self::layout::{Band, KeyLayout};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("keyboard output unavailable: {0}")]
    Unavailable(String),
    #[error("failed to press '{key}': {reason}")]
    Press { key: char, reason: String },
    #[error("failed to release '{key}': {reason}")]
    Release { key: char, reason: String },
}

/// Something that can hold keys down on the user's behalf.
pub trait OutputDevice {
    fn press(&mut self, key: char) -> Result<(), OutputError>;
    fn release(&mut self, key: char) -> Result<(), OutputError>;
}

impl<D: OutputDevice + ?Sized> OutputDevice for Box<D> {
    fn press(&mut self, key: char) -> Result<(), OutputError> {
        (**self).press(key)
    }

    fn release(&mut self, key: char) -> Result<(), OutputError> {
        (**self).release(key)
    }
}
