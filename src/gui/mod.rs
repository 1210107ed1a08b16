mod app;

pub use self::app::MidiKeysApp;
