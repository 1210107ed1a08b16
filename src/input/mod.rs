pub mod hotkeys;

pub use self::hotkeys::{spawn_listener, Hotkey, HotkeyTracker};
