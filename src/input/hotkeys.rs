use device_query::{DeviceQuery, DeviceState, Keycode};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hotkey {
    Start,
    Stop,
}

/// Turns polled keyboard snapshots into hotkey presses.
///
/// Only the up→down edge fires, so holding F4 starts playback once.
pub struct HotkeyTracker {
    bindings: HashMap<Keycode, Hotkey>,
    key_states: HashMap<Keycode, bool>,
}

impl HotkeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings(bindings: impl IntoIterator<Item = (Keycode, Hotkey)>) -> Self {
        let bindings: HashMap<Keycode, Hotkey> = bindings.into_iter().collect();
        let key_states = bindings.keys().map(|key| (*key, false)).collect();
        Self { bindings, key_states }
    }

    /// Feed the currently pressed keys; returns the hotkeys that just went down.
    pub fn update(&mut self, keys: &[Keycode]) -> Vec<Hotkey> {
        let mut fired = Vec::new();
        for (key, hotkey) in &self.bindings {
            let is_pressed = keys.contains(key);
            let was_pressed = self.key_states.get(key).cloned().unwrap_or(false);

            if is_pressed && !was_pressed {
                log::debug!("Hotkey {:?} pressed ({:?})", key, hotkey);
                fired.push(*hotkey);
            }
            self.key_states.insert(*key, is_pressed);
        }
        fired
    }
}

impl Default for HotkeyTracker {
    fn default() -> Self {
        Self::with_bindings([(Keycode::F4, Hotkey::Start), (Keycode::F3, Hotkey::Stop)])
    }
}

/// Poll the global keyboard state on a background thread.
///
/// Hotkeys go to `sender`; `wake` is called after each send so the receiving
/// event loop can pick them up. The thread exits once the receiver is gone.
pub fn spawn_listener(
    sender: Sender<Hotkey>,
    wake: impl Fn() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("hotkeys".into())
        .spawn(move || {
            let device_state = DeviceState::new();
            let mut tracker = HotkeyTracker::new();
            loop {
                let keys: Vec<Keycode> = device_state.get_keys();
                for hotkey in tracker.update(&keys) {
                    if sender.send(hotkey).is_err() {
                        log::debug!("Hotkey receiver dropped, listener exiting");
                        return;
                    }
                    wake();
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        })
}
