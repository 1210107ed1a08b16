use super::clock::Clock;
use super::config::{Articulation, PlaybackSettings, PlayerConfig};
use super::shared::{SpeedControl, StopFlag};
use crate::keys::{KeyLayout, OutputDevice};
use crate::midi::MidiEvent;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Stopped,
}

/// Turns a timed event stream into key presses on an output device.
///
/// Owns the set of held keys for the whole run. Every exit from [`play`],
/// including a panic unwinding through it, leaves that set empty with each
/// key released.
///
/// [`play`]: Scheduler::play
pub struct Scheduler<D: OutputDevice, C: Clock> {
    device: D,
    clock: C,
    layout: KeyLayout,
    chord_window: f64,
    sleep_quantum: Duration,
    reference: i32,
    articulation: Articulation,
    speed: Arc<SpeedControl>,
    stop: StopFlag,
    held_keys: HashSet<char>,
    pending_chord: Vec<MidiEvent>,
    pending_elapsed: f64,
}

impl<D: OutputDevice, C: Clock> Scheduler<D, C> {
    pub fn new(
        device: D,
        clock: C,
        config: &PlayerConfig,
        settings: &PlaybackSettings,
        speed: Arc<SpeedControl>,
        stop: StopFlag,
    ) -> Self {
        Self {
            device,
            clock,
            layout: config.layout.clone(),
            chord_window: config.chord_window.as_secs_f64(),
            // A zero quantum would never make progress
            sleep_quantum: config.sleep_quantum.max(Duration::from_millis(1)),
            reference: settings.effective_reference(),
            articulation: settings.articulation,
            speed,
            stop,
            held_keys: HashSet::new(),
            pending_chord: Vec::new(),
            pending_elapsed: 0.0,
        }
    }

    pub fn held_keys(&self) -> &HashSet<char> {
        &self.held_keys
    }

    /// Wait out the pre-roll. Returns `false` if a stop arrived meanwhile.
    pub fn pre_roll(&mut self, duration: Duration) -> bool {
        self.sleep(duration);
        !self.stop.is_set()
    }

    /// Play `events` in order until the end of the stream or a stop request.
    pub fn play(&mut self, events: &[MidiEvent]) -> Outcome {
        for event in events {
            if self.stop.is_set() {
                break;
            }

            // One sample per event keeps the chord window and the sleep consistent
            let delay = event.delta * self.speed.get();
            if delay > 0.0 {
                self.pending_elapsed += delay;
                if !self.pending_chord.is_empty() && self.pending_elapsed >= self.chord_window {
                    self.flush_chord();
                }
                if let Ok(duration) = Duration::try_from_secs_f64(delay) {
                    self.sleep(duration);
                }
                if self.stop.is_set() {
                    break;
                }
            }

            if event.is_attack() {
                if self.pending_chord.is_empty() {
                    self.pending_elapsed = 0.0;
                }
                self.pending_chord.push(*event);
                continue;
            }

            if !self.pending_chord.is_empty() {
                self.flush_chord();
            }

            if event.is_release() {
                self.release_note(event.note);
            }
        }

        self.finish();

        if self.stop.is_set() {
            Outcome::Stopped
        } else {
            Outcome::Finished
        }
    }

    /// Release every held key. Failures are logged and do not stop the rest.
    pub fn release_all(&mut self) {
        for key in self.held_keys.drain() {
            if let Err(e) = self.device.release(key) {
                log::warn!("{}", e);
            }
        }
    }

    fn finish(&mut self) {
        if !self.pending_chord.is_empty() {
            self.flush_chord();
        }
        self.release_all();
        self.pending_elapsed = 0.0;
    }

    /// Sleep in quantum-sized steps so a stop request is seen promptly.
    fn sleep(&mut self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !self.stop.is_set() {
            let step = remaining.min(self.sleep_quantum);
            self.clock.sleep(step);
            remaining -= step;
        }
    }

    fn flush_chord(&mut self) {
        let chord = std::mem::take(&mut self.pending_chord);
        self.pending_elapsed = 0.0;

        let mut pressed = Vec::with_capacity(chord.len());
        for event in &chord {
            let Some(key) = self.layout.map(event.note, self.reference) else {
                continue;
            };
            if self.held_keys.contains(&key) {
                continue;
            }
            if let Err(e) = self.device.press(key) {
                log::warn!("{}", e);
                continue;
            }
            match self.articulation {
                Articulation::Hold => {
                    self.held_keys.insert(key);
                }
                Articulation::Tap => {
                    if let Err(e) = self.device.release(key) {
                        // Keep it so the shutdown pass retries the release
                        log::warn!("{}", e);
                        self.held_keys.insert(key);
                    }
                }
            }
            pressed.push(key);
        }

        if !pressed.is_empty() {
            log::debug!("chord {:?}", pressed);
        }
    }

    fn release_note(&mut self, note: u8) {
        let Some(key) = self.layout.map(note, self.reference) else {
            return;
        };
        if !self.held_keys.contains(&key) {
            return;
        }
        match self.device.release(key) {
            Ok(()) => {
                self.held_keys.remove(&key);
            }
            Err(e) => log::warn!("{}", e),
        }
    }
}

impl<D: OutputDevice, C: Clock> Drop for Scheduler<D, C> {
    fn drop(&mut self) {
        if !self.held_keys.is_empty() {
            log::warn!("Releasing {} keys left down", self.held_keys.len());
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::OutputError;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Op {
        Press(char),
        Release(char),
    }

    type Log = Rc<RefCell<Vec<(f64, Op)>>>;

    struct Recorder {
        now: Rc<Cell<f64>>,
        log: Log,
        failing_releases: Vec<char>,
        panic_on_press: Option<char>,
    }

    impl OutputDevice for Recorder {
        fn press(&mut self, key: char) -> Result<(), OutputError> {
            if self.panic_on_press == Some(key) {
                panic!("device exploded on '{key}'");
            }
            self.log.borrow_mut().push((self.now.get(), Op::Press(key)));
            Ok(())
        }

        fn release(&mut self, key: char) -> Result<(), OutputError> {
            self.log.borrow_mut().push((self.now.get(), Op::Release(key)));
            if self.failing_releases.contains(&key) {
                return Err(OutputError::Release { key, reason: "stuck".into() });
            }
            Ok(())
        }
    }

    /// Advances virtual time instead of sleeping.
    struct VirtualClock {
        now: Rc<Cell<f64>>,
        longest_step: Rc<Cell<f64>>,
        on_tick: Box<dyn FnMut(f64)>,
    }

    impl Clock for VirtualClock {
        fn sleep(&mut self, duration: Duration) {
            let step = duration.as_secs_f64();
            self.longest_step.set(self.longest_step.get().max(step));
            self.now.set(self.now.get() + step);
            (self.on_tick)(self.now.get());
        }
    }

    struct Rig {
        now: Rc<Cell<f64>>,
        longest_step: Rc<Cell<f64>>,
        log: Log,
        speed: Arc<SpeedControl>,
        stop: StopFlag,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                now: Rc::new(Cell::new(0.0)),
                longest_step: Rc::new(Cell::new(0.0)),
                log: Rc::new(RefCell::new(Vec::new())),
                speed: Arc::new(SpeedControl::default()),
                stop: StopFlag::new(),
            }
        }

        fn scheduler(
            &self,
            settings: &PlaybackSettings,
            on_tick: impl FnMut(f64) + 'static,
        ) -> Scheduler<Recorder, VirtualClock> {
            self.scheduler_with(settings, Vec::new(), None, on_tick)
        }

        fn scheduler_with(
            &self,
            settings: &PlaybackSettings,
            failing_releases: Vec<char>,
            panic_on_press: Option<char>,
            on_tick: impl FnMut(f64) + 'static,
        ) -> Scheduler<Recorder, VirtualClock> {
            let device = Recorder {
                now: self.now.clone(),
                log: self.log.clone(),
                failing_releases,
                panic_on_press,
            };
            let clock = VirtualClock {
                now: self.now.clone(),
                longest_step: self.longest_step.clone(),
                on_tick: Box::new(on_tick),
            };
            Scheduler::new(
                device,
                clock,
                &PlayerConfig::default(),
                settings,
                self.speed.clone(),
                self.stop.clone(),
            )
        }

        fn ops(&self) -> Vec<Op> {
            self.log.borrow().iter().map(|(_, op)| *op).collect()
        }

        /// Presses grouped by the instant they happened.
        fn press_batches(&self) -> Vec<Vec<char>> {
            let mut batches: Vec<(f64, Vec<char>)> = Vec::new();
            for (at, op) in self.log.borrow().iter() {
                if let Op::Press(key) = op {
                    match batches.last_mut() {
                        Some((t, keys)) if (*t - at).abs() < 1e-9 => keys.push(*key),
                        _ => batches.push((*at, vec![*key])),
                    }
                }
            }
            batches.into_iter().map(|(_, keys)| keys).collect()
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn notes_inside_chord_window_are_pressed_together() {
        let rig = Rig::new();
        let events = [
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_on(64, 90, 0.01),
            MidiEvent::note_on(67, 90, 0.04),
            MidiEvent::note_off(60, 0.5),
            MidiEvent::note_off(64, 0.0),
            MidiEvent::note_off(67, 0.0),
        ];
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), |_| {});
        assert_eq!(scheduler.play(&events), Outcome::Finished);

        assert_eq!(rig.press_batches(), vec![vec!['a', 'd'], vec!['g']]);
        let log = rig.log.borrow();
        assert!(close(log[0].0, 0.01));
        assert!(close(log[2].0, 0.05));
    }

    #[test]
    fn paired_notes_leave_nothing_held() {
        let rig = Rig::new();
        let events = [
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_on(62, 90, 0.2),
            MidiEvent::note_off(60, 0.2),
            MidiEvent::note_on(72, 90, 0.1),
            MidiEvent::note_on(62, 0, 0.3),
            MidiEvent::other(0.0),
            MidiEvent::note_off(72, 0.1),
        ];
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), |_| {});
        assert_eq!(scheduler.play(&events), Outcome::Finished);
        assert!(scheduler.held_keys().is_empty());

        assert_eq!(
            rig.ops(),
            vec![
                Op::Press('a'),
                Op::Press('s'),
                Op::Release('a'),
                Op::Press('q'),
                Op::Release('s'),
                Op::Release('q'),
            ]
        );
    }

    #[test]
    fn keys_are_never_pressed_twice_while_held() {
        let rig = Rig::new();
        // 48 and 60 both land on the lower DO key
        let events = [
            MidiEvent::note_on(48, 90, 0.0),
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_off(48, 0.5),
            MidiEvent::note_off(60, 0.1),
        ];
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), |_| {});
        scheduler.play(&events);
        assert_eq!(rig.ops(), vec![Op::Press('a'), Op::Release('a')]);
    }

    #[test]
    fn chromatic_notes_produce_no_key_events() {
        let rig = Rig::new();
        let events = [
            MidiEvent::note_on(61, 90, 0.0),
            MidiEvent::note_off(61, 0.3),
            MidiEvent::note_on(66, 90, 0.1),
            MidiEvent::note_off(66, 0.3),
        ];
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), |_| {});
        assert_eq!(scheduler.play(&events), Outcome::Finished);
        assert!(rig.ops().is_empty());
    }

    #[test]
    fn delays_are_scaled_by_speed_factor() {
        let events = [MidiEvent::note_on(60, 90, 0.0), MidiEvent::note_off(60, 1.0)];

        let rig = Rig::new();
        rig.speed.set(2.0);
        rig.scheduler(&PlaybackSettings::default(), |_| {}).play(&events);
        assert!(close(rig.now.get(), 2.0));

        let rig = Rig::new();
        rig.speed.set(0.5);
        rig.scheduler(&PlaybackSettings::default(), |_| {}).play(&events);
        assert!(close(rig.now.get(), 0.5));
        assert!(rig.longest_step.get() <= 0.02 + 1e-9);
    }

    #[test]
    fn speed_change_applies_from_the_next_event() {
        let rig = Rig::new();
        let speed = rig.speed.clone();
        let events = [
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_off(60, 1.0),
            MidiEvent::note_on(62, 90, 1.0),
            MidiEvent::note_off(62, 1.0),
        ];
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), move |now| {
            if now >= 0.5 {
                speed.set(0.5);
            }
        });
        scheduler.play(&events);
        // First gap ran at the old factor, the other two at the new one
        assert!(close(rig.now.get(), 2.0));
    }

    #[test]
    fn stop_ends_run_within_one_quantum_and_releases_everything() {
        let rig = Rig::new();
        let stop = rig.stop.clone();
        let events = [
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_on(64, 90, 0.0),
            MidiEvent::note_off(60, 5.0),
            MidiEvent::note_on(67, 90, 0.0),
            MidiEvent::note_off(64, 5.0),
        ];
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), move |now| {
            if now >= 1.0 {
                stop.request();
            }
        });
        assert_eq!(scheduler.play(&events), Outcome::Stopped);
        assert!(scheduler.held_keys().is_empty());
        assert!(rig.now.get() - 1.0 <= 0.02 + 1e-9);

        let ops = rig.ops();
        assert!(!ops.contains(&Op::Press('g')));
        let presses = ops.iter().filter(|op| matches!(op, Op::Press(_))).count();
        let releases = ops.iter().filter(|op| matches!(op, Op::Release(_))).count();
        assert_eq!(presses, 2);
        assert_eq!(releases, 2);
    }

    #[test]
    fn failed_release_does_not_block_the_others() {
        let rig = Rig::new();
        let stop = rig.stop.clone();
        let events = [
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_on(62, 90, 0.0),
            MidiEvent::note_on(64, 90, 0.0),
            MidiEvent::note_off(60, 1.0),
        ];
        let mut scheduler =
            rig.scheduler_with(&PlaybackSettings::default(), vec!['s'], None, move |now| {
                if now >= 0.5 {
                    stop.request();
                }
            });
        assert_eq!(scheduler.play(&events), Outcome::Stopped);
        assert!(scheduler.held_keys().is_empty());

        let mut released: Vec<char> = rig
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Release(key) => Some(key),
                Op::Press(_) => None,
            })
            .collect();
        released.sort();
        assert_eq!(released, vec!['a', 'd', 's']);
    }

    #[test]
    fn pending_chord_is_flushed_and_released_at_end_of_stream() {
        let rig = Rig::new();
        let events = [MidiEvent::note_on(60, 90, 0.0), MidiEvent::note_on(67, 90, 0.0)];
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), |_| {});
        assert_eq!(scheduler.play(&events), Outcome::Finished);
        assert!(scheduler.held_keys().is_empty());
        assert_eq!(
            rig.ops()[..2].to_vec(),
            vec![Op::Press('a'), Op::Press('g')]
        );
        assert_eq!(rig.ops().len(), 4);
    }

    #[test]
    fn tap_articulation_releases_immediately() {
        let rig = Rig::new();
        let settings = PlaybackSettings { articulation: Articulation::Tap, ..Default::default() };
        let events = [
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_on(64, 90, 0.0),
            MidiEvent::note_off(60, 1.0),
            MidiEvent::note_off(64, 0.0),
        ];
        let mut scheduler = rig.scheduler(&settings, |_| {});
        scheduler.play(&events);
        assert_eq!(
            rig.ops(),
            vec![Op::Press('a'), Op::Release('a'), Op::Press('d'), Op::Release('d')]
        );
    }

    #[test]
    fn transpose_moves_the_whole_layout() {
        let rig = Rig::new();
        let settings = PlaybackSettings { reference_note: 60, transpose: -12, ..Default::default() };
        let events = [MidiEvent::note_on(60, 90, 0.0), MidiEvent::note_off(60, 0.1)];
        rig.scheduler(&settings, |_| {}).play(&events);
        assert_eq!(rig.ops(), vec![Op::Press('q'), Op::Release('q')]);
    }

    #[test]
    fn pre_roll_reports_stop() {
        let rig = Rig::new();
        let stop = rig.stop.clone();
        let mut scheduler = rig.scheduler(&PlaybackSettings::default(), move |now| {
            if now >= 0.1 {
                stop.request();
            }
        });
        assert!(!scheduler.pre_roll(Duration::from_secs(2)));
        assert!(rig.now.get() < 0.2);
    }

    #[test]
    fn panic_mid_run_still_releases_held_keys() {
        let rig = Rig::new();
        let events = [
            MidiEvent::note_on(60, 90, 0.0),
            MidiEvent::note_on(64, 90, 0.5),
            MidiEvent::note_off(60, 0.5),
        ];
        let scheduler = rig.scheduler_with(&PlaybackSettings::default(), Vec::new(), Some('d'), |_| {});
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut scheduler = scheduler;
            scheduler.play(&events)
        }));
        assert!(result.is_err());
        assert_eq!(rig.ops(), vec![Op::Press('a'), Op::Release('a')]);
    }
}
