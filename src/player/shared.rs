use super::config::SPEED_RANGE;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Delay multiplier shared between the control panel and a running player.
///
/// The panel is the only writer. The player samples it once per event, so a
/// change takes effect from the next event on.
#[derive(Debug)]
pub struct SpeedControl {
    bits: AtomicU64,
}

impl SpeedControl {
    pub fn new(factor: f64) -> Self {
        let control = Self { bits: AtomicU64::new(1.0f64.to_bits()) };
        control.set(factor);
        control
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Values outside the slider range are clamped; non-finite values are ignored.
    pub fn set(&self, factor: f64) {
        if !factor.is_finite() {
            return;
        }
        let factor = factor.clamp(*SPEED_RANGE.start(), *SPEED_RANGE.end());
        self.bits.store(factor.to_bits(), Ordering::Relaxed);
    }

    /// Playback rate as shown to the user: 0.5 delay factor plays at 2×.
    pub fn tempo(&self) -> f64 {
        1.0 / self.get()
    }
}

impl Default for SpeedControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// One-shot cancellation flag polled by the playback loop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Only called between runs, never while a player is polling.
    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
