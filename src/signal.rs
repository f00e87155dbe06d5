//! Shared cooperative stop flag observed by every source loop, the pipeline
//! and the engine service loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleep for `dur`, waking early once the signal is set. Polls in short
    /// slices so loops with long intervals still exit within a bounded grace.
    pub fn sleep(&self, dur: Duration) {
        let deadline = Instant::now() + dur;
        while !self.is_set() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
