//! Time sources and the single-shot deadline queue.
//!
//! All callbacks land on the tick thread: the owner pumps the deadline queue
//! between ticks, so firing never races the simulation state.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Instant;

/// External clock consulted by the simulator.
///
/// `current_time` is the scaled strategy clock the simulation chases;
/// `system_time` is the unscaled wall clock used for timing measurements and
/// delivery deadlines.
pub trait SimTimer: Send + Sync {
    /// Scaled simulation target time in nanoseconds.
    fn current_time(&self) -> i64;
    /// Wall clock in nanoseconds.
    fn system_time(&self) -> i64;
}

/// Wall-clock timer with adjustable scaling, for free-running operation.
#[derive(Debug)]
pub struct ScaledTimer {
    start: Instant,
    state: Mutex<ScaledTimerState>,
}

#[derive(Debug, Clone, Copy)]
struct ScaledTimerState {
    scaling: f64,
    base_sim_ns: i64,
    base_wall_ns: i64,
}

impl ScaledTimer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            state: Mutex::new(ScaledTimerState {
                scaling: 1.0,
                // Starts at one so a simulator enabled immediately after
                // construction never observes the unset-time sentinel.
                base_sim_ns: 1,
                base_wall_ns: 0,
            }),
        }
    }

    fn wall_ns(&self) -> i64 {
        self.start.elapsed().as_nanos() as i64
    }

    /// Change the speed factor without a jump in `current_time`.
    pub fn set_scaling(&self, scaling: f64) {
        let wall = self.wall_ns();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.base_sim_ns += ((wall - state.base_wall_ns) as f64 * state.scaling) as i64;
        state.base_wall_ns = wall;
        state.scaling = scaling;
    }
}

impl Default for ScaledTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTimer for ScaledTimer {
    fn current_time(&self) -> i64 {
        let wall = self.wall_ns();
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.base_sim_ns + ((wall - state.base_wall_ns) as f64 * state.scaling) as i64
    }

    fn system_time(&self) -> i64 {
        self.wall_ns()
    }
}

/// Hand-advanced clock for deterministic, manually pumped runs.
#[derive(Debug, Default)]
pub struct ManualTimer {
    now: std::sync::atomic::AtomicI64,
}

impl ManualTimer {
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn advance(&self, delta: i64) {
        self.now
            .fetch_add(delta, std::sync::atomic::Ordering::Relaxed);
    }
}

impl SimTimer for ManualTimer {
    fn current_time(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn system_time(&self) -> i64 {
        self.current_time()
    }
}

/// Min-heap of wall-clock deadlines standing in for per-packet single-shot
/// timers.
#[derive(Debug, Default)]
pub struct SingleShotQueue {
    deadlines: BinaryHeap<Reverse<i64>>,
}

impl SingleShotQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline in `system_time` nanoseconds.
    pub fn arm(&mut self, deadline: i64) {
        self.deadlines.push(Reverse(deadline));
    }

    /// Pop the earliest deadline if it is due at `now`.
    pub fn pop_due(&mut self, now: i64) -> Option<i64> {
        match self.deadlines.peek() {
            Some(Reverse(deadline)) if *deadline <= now => {
                self.deadlines.pop().map(|Reverse(d)| d)
            }
            _ => None,
        }
    }

    /// Drop one armed deadline (the earliest), if any.
    pub fn pop(&mut self) -> Option<i64> {
        self.deadlines.pop().map(|Reverse(d)| d)
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_tracks_advances() {
        let timer = ManualTimer::new(0);
        assert_eq!(timer.current_time(), 0);
        timer.advance(5_000_000);
        assert_eq!(timer.current_time(), 5_000_000);
        timer.set(1_000);
        assert_eq!(timer.system_time(), 1_000);
    }

    #[test]
    fn scaled_timer_is_monotonic_across_scaling_changes() {
        let timer = ScaledTimer::new();
        let a = timer.current_time();
        timer.set_scaling(4.0);
        let b = timer.current_time();
        timer.set_scaling(0.25);
        let c = timer.current_time();
        assert!(a <= b && b <= c);
    }

    #[test]
    fn deadlines_fire_in_order() {
        let mut queue = SingleShotQueue::new();
        queue.arm(300);
        queue.arm(100);
        queue.arm(200);
        assert_eq!(queue.pop_due(50), None);
        assert_eq!(queue.pop_due(250), Some(100));
        assert_eq!(queue.pop_due(250), Some(200));
        assert_eq!(queue.pop_due(250), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_discards_armed_deadlines() {
        let mut queue = SingleShotQueue::new();
        queue.arm(10);
        queue.arm(20);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop_due(i64::MAX), None);
    }
}
