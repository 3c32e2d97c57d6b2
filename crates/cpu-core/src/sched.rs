use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct SleepState { sleeping: bool, woken: bool }

/// Run gate and wait-state sleep of one processor thread.
#[derive(Debug, Default)]
pub struct ThreadControl {
    run: Mutex<bool>,
    run_cv: Condvar,
    sleep: Mutex<SleepState>,
    sleep_cv: Condvar,
}

impl ThreadControl {
    pub fn new() -> Self { Self::default() }

    pub fn set_running(&self, on: bool) {
        *self.run.lock() = on;
        self.run_cv.notify_all();
    }

    pub fn is_running(&self) -> bool { *self.run.lock() }

    /// Block until the processor is allowed to run.
    pub fn wait_running(&self) {
        let mut run = self.run.lock();
        while !*run {
            self.run_cv.wait(&mut run);
        }
    }

    /// Sleep for `usec` microseconds or until `wake`. Returns 0 on timeout, else the microseconds left.
    pub fn sleep(&self, usec: u64) -> u64 {
        let deadline = Instant::now() + Duration::from_micros(usec);
        let mut s = self.sleep.lock();
        s.sleeping = true;
        s.woken = false;
        // Spurious wakeups just go around again
        while !s.woken && !self.sleep_cv.wait_until(&mut s, deadline).timed_out() {}
        s.sleeping = false;
        if !s.woken { return 0; }
        s.woken = false;
        deadline.saturating_duration_since(Instant::now()).as_micros() as u64
    }

    /// End a sleep in progress. Has no effect on a thread that is not sleeping.
    pub fn wake(&self) {
        let mut s = self.sleep.lock();
        if s.sleeping {
            s.woken = true;
            self.sleep_cv.notify_all();
        }
    }

    pub fn is_sleeping(&self) -> bool { self.sleep.lock().sleeping }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn sleep_times_out_to_zero() {
        let tc = ThreadControl::new();
        let start = Instant::now();
        assert_eq!(tc.sleep(20_000), 0);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wake_without_sleeper_is_ignored() {
        let tc = ThreadControl::new();
        tc.wake();
        assert_eq!(tc.sleep(5_000), 0);
    }

    #[test]
    fn early_wake_returns_remaining() {
        let tc = Arc::new(ThreadControl::new());
        let t2 = tc.clone();
        let h = thread::spawn(move || t2.sleep(2_000_000));
        while !tc.is_sleeping() { thread::yield_now(); }
        thread::sleep(Duration::from_millis(50));
        tc.wake();
        let left = h.join().unwrap();
        assert!(left > 1_000_000 && left < 1_960_000, "left {left}");
    }

    #[test]
    fn run_gate_releases_waiter() {
        let tc = Arc::new(ThreadControl::new());
        let t2 = tc.clone();
        let h = thread::spawn(move || { t2.wait_running(); t2.is_running() });
        thread::sleep(Duration::from_millis(10));
        assert!(!h.is_finished());
        tc.set_running(true);
        assert!(h.join().unwrap());
    }
}
