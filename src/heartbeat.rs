// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat scheduling.
//!
//! A [`HeartbeatTimer`] fires a callback on a fixed interval, measured from
//! an absolute wake time rather than a naive fixed-period sleep, so a late
//! wakeup (a busy scheduler, a slow callback) does not accumulate drift
//! across repeated fires. Calling [`HeartbeatTimer::reset`] pushes the next
//! fire `interval` out from the call, which is how a `Connection` avoids
//! sending a heartbeat immediately after it has already sent something
//! else of its own accord.
//!
//! Wake time is tracked against [`Instant`], not wall-clock time, so a clock
//! step (NTP correction, a manual clock change) cannot stall or double-fire
//! the timer. The worker thread waits on a [`Condvar`] rather than sleeping
//! flat out, so both `reset` and `drop` wake it immediately instead of
//! leaving it to sleep out the rest of the current interval.
//!
//! The callback never touches a socket directly — see
//! [`crate::transport::io_task`] for why.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Shared {
    last_fire: Instant,
    shutting_down: bool,
}

/// A dedicated-thread interval timer with an externally resettable clock.
pub struct HeartbeatTimer {
    shared: Arc<(Mutex<Shared>, Condvar)>,
    join: Option<JoinHandle<()>>,
}

impl HeartbeatTimer {
    /// Start a timer that calls `on_fire` roughly every `interval`, until
    /// dropped.
    pub fn spawn<F>(interval: Duration, on_fire: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new((
            Mutex::new(Shared {
                last_fire: Instant::now(),
                shutting_down: false,
            }),
            Condvar::new(),
        ));
        let thread_shared = shared.clone();

        let join = thread::Builder::new()
            .name("soupbin-heartbeat".into())
            .spawn(move || {
                let (lock, cvar) = &*thread_shared;
                let mut guard = lock.lock().unwrap();
                loop {
                    if guard.shutting_down {
                        break;
                    }
                    let target = guard.last_fire + interval;
                    let now = Instant::now();
                    if now < target {
                        let (g, _timed_out) = cvar.wait_timeout(guard, target - now).unwrap();
                        guard = g;
                        continue;
                    }
                    if guard.shutting_down {
                        break;
                    }
                    on_fire();
                    guard.last_fire = Instant::now();
                }
            })
            .expect("failed to spawn heartbeat thread");

        Self {
            shared,
            join: Some(join),
        }
    }

    /// Push the next fire `interval` out from now, as if the timer had just
    /// fired on its own.
    pub fn reset(&self) {
        let (lock, cvar) = &*self.shared;
        let mut guard = lock.lock().unwrap();
        guard.last_fire = Instant::now();
        cvar.notify_one();
    }

    /// Time elapsed since the last fire or reset.
    pub fn elapsed(&self) -> Duration {
        let (lock, _cvar) = &*self.shared;
        let guard = lock.lock().unwrap();
        guard.last_fire.elapsed()
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shared;
            let mut guard = lock.lock().unwrap();
            guard.shutting_down = true;
            cvar.notify_one();
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fires_after_interval() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = HeartbeatTimer::spawn(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(70));
        drop(timer);
        assert!(fired.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn reset_delays_next_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = HeartbeatTimer::spawn(Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(10));
        timer.reset();
        thread::sleep(Duration::from_millis(10));
        // Still within the reset window; should not have fired yet.
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(40));
        drop(timer);
        assert!(fired.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn elapsed_tracks_time_since_reset() {
        let timer = HeartbeatTimer::spawn(Duration::from_secs(10), || {});
        thread::sleep(Duration::from_millis(15));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        timer.reset();
        assert!(timer.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn drop_joins_thread_promptly() {
        let timer = HeartbeatTimer::spawn(Duration::from_secs(5), || {});
        let start = Instant::now();
        drop(timer);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
