//! Resource watchdog with a single cooperative cancel flag.
//!
//! The run is single-threaded, so there is no monitor thread: callers poll
//! `check()` at candidate boundaries and before every SQL dispatch. The only
//! shared piece is the atomic cancel flag, which the SQLite progress handler
//! reads from inside a running statement.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};

use crate::error::CancelReason;

/// Resident memory is sampled every N `check()` calls; refreshing process
/// stats is far more expensive than reading the clock.
const MEMORY_POLL_STRIDE: u32 = 32;

pub struct ResourceMonitor {
    started: Instant,
    timeout: Duration,
    memory_threshold: u64,
    cancel: Arc<AtomicBool>,
    reason: Cell<Option<CancelReason>>,
    system: std::cell::RefCell<System>,
    pid: Pid,
    polls: Cell<u32>,
}

impl ResourceMonitor {
    pub fn new(memory_threshold: u64, timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            memory_threshold,
            cancel: Arc::new(AtomicBool::new(false)),
            reason: Cell::new(None),
            system: std::cell::RefCell::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
            polls: Cell::new(0),
        }
    }

    /// Handle for code that must observe cancellation off the polling path
    /// (the SQLite progress handler).
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Trip the monitor. Idempotent and final: the first reason wins.
    pub fn trip(&self, reason: CancelReason) {
        if !self.cancel.swap(true, Ordering::Relaxed) {
            self.reason.set(Some(reason));
            tracing::warn!(reason = reason.as_str(), "resource monitor tripped");
        }
    }

    /// Poll the budgets. Returns the cancel reason once tripped.
    pub fn check(&self) -> Option<CancelReason> {
        if self.is_cancelled() {
            return self.reason();
        }

        if self.started.elapsed() >= self.timeout {
            self.trip(CancelReason::Timeout);
            return self.reason();
        }

        let polls = self.polls.get().wrapping_add(1);
        self.polls.set(polls);
        if polls % MEMORY_POLL_STRIDE == 0 {
            if let Some(resident) = self.resident_memory() {
                if resident > self.memory_threshold {
                    self.trip(CancelReason::Memory);
                    return self.reason();
                }
            }
        }

        None
    }

    fn resident_memory(&self) -> Option<u64> {
        let mut system = self.system.borrow_mut();
        if !system.refresh_process(self.pid) {
            return None;
        }
        system.process(self.pid).map(|p| p.memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_trips_on_first_check() {
        let monitor = ResourceMonitor::new(u64::MAX, Duration::ZERO);
        assert_eq!(monitor.check(), Some(CancelReason::Timeout));
        assert!(monitor.is_cancelled());
    }

    #[test]
    fn first_trip_reason_is_final() {
        let monitor = ResourceMonitor::new(u64::MAX, Duration::from_secs(3600));
        monitor.trip(CancelReason::Memory);
        monitor.trip(CancelReason::Timeout);
        assert_eq!(monitor.reason(), Some(CancelReason::Memory));
    }

    #[test]
    fn untripped_monitor_passes() {
        let monitor = ResourceMonitor::new(u64::MAX, Duration::from_secs(3600));
        assert_eq!(monitor.check(), None);
        assert!(!monitor.is_cancelled());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let monitor = ResourceMonitor::new(u64::MAX, Duration::from_secs(3600));
        let flag = monitor.cancel_flag();
        monitor.trip(CancelReason::Timeout);
        assert!(flag.load(Ordering::Relaxed));
    }
}
