//! The host main loop contract.
//!
//! This crate never runs its own event loop. Every watch, timer and
//! per-iteration callback it needs is requested from a type implementing
//! [`HostLoop`], which is expected to be backed by whatever cooperative
//! loop the embedding application already runs (glib, mio, a hand-rolled
//! `poll(2)` loop, ...). The watch/timeout bridge (`crate::watch`) is
//! written purely in terms of this trait, which is what keeps it testable
//! without a real reactor.

use std::time::Duration;

/// Readiness conditions a host-loop I/O watch can be asked to observe.
///
/// Mirrors the D-Bus `DBUS_WATCH_{READABLE,WRITABLE,ERROR}` flags,
/// translated 1:1 into the host loop's own read/write/except vocabulary.
/// Plain bool fields rather than a bitmask type, matching how
/// `dbus::watch::Watch` represents the same thing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct IoInterest {
    pub read: bool,
    pub write: bool,
    pub except: bool,
}

impl IoInterest {
    pub const fn read() -> Self { IoInterest { read: true, write: false, except: false } }
    pub const fn write() -> Self { IoInterest { read: false, write: true, except: false } }

    pub fn is_empty(&self) -> bool { !self.read && !self.write && !self.except }
}

/// Callback invoked by the host loop when an I/O watch fires.
///
/// The `IoInterest` passed back reports which of the requested conditions
/// were actually ready.
pub type IoCallback = Box<dyn FnMut(IoInterest) + 'static>;

/// Callback invoked by the host loop when a timer's due time elapses.
pub type TimerCallback = Box<dyn FnMut() + 'static>;

/// Callback invoked once per host-loop iteration.
pub type IterationCallback = Box<dyn FnMut() + 'static>;

/// The narrow set of primitives the bridge needs from a host event loop.
///
/// An implementation must satisfy: an I/O watch or timer created here stays
/// in existence (and keeps its identity, for later `set_*_active`/`remove_*`
/// calls) until explicitly removed, even across being toggled inactive.
pub trait HostLoop {
    /// Opaque handle to a registered I/O watch.
    type IoWatch;
    /// Opaque handle to a registered periodic timer.
    type Timer;
    /// Opaque handle to a registered per-iteration callback.
    type Callback;

    /// Registers a new I/O watch. Starts disabled; the caller toggles it
    /// with [`set_io_watch_active`](Self::set_io_watch_active).
    fn add_io_watch(&self, fd: std::os::unix::io::RawFd, interest: IoInterest, callback: IoCallback) -> Self::IoWatch;

    /// Inserts or removes a watch from the loop's active list without
    /// discarding its registration, so a later re-enable is O(1).
    fn set_io_watch_active(&self, watch: &Self::IoWatch, active: bool);

    /// Destroys a watch. Must be preceded by `set_io_watch_active(watch, false)`
    /// if it might still be active.
    fn remove_io_watch(&self, watch: Self::IoWatch);

    /// Registers a new periodic timer with the given period. Starts disabled.
    fn add_timer(&self, period: Duration, callback: TimerCallback) -> Self::Timer;

    /// Inserts or removes a timer from the loop's active list, retaining its registration.
    fn set_timer_active(&self, timer: &Self::Timer, active: bool);

    /// Re-seats a timer's period (and, implicitly, its next due time) without
    /// losing its identity or active/inactive state.
    fn set_timer_period(&self, timer: &Self::Timer, period: Duration);

    /// Destroys a timer.
    fn remove_timer(&self, timer: Self::Timer);

    /// Registers a callback to run once per host-loop iteration (used to
    /// drain pending messages off a connection after each iteration).
    fn add_iteration_callback(&self, callback: IterationCallback) -> Self::Callback;

    /// Unregisters a previously added iteration callback.
    fn remove_iteration_callback(&self, token: Self::Callback);

    /// Interrupts any blocking wait the host loop may currently be in, so
    /// newly queued outbound messages are flushed promptly.
    fn wakeup(&self);
}

/// `ceil(interval_ms / 1000)`, clamped to a minimum of one second — the
/// rounding rule for translating a D-Bus millisecond timeout into the host
/// loop's whole-second periodic timer.
///
/// A 0ms timeout still produces a 1-second timer: rounding may never
/// produce an interval shorter than what D-Bus asked for.
pub fn round_up_to_seconds(interval_ms: i32) -> Duration {
    let ms = interval_ms.max(0) as u64;
    let secs = (ms + 999) / 1000;
    Duration::from_secs(secs.max(1))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rounds_up_fractional_seconds() {
        assert_eq!(round_up_to_seconds(250), Duration::from_secs(1));
        assert_eq!(round_up_to_seconds(1500), Duration::from_secs(2));
        assert_eq!(round_up_to_seconds(2500), Duration::from_secs(3));
    }

    #[test]
    fn zero_still_yields_one_second() {
        assert_eq!(round_up_to_seconds(0), Duration::from_secs(1));
    }

    #[test]
    fn exact_second_is_unchanged() {
        assert_eq!(round_up_to_seconds(1000), Duration::from_secs(1));
        assert_eq!(round_up_to_seconds(3000), Duration::from_secs(3));
    }

    #[test]
    fn never_rounds_down() {
        for ms in 0..5000 {
            let secs = round_up_to_seconds(ms);
            assert!(secs.as_millis() as i64 >= ms as i64, "{:?} rounded below {}ms", secs, ms);
        }
    }
}
