//! Bridges libdbus's `DBusWatch`/`DBusTimeout` registration callbacks onto a
//! [`HostLoop`](crate::mainloop::HostLoop).
//!
//! Grounded on the watch/timeout bridge in `nih_dbus_setup` (`add_watch`,
//! `remove_watch`, `watch_toggled`, and the timeout trio `add_timeout`,
//! `remove_timeout`, `timeout_toggled`) and on the add/remove/toggle
//! callback shape of `dbus::watch::WatchMapInner`, generalized so every
//! fd and timer (not just the single fd libdbus's own loop-integration
//! helper collapses everything to) is handed off to the host loop instead
//! of tracked internally.

use std::collections::HashMap;
use std::os::raw::c_void;
use std::os::unix::io::RawFd;
use std::sync::Mutex;

use log::trace;

use crate::ffi;
use crate::mainloop::{HostLoop, IoInterest};

/// Per-connection/server state threaded through the watch and timeout
/// callbacks. Must be heap-allocated and pinned for the lifetime of the
/// libdbus object it's registered on, since libdbus hands back a raw
/// pointer to it on every callback.
pub(crate) struct WatchBridge<L: HostLoop> {
    host: L,
    watches: Mutex<HashMap<usize, L::IoWatch>>,
    timeouts: Mutex<HashMap<usize, L::Timer>>,
}

impl<L: HostLoop> WatchBridge<L> {
    pub(crate) fn new(host: L) -> Self {
        WatchBridge {
            host,
            watches: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn host(&self) -> &L {
        &self.host
    }

    /// Registers the four watch callbacks (add/remove/toggled, no free
    /// function needed: we never hand libdbus an owned allocation) on a
    /// connection or server via the given raw `set_watch_functions`-shaped
    /// call. `set` is one of `dbus_connection_set_watch_functions` or
    /// `dbus_server_set_watch_functions`, invoked by the caller since the
    /// two take different first-argument types.
    ///
    /// # Safety
    /// `self_ptr` must remain valid and pinned for as long as watch
    /// callbacks keep firing, i.e. until the matching `*_set_watch_functions`
    /// call with all-`None` callbacks has returned.
    pub(crate) unsafe fn install_watch_callbacks(self_ptr: *mut Self) -> (
        ffi::DBusAddWatchFunction,
        ffi::DBusRemoveWatchFunction,
        ffi::DBusWatchToggledFunction,
        *mut c_void,
    ) {
        (
            Some(add_watch::<L>),
            Some(remove_watch::<L>),
            Some(toggled_watch::<L>),
            self_ptr as *mut c_void,
        )
    }

    /// Same as [`install_watch_callbacks`](Self::install_watch_callbacks) but
    /// for the timeout trio.
    ///
    /// # Safety
    /// Same pinning requirement as `install_watch_callbacks`.
    pub(crate) unsafe fn install_timeout_callbacks(self_ptr: *mut Self) -> (
        ffi::DBusAddTimeoutFunction,
        ffi::DBusRemoveTimeoutFunction,
        ffi::DBusTimeoutToggledFunction,
        *mut c_void,
    ) {
        (
            Some(add_timeout::<L>),
            Some(remove_timeout::<L>),
            Some(toggled_timeout::<L>),
            self_ptr as *mut c_void,
        )
    }
}

fn watch_key(watch: *mut ffi::DBusWatch) -> usize {
    watch as usize
}

fn timeout_key(timeout: *mut ffi::DBusTimeout) -> usize {
    timeout as usize
}

extern "C" fn add_watch<L: HostLoop>(watch: *mut ffi::DBusWatch, data: *mut c_void) -> u32 {
    let result = std::panic::catch_unwind(|| unsafe {
        let bridge: &WatchBridge<L> = &*(data as *const WatchBridge<L>);
        let fd = ffi::dbus_watch_get_unix_fd(watch) as RawFd;
        let flags = ffi::dbus_watch_get_flags(watch);
        let interest = IoInterest {
            read: (flags & ffi::DBUS_WATCH_READABLE as std::os::raw::c_uint) != 0,
            write: (flags & ffi::DBUS_WATCH_WRITABLE as std::os::raw::c_uint) != 0,
            // Always watched for, regardless of the flags libdbus asked
            // for, matching nih_dbus_add_watch's unconditional NIH_IO_EXCEPT.
            except: true,
        };
        let key = watch_key(watch);
        let w = watch as usize;
        let handle = bridge.host.add_io_watch(fd, interest, Box::new(move |ready| {
            let mut flags = 0u32;
            if ready.read {
                flags |= ffi::DBUS_WATCH_READABLE;
            }
            if ready.write {
                flags |= ffi::DBUS_WATCH_WRITABLE;
            }
            if ready.except {
                flags |= ffi::DBUS_WATCH_ERROR;
            }
            unsafe { ffi::dbus_watch_handle(w as *mut ffi::DBusWatch, flags) };
        }));
        let enabled = ffi::dbus_watch_get_enabled(watch) != 0;
        bridge.host.set_io_watch_active(&handle, enabled);
        bridge.watches.lock().unwrap().insert(key, handle);
        trace!("added watch on fd {} (read={} write={}, enabled={})", fd, interest.read, interest.write, enabled);
    });
    result.is_ok() as u32
}

extern "C" fn remove_watch<L: HostLoop>(watch: *mut ffi::DBusWatch, data: *mut c_void) {
    let _ = std::panic::catch_unwind(|| unsafe {
        let bridge: &WatchBridge<L> = &*(data as *const WatchBridge<L>);
        if let Some(handle) = bridge.watches.lock().unwrap().remove(&watch_key(watch)) {
            bridge.host.set_io_watch_active(&handle, false);
            bridge.host.remove_io_watch(handle);
        }
    });
}

extern "C" fn toggled_watch<L: HostLoop>(watch: *mut ffi::DBusWatch, data: *mut c_void) {
    let _ = std::panic::catch_unwind(|| unsafe {
        let bridge: &WatchBridge<L> = &*(data as *const WatchBridge<L>);
        let enabled = ffi::dbus_watch_get_enabled(watch) != 0;
        if let Some(handle) = bridge.watches.lock().unwrap().get(&watch_key(watch)) {
            bridge.host.set_io_watch_active(handle, enabled);
        }
    });
}

extern "C" fn add_timeout<L: HostLoop>(timeout: *mut ffi::DBusTimeout, data: *mut c_void) -> u32 {
    let result = std::panic::catch_unwind(|| unsafe {
        let bridge: &WatchBridge<L> = &*(data as *const WatchBridge<L>);
        let interval_ms = ffi::dbus_timeout_get_interval(timeout);
        let period = crate::mainloop::round_up_to_seconds(interval_ms);
        let key = timeout_key(timeout);
        let t = timeout as usize;
        let handle = bridge.host.add_timer(period, Box::new(move || {
            unsafe { ffi::dbus_timeout_handle(t as *mut ffi::DBusTimeout) };
        }));
        let enabled = ffi::dbus_timeout_get_enabled(timeout) != 0;
        bridge.host.set_timer_active(&handle, enabled);
        bridge.timeouts.lock().unwrap().insert(key, handle);
    });
    result.is_ok() as u32
}

extern "C" fn remove_timeout<L: HostLoop>(timeout: *mut ffi::DBusTimeout, data: *mut c_void) {
    let _ = std::panic::catch_unwind(|| unsafe {
        let bridge: &WatchBridge<L> = &*(data as *const WatchBridge<L>);
        if let Some(handle) = bridge.timeouts.lock().unwrap().remove(&timeout_key(timeout)) {
            bridge.host.set_timer_active(&handle, false);
            bridge.host.remove_timer(handle);
        }
    });
}

extern "C" fn toggled_timeout<L: HostLoop>(timeout: *mut ffi::DBusTimeout, data: *mut c_void) {
    let _ = std::panic::catch_unwind(|| unsafe {
        let bridge: &WatchBridge<L> = &*(data as *const WatchBridge<L>);
        let key = timeout_key(timeout);
        let mut timeouts = bridge.timeouts.lock().unwrap();
        if let Some(handle) = timeouts.get_mut(&key) {
            let enabled = ffi::dbus_timeout_get_enabled(timeout) != 0;
            bridge.host.set_timer_active(handle, enabled);
            if enabled {
                let interval_ms = ffi::dbus_timeout_get_interval(timeout);
                bridge.host.set_timer_period(handle, crate::mainloop::round_up_to_seconds(interval_ms));
            }
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mainloop::{IterationCallback, TimerCallback};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct MockLoopState {
        next_id: u64,
        active: HashMap<u64, bool>,
    }

    #[derive(Clone, Default)]
    struct MockLoop(Rc<RefCell<MockLoopState>>);

    impl HostLoop for MockLoop {
        type IoWatch = u64;
        type Timer = u64;
        type Callback = u64;

        fn add_io_watch(&self, _fd: RawFd, _interest: IoInterest, _cb: crate::mainloop::IoCallback) -> u64 {
            let mut s = self.0.borrow_mut();
            let id = s.next_id;
            s.next_id += 1;
            s.active.insert(id, false);
            id
        }
        fn set_io_watch_active(&self, watch: &u64, active: bool) {
            self.0.borrow_mut().active.insert(*watch, active);
        }
        fn remove_io_watch(&self, watch: u64) {
            self.0.borrow_mut().active.remove(&watch);
        }
        fn add_timer(&self, _period: Duration, _cb: TimerCallback) -> u64 {
            let mut s = self.0.borrow_mut();
            let id = s.next_id;
            s.next_id += 1;
            s.active.insert(id, false);
            id
        }
        fn set_timer_active(&self, timer: &u64, active: bool) {
            self.0.borrow_mut().active.insert(*timer, active);
        }
        fn set_timer_period(&self, _timer: &u64, _period: Duration) {}
        fn remove_timer(&self, timer: u64) {
            self.0.borrow_mut().active.remove(&timer);
        }
        fn add_iteration_callback(&self, _cb: IterationCallback) -> u64 { 0 }
        fn remove_iteration_callback(&self, _token: u64) {}
        fn wakeup(&self) {}
    }

    #[test]
    fn bridge_tracks_no_watches_on_construction() {
        let bridge = WatchBridge::new(MockLoop::default());
        assert!(bridge.watches.lock().unwrap().is_empty());
        assert!(bridge.timeouts.lock().unwrap().is_empty());
    }
}
