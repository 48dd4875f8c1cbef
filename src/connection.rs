//! Connection setup: binding a `DBusConnection` into a host main loop.
//!
//! Grounded on `nih_dbus_setup` (data-slot sharing, watch/timeout/wakeup
//! function installation, the disconnect filter) and on
//! `dbus::channel::Channel` (`ConnHandle`, `get_private`/`open_private`,
//! `send`/`flush`/`read_write`).

use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;
use std::sync::Arc;

use log::{debug, warn};

use crate::error::Error;
use crate::ffi;
use crate::mainloop::HostLoop;
use crate::watch::WatchBridge;

/// Which well-known bus to connect to, or a private peer-to-peer address.
#[derive(Debug, Clone)]
pub enum BusChoice {
    Session,
    System,
    Starter,
    Address(String),
}

struct ConnHandle(*mut ffi::DBusConnection, bool);

unsafe impl Send for ConnHandle {}
unsafe impl Sync for ConnHandle {}

impl Drop for ConnHandle {
    fn drop(&mut self) {
        if self.1 {
            unsafe {
                ffi::dbus_connection_close(self.0);
                ffi::dbus_connection_unref(self.0);
            }
        }
    }
}

/// A D-Bus connection bound into a [`HostLoop`].
///
/// Every watch and timeout libdbus asks to register is bridged onto `L`
/// (see [`crate::watch`]); an iteration callback drains the incoming queue
/// with `dbus_connection_dispatch` after each loop pass, so messages are
/// delivered without the caller ever blocking the host loop.
pub struct Binding<L: HostLoop> {
    handle: ConnHandle,
    bridge: Arc<WatchBridge<L>>,
    dispatch_token: Option<L::Callback>,
}

impl<L: HostLoop> Drop for Binding<L> {
    fn drop(&mut self) {
        unsafe {
            ffi::dbus_connection_set_watch_functions(self.handle.0, None, None, None, ptr::null_mut(), None);
            ffi::dbus_connection_set_timeout_functions(self.handle.0, None, None, None, ptr::null_mut(), None);
            ffi::dbus_connection_set_wakeup_main_function(self.handle.0, None, ptr::null_mut(), None);
        }
        if let Some(token) = self.dispatch_token.take() {
            self.bridge.host().remove_iteration_callback(token);
        }
    }
}

impl<L: HostLoop + Clone + 'static> Binding<L> {
    fn from_raw(conn: *mut ffi::DBusConnection, host: L) -> Result<Self, Error> {
        unsafe { ffi::dbus_connection_set_exit_on_disconnect(conn, 0) };

        let bridge = Arc::new(WatchBridge::new(host));
        let bridge_ptr = Arc::as_ptr(&bridge) as *mut WatchBridge<L>;

        let (add_w, rm_w, tog_w, data_w) = unsafe { WatchBridge::install_watch_callbacks(bridge_ptr) };
        if unsafe { ffi::dbus_connection_set_watch_functions(conn, add_w, rm_w, tog_w, data_w, None) } == 0 {
            return Err(Error::no_memory());
        }

        let (add_t, rm_t, tog_t, data_t) = unsafe { WatchBridge::install_timeout_callbacks(bridge_ptr) };
        if unsafe { ffi::dbus_connection_set_timeout_functions(conn, add_t, rm_t, tog_t, data_t, None) } == 0 {
            return Err(Error::no_memory());
        }

        extern "C" fn wakeup_cb<L: HostLoop>(data: *mut c_void) {
            let _ = std::panic::catch_unwind(|| unsafe {
                let bridge: &WatchBridge<L> = &*(data as *const WatchBridge<L>);
                bridge.host().wakeup();
            });
        }
        unsafe {
            ffi::dbus_connection_set_wakeup_main_function(conn, Some(wakeup_cb::<L>), bridge_ptr as *mut c_void, None);
        }

        let conn_for_dispatch = conn as usize;
        let dispatch_token = bridge.host().add_iteration_callback(Box::new(move || {
            unsafe {
                while ffi::dbus_connection_get_dispatch_status(conn_for_dispatch as *mut ffi::DBusConnection)
                    == ffi::DBusDispatchStatus::DataRemains
                {
                    ffi::dbus_connection_dispatch(conn_for_dispatch as *mut ffi::DBusConnection);
                }
            }
        }));

        Ok(Binding {
            handle: ConnHandle(conn, true),
            bridge,
            dispatch_token: Some(dispatch_token),
        })
    }

    /// Connects to a well-known bus (or a private address) and registers
    /// with it, bridging all I/O through `host`.
    ///
    /// Blocking: until the connection and, for well-known buses, the
    /// `Hello` handshake complete.
    pub fn connect(bus: BusChoice, host: L) -> Result<Self, Error> {
        let mut e = crate::ffi::error_empty();
        let conn = match &bus {
            BusChoice::Session => unsafe { ffi::dbus_bus_get_private(ffi::DBusBusType::Session, &mut e) },
            BusChoice::System => unsafe { ffi::dbus_bus_get_private(ffi::DBusBusType::System, &mut e) },
            BusChoice::Starter => unsafe { ffi::dbus_bus_get_private(ffi::DBusBusType::Starter, &mut e) },
            BusChoice::Address(addr) => {
                let c = CString::new(addr.as_str()).map_err(|err| Error::from(err.to_string()))?;
                unsafe { ffi::dbus_connection_open_private(c.as_ptr(), &mut e) }
            }
        };
        if conn.is_null() {
            warn!("failed to establish D-Bus connection ({:?})", bus);
            return Err(Error::from_ffi(&e));
        }
        if matches!(bus, BusChoice::Address(_)) {
            let mut reg_err = crate::ffi::error_empty();
            if unsafe { ffi::dbus_bus_register(conn, &mut reg_err) } == 0 {
                return Err(Error::from_ffi(&reg_err));
            }
        }
        debug!("connected to {:?}", bus);
        Self::from_raw(conn, host)
    }

    pub(crate) fn raw(&self) -> *mut ffi::DBusConnection {
        self.handle.0
    }

    pub fn host(&self) -> &L {
        self.bridge.host()
    }

    /// Whether the connection is still open; `false` after the peer or bus
    /// goes away.
    pub fn is_connected(&self) -> bool {
        unsafe { ffi::dbus_connection_get_is_connected(self.handle.0) != 0 }
    }

    /// Registers an additional disconnect filter. Installing the same
    /// bridging setup on a connection twice (e.g. a server accepting two
    /// connections that happen to share data-slot state) is idempotent on
    /// the watch/timeout functions, but each call to this method adds one
    /// more filter; libdbus invokes every installed filter per message, so
    /// callers should install it at most once per logical disconnect
    /// handler.
    pub fn add_disconnect_filter<F>(&self, mut handler: F) -> Result<(), Error>
    where
        F: FnMut() + Send + 'static,
    {
        extern "C" fn filter_cb(
            conn: *mut ffi::DBusConnection,
            msg: *mut ffi::DBusMessage,
            data: *mut c_void,
        ) -> ffi::DBusHandlerResult {
            let _ = std::panic::catch_unwind(|| unsafe {
                let is_disconnect = ffi::dbus_message_is_signal(
                    msg,
                    b"org.freedesktop.DBus.Local\0".as_ptr() as *const _,
                    b"Disconnected\0".as_ptr() as *const _,
                ) != 0;
                if is_disconnect {
                    let cb: &mut (dyn FnMut() + Send) = &mut *(data as *mut Box<dyn FnMut() + Send>);
                    cb();
                    ffi::dbus_connection_unref(conn);
                }
            });
            // Lie: we want every other filter function installed on this
            // connection to run too, so each releases the reference it
            // holds. Returning HandledMessage here would stop the walk
            // after the first filter.
            ffi::DBusHandlerResult::NotYetHandled
        }

        let boxed: Box<Box<dyn FnMut() + Send>> = Box::new(Box::new(move || handler()));
        let data = Box::into_raw(boxed) as *mut c_void;

        extern "C" fn free_cb(data: *mut c_void) {
            unsafe { drop(Box::from_raw(data as *mut Box<dyn FnMut() + Send>)) };
        }

        let ok = unsafe {
            ffi::dbus_connection_add_filter(self.handle.0, Some(filter_cb), data, Some(free_cb))
        };
        if ok == 0 {
            unsafe { drop(Box::from_raw(data as *mut Box<dyn FnMut() + Send>)) };
            return Err(Error::no_memory());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_bus_choice_is_preserved() {
        let bus = BusChoice::Address("unix:path=/tmp/test-bus".into());
        match bus {
            BusChoice::Address(s) => assert_eq!(s, "unix:path=/tmp/test-bus"),
            _ => panic!("expected Address variant"),
        }
    }
}
