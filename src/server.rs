//! Server setup: listening for incoming D-Bus peer-to-peer connections and
//! binding each accepted connection into the host main loop.
//!
//! Grounded on `nih_dbus_server`/`nih_dbus_new_connection`: a connect
//! handler may veto a new connection before it is ever wired up; an
//! accepted connection is `ref`'d and bound exactly the way a client
//! connection is (`connection::Binding::from_raw`), and a disconnect
//! handler is attached to it.

use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;
use std::sync::{Arc, Mutex};

use crate::connection::Binding;
use crate::error::Error;
use crate::ffi;
use crate::mainloop::HostLoop;
use crate::watch::WatchBridge;

/// Called for each incoming connection before it is bound to the host loop.
/// Returning `false` drops the connection without ever registering watches
/// or timeouts for it.
pub type ConnectHandler<L> = Box<dyn FnMut(Binding<L>) -> bool + Send>;

/// Called after a previously accepted connection disconnects.
pub type DisconnectHandler = Box<dyn FnMut() + Send>;

struct ServerHandle(*mut ffi::DBusServer);

unsafe impl Send for ServerHandle {}
unsafe impl Sync for ServerHandle {}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        unsafe {
            ffi::dbus_server_set_watch_functions(self.0, None, None, None, ptr::null_mut(), None);
            ffi::dbus_server_set_timeout_functions(self.0, None, None, None, ptr::null_mut(), None);
            ffi::dbus_server_disconnect(self.0);
            ffi::dbus_server_unref(self.0);
        }
    }
}

struct ServerCallbacks<L: HostLoop> {
    host: L,
    connect: Mutex<Option<ConnectHandler<L>>>,
    disconnect: Mutex<Option<Arc<Mutex<DisconnectHandler>>>>,
}

/// A listening D-Bus server bound into a [`HostLoop`].
///
/// Every accepted connection is bridged onto the same `host` the server
/// itself uses, so a single host-loop implementation serves the server's
/// own listening socket and every connection it spawns.
pub struct Server<L: HostLoop> {
    handle: ServerHandle,
    bridge: Arc<WatchBridge<L>>,
    callbacks: Arc<ServerCallbacks<L>>,
}

impl<L: HostLoop + Clone + Send + 'static> Server<L> {
    /// Starts listening at `address` (in libdbus's own address syntax,
    /// e.g. `unix:path=/run/example/bus`).
    pub fn listen(address: &str, host: L) -> Result<Self, Error> {
        let c_addr = CString::new(address).map_err(|e| Error::from(e.to_string()))?;
        let mut e = ffi::error_empty();
        let server = unsafe { ffi::dbus_server_listen(c_addr.as_ptr(), &mut e) };
        if server.is_null() {
            return Err(Error::from_ffi(&e));
        }

        let bridge = Arc::new(WatchBridge::new(host));
        let bridge_ptr = Arc::as_ptr(&bridge) as *mut WatchBridge<L>;

        let (add_w, rm_w, tog_w, data_w) = unsafe { WatchBridge::install_watch_callbacks(bridge_ptr) };
        if unsafe { ffi::dbus_server_set_watch_functions(server, add_w, rm_w, tog_w, data_w, None) } == 0 {
            unsafe { ffi::dbus_server_unref(server) };
            return Err(Error::no_memory());
        }
        let (add_t, rm_t, tog_t, data_t) = unsafe { WatchBridge::install_timeout_callbacks(bridge_ptr) };
        if unsafe { ffi::dbus_server_set_timeout_functions(server, add_t, rm_t, tog_t, data_t, None) } == 0 {
            unsafe { ffi::dbus_server_unref(server) };
            return Err(Error::no_memory());
        }

        let callbacks = Arc::new(ServerCallbacks {
            host: bridge.host().clone(),
            connect: Mutex::new(None),
            disconnect: Mutex::new(None),
        });
        let callbacks_ptr = Arc::as_ptr(&callbacks) as *mut c_void;

        extern "C" fn new_connection_cb<L: HostLoop + Clone + Send + 'static>(
            _server: *mut ffi::DBusServer,
            conn: *mut ffi::DBusConnection,
            data: *mut c_void,
        ) {
            let _ = std::panic::catch_unwind(|| unsafe {
                let callbacks: &ServerCallbacks<L> = &*(data as *const ServerCallbacks<L>);
                ffi::dbus_connection_ref(conn);
                let binding = match Binding::from_raw(conn, callbacks.host.clone()) {
                    Ok(b) => b,
                    Err(_) => {
                        ffi::dbus_connection_unref(conn);
                        return;
                    }
                };

                if let Some(on_disconnect) = callbacks.disconnect.lock().unwrap().clone() {
                    let _ = binding.add_disconnect_filter(move || {
                        (on_disconnect.lock().unwrap())();
                    });
                }

                // The handler takes ownership of `binding`; if it returns
                // `false` without having squirreled the binding away
                // somewhere, it is simply dropped here, which closes the
                // connection. With no handler installed, nobody could ever
                // reach this connection, so it is dropped unconditionally.
                let mut guard = callbacks.connect.lock().unwrap();
                match guard.as_mut() {
                    Some(handler) => { handler(binding); }
                    None => drop(binding),
                }
            });
        }

        unsafe {
            ffi::dbus_server_set_new_connection_function(
                server,
                Some(new_connection_cb::<L>),
                callbacks_ptr,
                None,
            );
        }

        Ok(Server {
            handle: ServerHandle(server),
            bridge,
            callbacks,
        })
    }

    /// Sets (replacing any previous) the handler invoked for each newly
    /// accepted connection. The handler receives ownership of the bound
    /// [`Binding`]; returning `false` without retaining it drops (and so
    /// closes) the connection immediately, before any message is
    /// dispatched on it. Returning `true` is only meaningful if the
    /// handler has stored the binding somewhere that outlives the call.
    pub fn on_connect<F>(&self, handler: F)
    where
        F: FnMut(Binding<L>) -> bool + Send + 'static,
    {
        *self.callbacks.connect.lock().unwrap() = Some(Box::new(handler));
    }

    /// Sets (replacing any previous) the handler invoked when an accepted
    /// connection disconnects. Installed as a disconnect filter on every
    /// connection accepted from this point on; connections already bound
    /// before this call do not get it retroactively.
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        *self.callbacks.disconnect.lock().unwrap() = Some(Arc::new(Mutex::new(Box::new(handler))));
    }

    pub fn host(&self) -> &L {
        self.bridge.host()
    }

    pub(crate) fn raw(&self) -> *mut ffi::DBusServer {
        self.handle.0
    }
}

