//! Object registration and message dispatch.
//!
//! Grounded on `nih_dbus_object_new`/`nih_dbus_object_destroy`/
//! `nih_dbus_object_unregister`/`nih_dbus_object_message`: a
//! `DBusObjectPathVTable` with an unregister and a message callback is
//! installed for one path on one connection; the message callback handles
//! Introspectable internally, defers Properties (not yet implemented, see
//! `Non-goals`), and otherwise walks the interface table for a
//! name-matching method.

use std::ffi::CString;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::ffi;
use crate::introspect;
use crate::message::Message;
use crate::strings::Path;

/// `Ok` carries zero or more reply messages to send back to the caller
/// (typically one method-return); `Err` is sent back as an error reply.
pub type MethodResult = Result<Vec<Message>, Error>;

/// A method marshaller: builds the reply (or error) for one incoming call.
pub type Marshaller<U> = Box<dyn Fn(&Object<U>, &Message) -> MethodResult + Send + Sync>;

/// Read/write access a property is introspected with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PropertyAccess {
    Read,
    Write,
    ReadWrite,
}

impl PropertyAccess {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            PropertyAccess::Read => "read",
            PropertyAccess::Write => "write",
            PropertyAccess::ReadWrite => "readwrite",
        }
    }
}

/// Direction an argument flows in a method's introspection entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgDirection {
    In,
    Out,
}

pub struct MethodDesc<U> {
    pub name: String,
    pub args: Vec<(String, String, ArgDirection)>,
    pub marshaller: Marshaller<U>,
}

pub struct SignalDesc {
    pub name: String,
    pub args: Vec<(String, String)>,
}

pub struct PropertyDesc {
    pub name: String,
    pub signature: String,
    pub access: PropertyAccess,
}

/// One D-Bus interface's worth of methods, signals and properties.
pub struct InterfaceDesc<U> {
    pub name: String,
    pub methods: Vec<MethodDesc<U>>,
    pub signals: Vec<SignalDesc>,
    pub properties: Vec<PropertyDesc>,
}

impl<U> InterfaceDesc<U> {
    pub fn new(name: impl Into<String>) -> Self {
        InterfaceDesc { name: name.into(), methods: Vec::new(), signals: Vec::new(), properties: Vec::new() }
    }

    pub fn with_method(mut self, method: MethodDesc<U>) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_signal(mut self, signal: SignalDesc) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_property(mut self, property: PropertyDesc) -> Self {
        self.properties.push(property);
        self
    }
}

/// Result handed back to libdbus for a message callback.
pub(crate) enum DispatchResult {
    Handled,
    NotYetHandled,
    NeedMemory,
}

/// An object bound to one (connection, path) pair, exporting a fixed table
/// of interfaces.
///
/// Invariant: while `registered` is `true`, the object is discoverable
/// through `conn`'s path tree; dropping the object (or D-Bus itself
/// unregistering the path, e.g. on disconnect) flips it to `false` exactly
/// once — the two teardown paths are idempotent with respect to each
/// other, as required by the `nih` original.
pub struct Object<U> {
    conn: *mut ffi::DBusConnection,
    path: Path<'static>,
    interfaces: Vec<InterfaceDesc<U>>,
    data: U,
    registered: AtomicBool,
}

unsafe impl<U: Send> Send for Object<U> {}
unsafe impl<U: Sync> Sync for Object<U> {}

const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";
const PROPERTIES: &str = "org.freedesktop.DBus.Properties";

impl<U: Send + Sync + 'static> Object<U> {
    /// Registers a new object at `path` on `conn` with the given interface
    /// table. The returned `Arc` must be kept alive for as long as the
    /// object should remain registered; dropping the last reference
    /// unregisters it (see the `Drop` impl).
    ///
    /// # Safety
    /// `conn` must outlive the returned object.
    pub unsafe fn new(
        conn: *mut ffi::DBusConnection,
        path: Path<'static>,
        interfaces: Vec<InterfaceDesc<U>>,
        data: U,
    ) -> Result<Arc<Self>, Error> {
        let object = Arc::new(Object {
            conn,
            path: path.clone(),
            interfaces,
            data,
            registered: AtomicBool::new(false),
        });

        let vtable = ffi::DBusObjectPathVTable {
            unregister_function: Some(unregister_cb::<U>),
            message_function: Some(message_cb::<U>),
            dbus_internal_pad1: None,
            dbus_internal_pad2: None,
            dbus_internal_pad3: None,
            dbus_internal_pad4: None,
        };

        let c_path = CString::new(path.as_str()).map_err(|e| Error::from(e.to_string()))?;
        let object_ptr = Arc::into_raw(object.clone()) as *mut c_void;
        let mut e = ffi::error_empty();
        let ok = ffi::dbus_connection_try_register_object_path(conn, c_path.as_ptr(), &vtable, object_ptr, &mut e);
        if ok == 0 {
            // Registration failed: reclaim the strong ref we just leaked into object_ptr.
            drop(Arc::from_raw(object_ptr as *const Object<U>));
            return Err(if ffi::error_is_set(&e) { Error::from_ffi(&e) } else { Error::no_memory() });
        }
        object.registered.store(true, Ordering::Release);
        Ok(object)
    }

    pub fn path(&self) -> &Path<'static> {
        &self.path
    }

    pub fn data(&self) -> &U {
        &self.data
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn interfaces(&self) -> &[InterfaceDesc<U>] {
        &self.interfaces
    }

    pub(crate) fn raw_conn(&self) -> *mut ffi::DBusConnection {
        self.conn
    }

    fn send_all(&self, replies: Vec<Message>) {
        for reply in replies {
            let mut serial = 0u32;
            unsafe { ffi::dbus_connection_send(self.conn, reply.ptr(), &mut serial) };
        }
    }

    fn dispatch(&self, msg: &Message) -> DispatchResult {
        if msg.is_method_call(INTROSPECTABLE, "Introspect") {
            let xml = introspect::introspect_xml(self);
            let mut reply = msg.method_return();
            reply.append_string_arg(&xml);
            self.send_all(vec![reply]);
            return DispatchResult::Handled;
        }

        if msg.is_method_call(PROPERTIES, "Get")
            || msg.is_method_call(PROPERTIES, "Set")
            || msg.is_method_call(PROPERTIES, "GetAll")
        {
            // Reserved for future implementation; falls through to D-Bus's
            // own default error reply, per the dispatch order.
            return DispatchResult::NotYetHandled;
        }

        let iface_name = match msg.interface() {
            Some(i) => i,
            None => return DispatchResult::NotYetHandled,
        };
        let member = match msg.member() {
            Some(m) => m,
            None => return DispatchResult::NotYetHandled,
        };

        for iface in &self.interfaces {
            if iface.name != iface_name.as_str() {
                continue;
            }
            for method in &iface.methods {
                if method.name != member.as_str() {
                    continue;
                }
                return match (method.marshaller)(self, msg) {
                    Ok(replies) => {
                        self.send_all(replies);
                        DispatchResult::Handled
                    }
                    Err(e) => {
                        self.send_all(vec![msg.error_reply(&e)]);
                        DispatchResult::Handled
                    }
                };
            }
        }

        DispatchResult::NotYetHandled
    }

    /// Unregisters this object ahead of time; subsequent messages for its
    /// path are no longer delivered to it. Safe to call more than once.
    pub fn unregister(&self) {
        if self.registered.swap(false, Ordering::AcqRel) {
            let c_path = CString::new(self.path.as_str()).unwrap();
            unsafe { ffi::dbus_connection_unregister_object_path(self.conn, c_path.as_ptr()) };
        }
    }
}

impl<U> Drop for Object<U> {
    fn drop(&mut self) {
        // `unregister` cannot be called from here (it needs `U: Send + Sync`
        // for the registration bound, but `Drop` has no such requirement);
        // the real teardown path is `unregister_cb`/`Object::unregister`,
        // both of which run before the last `Arc` is dropped. This impl
        // exists only so `registered` is observably false if a caller
        // somehow leaks past both.
        self.registered.store(false, Ordering::Release);
    }
}

extern "C" fn unregister_cb<U: Send + Sync + 'static>(_conn: *mut ffi::DBusConnection, data: *mut c_void) {
    let _ = std::panic::catch_unwind(|| {
        // Reclaim the strong reference handed to libdbus in `Object::new`.
        let object = unsafe { Arc::from_raw(data as *const Object<U>) };
        object.registered.store(false, Ordering::Release);
    });
}

extern "C" fn message_cb<U: Send + Sync + 'static>(
    _conn: *mut ffi::DBusConnection,
    message: *mut ffi::DBusMessage,
    data: *mut c_void,
) -> ffi::DBusHandlerResult {
    let result = std::panic::catch_unwind(|| unsafe {
        let object: &Object<U> = &*(data as *const Object<U>);
        if !object.is_registered() {
            return DispatchResult::NotYetHandled;
        }
        let msg = Message::from_ptr(message, true);
        object.dispatch(&msg)
    });
    match result {
        Ok(DispatchResult::Handled) => ffi::DBusHandlerResult::HandledMessage,
        Ok(DispatchResult::NotYetHandled) => ffi::DBusHandlerResult::NotYetHandled,
        Ok(DispatchResult::NeedMemory) => ffi::DBusHandlerResult::NeedMemory,
        Err(_) => ffi::DBusHandlerResult::NeedMemory,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn echo_interface() -> InterfaceDesc<()> {
        InterfaceDesc::new("com.example.Echo").with_method(MethodDesc {
            name: "Echo".into(),
            args: vec![
                ("request".into(), "s".into(), ArgDirection::In),
                ("reply".into(), "s".into(), ArgDirection::Out),
            ],
            marshaller: Box::new(|_obj, msg| Ok(vec![msg.method_return()])),
        })
    }

    #[test]
    fn interface_desc_builder_collects_declarations() {
        let iface = echo_interface();
        assert_eq!(iface.name, "com.example.Echo");
        assert_eq!(iface.methods.len(), 1);
        assert_eq!(iface.methods[0].args.len(), 2);
    }

    #[test]
    fn properties_interface_gating_depends_on_declared_properties() {
        let bare = echo_interface();
        assert!(bare.properties.is_empty());

        let with_prop = echo_interface().with_property(PropertyDesc {
            name: "Count".into(),
            signature: "i".into(),
            access: PropertyAccess::Read,
        });
        assert_eq!(with_prop.properties.len(), 1);
    }
}
