//! A thin, non-marshalling wrapper around `ffi::DBusMessage`.
//!
//! Reference counting, message-type/path/interface/member accessors, and
//! method-return/error reply construction only. Argument marshalling (the
//! `arg`/`Append`/`Get` machinery in `dbus::message`/`dbus::arg`) is out of
//! scope here; a reply's body is appended with the single string-argument
//! helper introspection needs and nothing more general.

use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_char;

use crate::error::Error;
use crate::ffi;
use crate::strings::{ErrorName, Interface, Member, Path};

/// One of the four D-Bus message types.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MessageType {
    MethodCall,
    MethodReturn,
    Error,
    Signal,
    Other(i32),
}

impl MessageType {
    fn from_raw(t: i32) -> MessageType {
        match t {
            1 => MessageType::MethodCall,
            2 => MessageType::MethodReturn,
            3 => MessageType::Error,
            4 => MessageType::Signal,
            other => MessageType::Other(other),
        }
    }
}

/// A D-Bus message: headers (destination, path, interface, member) plus an
/// opaque body this crate never decodes.
pub struct Message {
    msg: *mut ffi::DBusMessage,
}

unsafe impl Send for Message {}

impl Message {
    pub(crate) fn from_ptr(ptr: *mut ffi::DBusMessage, add_ref: bool) -> Message {
        if add_ref {
            unsafe { ffi::dbus_message_ref(ptr) };
        }
        Message { msg: ptr }
    }

    pub(crate) fn ptr(&self) -> *mut ffi::DBusMessage {
        self.msg
    }

    fn get_str(&self, raw: *const c_char) -> Option<String> {
        if raw.is_null() {
            None
        } else {
            unsafe { CStr::from_ptr(raw) }.to_str().ok().map(String::from)
        }
    }

    pub fn msg_type(&self) -> MessageType {
        MessageType::from_raw(unsafe { ffi::dbus_message_get_type(self.msg) })
    }

    pub fn path(&self) -> Option<Path<'static>> {
        self.get_str(unsafe { ffi::dbus_message_get_path(self.msg) })
            .and_then(|s| Path::new(s).ok())
    }

    pub fn interface(&self) -> Option<Interface<'static>> {
        self.get_str(unsafe { ffi::dbus_message_get_interface(self.msg) })
            .and_then(|s| Interface::new(s).ok())
    }

    pub fn member(&self) -> Option<Member<'static>> {
        self.get_str(unsafe { ffi::dbus_message_get_member(self.msg) })
            .and_then(|s| Member::new(s).ok())
    }

    /// `true` if this message is a method call matching `iface`/`member`.
    pub fn is_method_call(&self, iface: &str, member: &str) -> bool {
        unsafe {
            let i = CString::new(iface).unwrap();
            let m = CString::new(member).unwrap();
            ffi::dbus_message_is_method_call(self.msg, i.as_ptr(), m.as_ptr()) != 0
        }
    }

    /// Builds a method-return reply for this (method call) message.
    pub fn method_return(&self) -> Message {
        let ptr = unsafe { ffi::dbus_message_new_method_return(self.msg) };
        Message { msg: ptr }
    }

    /// Builds an error reply for this message from a crate [`Error`].
    ///
    /// Panics if `err` is not a D-Bus-named error (`Error::Errno`/`InvalidString`
    /// never cross the wire, see `error::Error`); callers must not try to
    /// reply with one.
    pub fn error_reply(&self, err: &Error) -> Message {
        let name = err.name().expect("error_reply requires a D-Bus-named error");
        let message = err.message().unwrap_or("");
        let n = ErrorName::new(name).unwrap();
        let m = CString::new(message.replace('\0', "")).unwrap_or_default();
        let ptr = unsafe { ffi::dbus_message_new_error(self.msg, n.as_ptr(), m.as_ptr()) };
        Message { msg: ptr }
    }

    /// Appends a single string argument to the message body. The only
    /// marshalling operation this crate performs directly; used to append
    /// the `xml_data` output argument of an Introspect reply.
    pub fn append_string_arg(&mut self, s: &str) {
        let c = CString::new(s).unwrap_or_default();
        let mut iter: ffi::DBusMessageIter = unsafe { std::mem::zeroed() };
        unsafe {
            ffi::dbus_message_iter_init_append(self.msg, &mut iter);
            let ptr = c.as_ptr();
            ffi::dbus_message_iter_append_basic(
                &mut iter,
                ffi::DBUS_TYPE_STRING,
                &ptr as *const _ as *const std::os::raw::c_void,
            );
        }
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        unsafe { ffi::dbus_message_unref(self.msg) };
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut d = f.debug_struct("Message");
        d.field("type", &self.msg_type());
        if let Some(p) = self.path() {
            d.field("path", &p.as_str().to_string());
        }
        if let Some(i) = self.interface() {
            d.field("interface", &i.as_str().to_string());
        }
        if let Some(m) = self.member() {
            d.field("member", &m.as_str().to_string());
        }
        d.finish()
    }
}
