//! D-Bus error type.
//!
//! Distinguishes a D-Bus-named error (carrying a reverse-DNS error name that
//! can be mirrored back to a remote caller) from a generic system/OOM error
//! and from a local string-validation failure.

use std::{fmt, ptr};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::ffi;
use crate::strings::ErrorName;

/// A D-Bus error.
///
/// This is always a named error (`org.freedesktop.DBus.Error.Failed` and
/// friends are just conventional names, not a distinct variant) except for
/// [`Error::InvalidString`], which never crosses the wire: it is raised
/// locally when a caller-supplied string fails D-Bus string validation
/// before any message is ever built.
pub enum Error {
    /// A named D-Bus error, with a message. Mirrored verbatim in a method
    /// error reply when returned from a marshaller.
    Named(CString, Option<CString>),
    /// A generic system/OOM error, with an errno and a message. Carries no
    /// D-Bus name and is never sent to a remote peer.
    Errno(i32, String),
    /// A caller-supplied string was not a valid D-Bus name of the expected kind.
    InvalidString(String),
}

impl Error {
    /// Raises a new D-Bus-named error with a literal message.
    pub fn raise<'a, N: Into<ErrorName<'a>>>(name: N, message: &str) -> Error {
        let n = CString::new(name.into().into_cstring().into_bytes()).unwrap();
        let m = CString::new(message.replace('%', "%%")).unwrap_or_default();
        Error::Named(n, Some(m))
    }

    /// Raises a new D-Bus-named error, formatting the message the way
    /// `nih_dbus_error_raise_printf` does.
    pub fn raise_fmt<'a, N: Into<ErrorName<'a>>>(name: N, args: fmt::Arguments) -> Error {
        Error::raise(name, &fmt::format(args))
    }

    /// The generic `org.freedesktop.DBus.Error.Failed` error.
    pub fn failed(message: &str) -> Error {
        Error::raise("org.freedesktop.DBus.Error.Failed", message)
    }

    /// An out-of-memory condition encountered while setting up a connection,
    /// watch, timeout or object. Has no D-Bus name: per the error model, this
    /// is a generic system error (`errno == libc::ENOMEM`), not a wire error.
    pub fn no_memory() -> Error {
        Error::Errno(libc::ENOMEM, "Out of memory".to_string())
    }

    pub(crate) fn from_raw_parts(name: *const c_char, message: *const c_char) -> Option<Error> {
        if name.is_null() {
            return None;
        }
        let n = unsafe { CStr::from_ptr(name) }.to_owned();
        let m = if message.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(message) }.to_owned())
        };
        Some(Error::Named(n, m))
    }

    /// Converts a populated `ffi::DBusError` out-parameter into our error type.
    pub(crate) fn from_ffi(e: &ffi::DBusError) -> Error {
        match ffi::error_name(e) {
            Some(n) => Error::raise(n, ffi::error_message(e).unwrap_or("")),
            None => Error::failed("unknown D-Bus error"),
        }
    }

    /// The D-Bus error name, e.g. `org.freedesktop.DBus.Error.Failed`.
    ///
    /// `None` for [`Error::Errno`] and [`Error::InvalidString`], neither of
    /// which is a wire error.
    pub fn name(&self) -> Option<&str> {
        match self {
            Error::Named(n, _) => n.to_str().ok(),
            Error::Errno(..) | Error::InvalidString(_) => None,
        }
    }

    /// The human-readable message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Error::Named(_, m) => m.as_ref().and_then(|m| m.to_str().ok()),
            Error::Errno(_, s) | Error::InvalidString(s) => Some(s.as_str()),
        }
    }

    /// `true` if this is the fixed sentinel used to identify "this is a
    /// D-Bus-named error" as opposed to a generic system error.
    pub fn is_dbus_named(&self) -> bool {
        matches!(self, Error::Named(..))
    }

    pub(crate) fn name_ptr(&self) -> *const c_char {
        match self {
            Error::Named(n, _) => n.as_ptr(),
            Error::Errno(..) | Error::InvalidString(_) => ptr::null(),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Named(n, m) => write!(f, "D-Bus error: {} ({})",
                m.as_ref().and_then(|m| m.to_str().ok()).unwrap_or(""),
                n.to_str().unwrap_or("")),
            Error::Errno(e, s) => write!(f, "system error (errno {}): {}", e, s),
            Error::InvalidString(s) => write!(f, "invalid D-Bus string: {}", s),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.message() {
            Some(m) => write!(f, "{}", m),
            None => Ok(()),
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error {
    fn from(s: String) -> Error { Error::InvalidString(s) }
}
