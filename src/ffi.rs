//! Thin boundary around the `libdbus-sys` FFI bindings.
//!
//! This module adds no behavior of its own; it just gives the rest of the
//! crate a single `use crate::ffi;` import (as `dbus/src/lib.rs` does with
//! `extern crate libdbus_sys as ffi`) plus a couple of helpers for the
//! `DBusError` out-parameter pattern that every libdbus call uses.

use std::ffi::CStr;

pub use libdbus_sys::*;

/// A zero-initialized, `dbus_error_init`-ed `DBusError` ready to be passed
/// as an out-parameter to a libdbus call.
pub(crate) fn error_empty() -> DBusError {
    let mut e = DBusError {
        name: std::ptr::null(),
        message: std::ptr::null(),
        dummy: 0,
        padding1: std::ptr::null(),
    };
    unsafe { dbus_error_init(&mut e) };
    e
}

pub(crate) fn error_is_set(e: &DBusError) -> bool {
    unsafe { dbus_error_is_set(e as *const _ as *mut _) != 0 }
}

pub(crate) fn error_name(e: &DBusError) -> Option<&str> {
    if e.name.is_null() { None } else { unsafe { CStr::from_ptr(e.name) }.to_str().ok() }
}

pub(crate) fn error_message(e: &DBusError) -> Option<&str> {
    if e.message.is_null() { None } else { unsafe { CStr::from_ptr(e.message) }.to_str().ok() }
}
