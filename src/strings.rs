//! Validated wrapper types for strings with a specific D-Bus grammar, such
//! as a valid object path or a valid error name.
//!
//! Mirrors `dbus::strings`: the internal representation is a `CString`, so
//! these can be handed to libdbus without a conversion step, and validation
//! happens once, at construction, rather than deep inside a libdbus call.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::ops;
use std::os::raw::c_char;

use crate::ffi;

macro_rules! dstring_wrapper {
    ($(#[$comments:meta])* $t:ident, $validate:path) => {

$(#[$comments])*
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct $t<'a>(Cow<'a, CStr>);

impl<'a> $t<'a> {
    /// Validates `s` against the D-Bus grammar for this kind of name.
    #[cfg(not(feature = "no-string-validation"))]
    fn check_valid(c: &CStr) -> Result<(), String> {
        let mut e = ffi::error_empty();
        let ok = unsafe { $validate(c.as_ptr(), &mut e) };
        if ok != 0 { Ok(()) } else {
            Err(ffi::error_message(&e).unwrap_or("invalid D-Bus name").to_string())
        }
    }

    #[cfg(feature = "no-string-validation")]
    fn check_valid(_: &CStr) -> Result<(), String> { Ok(()) }

    /// Creates a new instance of this string, validating it first.
    pub fn new<S: Into<Vec<u8>>>(s: S) -> Result<$t<'a>, String> {
        let c = CString::new(s.into()).map_err(|e| e.to_string())?;
        Self::check_valid(&c)?;
        Ok($t(Cow::Owned(c)))
    }

    /// Views this name as a plain `&str`.
    pub fn as_str(&self) -> &str {
        self.0.to_str().expect("D-Bus names are always valid UTF-8")
    }

    /// Views this name as a `CStr`, ready to be handed to libdbus.
    pub fn as_cstr(&self) -> &CStr { &self.0 }

    pub(crate) fn as_ptr(&self) -> *const c_char { self.0.as_ptr() }

    /// Drops any borrow, producing a `'static` copy.
    pub fn into_static(self) -> $t<'static> { $t(Cow::Owned(self.0.into_owned())) }

    pub(crate) fn into_cstring(self) -> CString { self.0.into_owned() }
}

impl<'a> ops::Deref for $t<'a> {
    type Target = str;
    fn deref(&self) -> &str { self.as_str() }
}

impl<'a> fmt::Display for $t<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Panics if `s` is not a valid name of this kind. Use [`$t::new`] if you want
/// to handle the error instead.
impl<'a> From<&'a str> for $t<'a> {
    fn from(s: &'a str) -> $t<'a> { $t::new(s).unwrap() }
}

impl From<String> for $t<'static> {
    fn from(s: String) -> $t<'static> { $t::new(s).unwrap() }
}

}}

dstring_wrapper!(
    /// A validated D-Bus object path, e.g. `/org/example/Object`.
    Path, ffi::dbus_validate_path
);

dstring_wrapper!(
    /// A validated D-Bus interface name, e.g. `org.example.Interface`.
    Interface, ffi::dbus_validate_interface
);

dstring_wrapper!(
    /// A validated D-Bus member (method or signal) name.
    Member, ffi::dbus_validate_member
);

dstring_wrapper!(
    /// A validated D-Bus error name, e.g. `org.example.Error.Failed`.
    ErrorName, ffi::dbus_validate_error_name
);

dstring_wrapper!(
    /// A validated D-Bus bus name, e.g. `org.example.Service` or `:1.42`.
    BusName, ffi::dbus_validate_bus_name
);

impl<'a> Default for Path<'a> {
    fn default() -> Path<'a> { Path::new("/").unwrap() }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_path_roundtrips() {
        let p: Path = "/org/example/Object".into();
        assert_eq!(&*p, "/org/example/Object");
    }

    #[test]
    fn invalid_path_is_rejected() {
        assert!(Path::new("not-a-path").is_err());
    }

    #[test]
    fn valid_interface_roundtrips() {
        let i: Interface = "org.example.Interface".into();
        assert_eq!(&*i, "org.example.Interface");
    }

    #[test]
    fn invalid_error_name_is_rejected() {
        assert!(ErrorName::new("!!!").is_err());
    }
}
