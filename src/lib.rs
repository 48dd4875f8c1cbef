//! D-Bus main-loop integration core.
//!
//! This crate binds a D-Bus connection or server to a host-supplied
//! cooperative main loop (see [`mainloop::HostLoop`]), and layers a
//! per-connection object registry on top: register an
//! [`object::Object`] at a path with a table of interfaces, and incoming
//! method calls are dispatched to the matching marshaller, with
//! introspection answered automatically.
//!
//! Argument marshalling (encoding/decoding D-Bus wire types into Rust
//! values) is deliberately out of scope; [`message::Message`] exposes only
//! headers and the one string-append helper introspection needs. Callers
//! are expected to read and write message bodies with whatever argument
//! library they already use.

#![warn(missing_docs)]

extern crate libc;

#[allow(missing_docs)]
extern crate libdbus_sys;

pub mod connection;
pub mod error;
pub(crate) mod ffi;
pub mod introspect;
pub mod mainloop;
pub mod message;
pub mod object;
pub mod path;
pub mod server;
pub mod strings;
pub(crate) mod watch;

pub use connection::{Binding, BusChoice};
pub use error::Error;
pub use mainloop::{HostLoop, IoCallback, IoInterest, IterationCallback, TimerCallback};
pub use message::{Message, MessageType};
pub use object::{ArgDirection, InterfaceDesc, MethodDesc, MethodResult, Object, PropertyAccess, PropertyDesc, SignalDesc};
pub use path::make_path;
pub use server::{ConnectHandler, DisconnectHandler, Server};
pub use strings::{BusName, ErrorName, Interface, Member, Path};
