#![forbid(unsafe_code)]

//! Shared models and pure logic for the compliance gate.
//!
//! Nothing in this crate performs I/O. The engine crate drives these types
//! through the evaluation service; the CLI wires both together.

pub mod aggregate;
pub mod api;
pub mod backoff;
pub mod error;
pub mod model;
pub mod validation;

mod util;

pub use util::{new_ulid, now_ms};
