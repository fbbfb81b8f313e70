//! Utility functions

pub mod bytes;
pub mod duration;

pub use bytes::{byte_len, render_byte_array, render_let_binding};
pub use duration::parse_duration;
