//! Domain models
//!
//! Benchmark cases with their input vectors, and the result records the
//! pipeline produces for them.

pub mod benchmark;
pub mod case;

pub use benchmark::*;
pub use case::*;
