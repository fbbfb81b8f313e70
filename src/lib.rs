//! evmrace - native vs. EVM benchmark harness
//!
//! This library measures the same algorithm on the same inputs twice: as a
//! natively compiled Rust binary and as bytecode run by the go-ethereum VM.
//!
//! # Architecture
//!
//! - **Models**: cases, input vectors and result tables
//! - **Benchmark**: code generation, builds, execution and orchestration
//! - **Utils**: duration parsing and byte-literal rendering

pub mod benchmark;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
