//! Benchmark pipeline
//!
//! Each input of a case is measured in two environments:
//!
//! 1. **Native** (`builder.rs`, `executor.rs`): the case's Rust template
//!    project is filled with the input, compiled with cargo and the binary
//!    is timed over repeated invocations.
//!
//! 2. **VM** (`executor.rs`): the case's Go harness is filled with the same
//!    input, injected into the go-ethereum runtime package and measured with
//!    `go test -bench`.
//!
//! `orchestrator.rs` drives both phases and `aggregator.rs` writes the
//! resulting tables.

pub mod aggregator;
pub mod builder;
pub mod codegen;
pub mod executor;
pub mod orchestrator;
pub mod process;
pub mod workspace;

pub use aggregator::ResultWriter;
pub use builder::BuildDriver;
pub use executor::{NativeExecutor, VmExecutor};
pub use orchestrator::Orchestrator;
pub use process::{CommandRunner, SystemRunner};
