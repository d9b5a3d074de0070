//! Store implementations for acidkv
//!
//! - [`MemoryStore`]: the in-process reference implementation of
//!   [`acidkv_core::DocumentStore`], suitable for embedding and tests.
//! - [`CrashStore`]: a fault-injecting wrapper that starts refusing writes
//!   after a budget is spent, used to simulate a process dying at any point
//!   of the commit sequence.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod testing;

pub use memory::MemoryStore;
pub use testing::CrashStore;
