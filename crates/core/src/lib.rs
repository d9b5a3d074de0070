//! Core types for acidkv
//!
//! This crate defines the vocabulary shared by the store implementations and
//! the transaction engine:
//!
//! - [`Value`]: schema-less document content (tagged map/array/scalar)
//! - [`DocKey`], [`Cas`], [`TxnId`], [`DurabilityLevel`], [`AtrPhase`]
//! - [`Error`]: the full error taxonomy, with conflict classification
//! - [`DocumentStore`]: the single-document store abstraction the engine
//!   coordinates over
//!
//! No coordination logic lives here — only contracts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use traits::DocumentStore;
pub use types::{AtrPhase, Cas, DocKey, DurabilityLevel, TxnId, Versioned};
pub use value::Value;
