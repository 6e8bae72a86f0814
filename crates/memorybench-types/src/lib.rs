//! Shared memorybench model types.
//!
//! Pure data types used by the checkpoint store, the run engine, and the
//! provider adapters. Kept in their own crate so state backends and the
//! engine can share them without circular dependencies.

pub mod checkpoint;
pub mod concurrency;
pub mod dataset;
pub mod error;
pub mod phase;
pub mod state;
