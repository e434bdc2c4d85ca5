//! Test infrastructure for the storage engine.
//!
//! Fixtures build storage over a [`MemoryBucket`](formkit_persistence::MemoryBucket)
//! and sample payloads; [`racing`] simulates a second writer.

#![allow(dead_code)]

pub mod fixtures;
pub mod racing;

// Re-export commonly used items
pub use fixtures::*;
pub use racing::*;
