//! Impls - `ProcessStore` implementations.
//!
//! # Included
//! - **InMemoryProcessStore**: tests and the demo; can simulate outages
//! - **JsonFileProcessStore**: one JSON file per process, survives restarts
//!
//! A SQL-backed store belongs in its own crate.

pub mod file_store;
pub mod memory_store;

pub use self::file_store::JsonFileProcessStore;
pub use self::memory_store::InMemoryProcessStore;
