//! Ports - abstraction layer.
//!
//! Hexagonal "ports": each trait hides an external concern (durable storage,
//! time, id generation) so the engine can be tested with in-memory or fixed
//! implementations.
//!
//! # Principles
//! - The process store is the source of truth.
//! - Everything in memory (active ids, handles) can be rebuilt from it.

pub mod clock;
pub mod id_generator;
pub mod process_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::process_store::ProcessStore;
