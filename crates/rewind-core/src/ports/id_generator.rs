//! IdGenerator port - id generation behind a trait.
//!
//! # Implementation
//! - **UlidGenerator**: ULID based, timestamp taken from a `Clock`

use crate::domain::ids::ProcessId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator produces internal process ids.
///
/// `Send + Sync`: shared by every task that creates processes.
pub trait IdGenerator: Send + Sync {
    fn generate_process_id(&self) -> ProcessId;
}

/// ULID generator whose timestamp part comes from the injected clock.
///
/// With a `FixedClock` the timestamp is deterministic; the random part still
/// keeps ids unique.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_process_id(&self) -> ProcessId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        ProcessId::from(ulid)
    }
}
