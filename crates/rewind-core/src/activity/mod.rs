//! Activity contract - the forward/backward halves of a saga step.
//!
//! Two layers:
//! - **typed**: `Forward`, `Compensation` (with `const TYPE`), `Activity`
//! - **dyn**: `DynCompensation`, object-safe, stored in the `ActivityRegistry`
//!
//! Only the compensation half is ever looked up by key. The forward half is
//! called directly by the process that executes the step; the backward half
//! may run in another process (the sweeper) long after the original activity
//! value is gone, so it is rebuilt from its `TYPE`.

pub mod contract;
pub mod registry;

pub use self::contract::{
    Activity, Compensation, DynCompensation, Forward, NoCompensation, TypedCompensation,
};
pub use self::registry::{ActivityRegistry, RegistryError};
