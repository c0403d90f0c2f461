//! App - the engine built from the ports.
//!
//! # Components
//! - **ManagerBuilder**: wiring and startup validation
//! - **ProcessManager**: creates processes, status/result/reset queries, lifecycle
//! - **Process**: executes steps of one saga instance
//! - **RecoverySweeper**: compensates abandoned processes in the background
//! - **ActiveProcesses**: in-memory per-id exclusivity shared by all of the above

pub mod active;
pub mod builder;
pub mod config;
mod engine;
pub mod manager;
pub mod process;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use self::active::{ActiveGuard, ActiveProcesses};
pub use self::builder::{BuildError, ManagerBuilder};
pub use self::config::{ConfigError, ManagerConfig};
pub use self::manager::ProcessManager;
pub use self::process::Process;
pub use self::sweeper::{RecoverySweeper, SweepReport};
