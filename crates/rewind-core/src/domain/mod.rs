//! Domain model: ids, states, the step log record, payloads and errors.

pub mod errors;
pub mod ids;
pub mod payload;
pub mod record;
pub mod state;

pub use self::errors::{ActivityFailure, ErrorKind, ProcessError, StoreError};
pub use self::ids::{CorrelationId, ProcessId};
pub use self::payload::{ActivityParameters, ProcessResult};
pub use self::record::{ActivityRef, ProcessRecord, StepRecord, TransitionError};
pub use self::state::{ProcessState, StepOutcome};
