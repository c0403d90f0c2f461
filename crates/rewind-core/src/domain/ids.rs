//! Domain identifiers.
//!
//! Two kinds of identity live here:
//! - `CorrelationId`: supplied by the caller, the primary key of a process.
//! - `Id<T>`: internal ULID-based ids, phantom-typed so different id kinds
//!   cannot be mixed up.
//!
//! ## ULID
//! - sortable by creation time (timestamp in the high bits)
//! - generated without coordination
//! - 128-bit, same size as a UUID

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for each id kind.
///
/// Provides the prefix used by `Display` (e.g. "process-").
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID id.
///
/// `T` only exists at compile time (`PhantomData`), so `Id<T>` has the same
/// size as a bare `Ulid`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for process instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Process {}

impl IdMarker for Process {
    fn prefix() -> &'static str {
        "process-"
    }
}

/// Internal identifier of a process instance (one per record, kept across resets).
pub type ProcessId = Id<Process>;

/// Caller-supplied identifier binding all steps of one saga instance.
///
/// Immutable once a process is created; every lookup goes through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_display_has_prefix() {
        let ulid = Ulid::new();
        let id = ProcessId::from_ulid(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert!(id.to_string().starts_with("process-"));
    }

    #[test]
    fn process_ids_are_sortable() {
        let id1 = ProcessId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = ProcessId::from_ulid(Ulid::new());
        assert!(id1 < id2);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<ProcessId>(), size_of::<Ulid>());
    }

    #[test]
    fn correlation_id_serializes_as_plain_string() {
        let cid = CorrelationId::from("order-42");
        let s = serde_json::to_string(&cid).unwrap();
        assert_eq!(s, "\"order-42\"");
        let back: CorrelationId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, cid);
        assert_eq!(back.to_string(), "order-42");
    }
}
