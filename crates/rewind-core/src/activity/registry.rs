//! ActivityRegistry - compensation lookup by `ActivityRef`.
//!
//! Every step stores the `TYPE` of its compensation; undoing the step (inline
//! or from the sweeper) goes through this registry, never through the value
//! the caller passed to `execute`.

use std::collections::HashMap;
use std::sync::Arc;

use super::contract::{Compensation, DynCompensation, NoCompensation, TypedCompensation};
use crate::domain::ActivityRef;

/// Maps compensation types to their (shared) implementations.
///
/// # Example
/// ```ignore
/// let mut registry = ActivityRegistry::new();
/// registry.register::<CancelHotel>()?;
/// registry.register_with(RefundCard::new(gateway))?;
/// ```
///
/// `NoCompensation` is always present.
pub struct ActivityRegistry {
    compensations: HashMap<ActivityRef, Arc<dyn DynCompensation>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("compensation for activity type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl ActivityRegistry {
    pub fn new() -> Self {
        let mut compensations: HashMap<ActivityRef, Arc<dyn DynCompensation>> = HashMap::new();
        compensations.insert(
            NoCompensation::activity_ref(),
            Arc::new(TypedCompensation::new(NoCompensation)),
        );
        Self { compensations }
    }

    /// Register a stateless compensation built from `Default`.
    pub fn register<C: Compensation + Default>(&mut self) -> Result<(), RegistryError> {
        self.register_with(C::default())
    }

    /// Register a configured compensation instance.
    pub fn register_with<C: Compensation>(&mut self, compensation: C) -> Result<(), RegistryError> {
        let key = C::activity_ref();
        if self.compensations.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(C::TYPE.to_string()));
        }
        self.compensations
            .insert(key, Arc::new(TypedCompensation::new(compensation)));
        Ok(())
    }

    pub fn get(&self, activity_ref: &ActivityRef) -> Option<Arc<dyn DynCompensation>> {
        self.compensations.get(activity_ref).cloned()
    }

    pub fn contains(&self, activity_ref: &ActivityRef) -> bool {
        self.compensations.contains_key(activity_ref)
    }

    /// Registered types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .compensations
            .keys()
            .map(|k| k.as_str().to_string())
            .collect();
        types.sort();
        types
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
