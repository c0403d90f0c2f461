//! ManagerBuilder - wiring and startup validation.
//!
//! # Fail-fast
//! - `expect_activities()` declares the compensation types this deployment needs
//! - `build()` checks "expected ⊆ registered" and validates the config
//!
//! A missing compensation would otherwise surface much later, when the
//! sweeper tries to undo a step logged by a previous release.

use std::sync::Arc;

use super::config::{ConfigError, ManagerConfig};
use super::engine::Engine;
use super::manager::ProcessManager;
use crate::activity::{ActivityRegistry, Compensation, RegistryError};
use crate::ports::{Clock, IdGenerator, ProcessStore, SystemClock, UlidGenerator};

/// Builds a `ProcessManager`.
///
/// ```ignore
/// let manager = ManagerBuilder::new(Arc::new(store))
///     .with_config(config)
///     .register::<CancelHotel>()?
///     .register_with(RefundCard::new(gateway))?
///     .expect_activities(&["travel.hotel.cancel.v1", "billing.card.refund.v1"])
///     .build()?;
/// ```
pub struct ManagerBuilder {
    store: Arc<dyn ProcessStore>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: ManagerConfig,
    registry: ActivityRegistry,
    expected_activities: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing activity types: {0:?}. These compensations were expected but not registered.")]
    MissingActivityTypes(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ManagerBuilder {
    pub fn new(store: Arc<dyn ProcessStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ids: None,
            config: ManagerConfig::default(),
            registry: ActivityRegistry::new(),
            expected_activities: None,
        }
    }

    /// Clock for timestamps and staleness; also drives the default id generator.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register<C: Compensation + Default>(mut self) -> Result<Self, RegistryError> {
        self.registry.register::<C>()?;
        Ok(self)
    }

    pub fn register_with<C: Compensation>(mut self, compensation: C) -> Result<Self, RegistryError> {
        self.registry.register_with(compensation)?;
        Ok(self)
    }

    pub fn expect_activities(mut self, activity_types: &[&str]) -> Self {
        self.expected_activities = Some(activity_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<ProcessManager, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_activities {
            let registered = self.registry.registered_types();
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !registered.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingActivityTypes(missing));
            }
        }

        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
        };
        let engine = Engine {
            store: self.store,
            registry: self.registry,
            clock: self.clock,
        };
        Ok(ProcessManager::new(engine, ids, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::contract::testing::Scripted;
    use crate::activity::NoCompensation;
    use crate::impls::InMemoryProcessStore;

    fn store() -> Arc<dyn ProcessStore> {
        Arc::new(InMemoryProcessStore::new())
    }

    #[test]
    fn build_with_expected_activities() {
        let manager = ManagerBuilder::new(store())
            .register::<Scripted>()
            .unwrap()
            .expect_activities(&[Scripted::TYPE, NoCompensation::TYPE])
            .build()
            .unwrap();
        assert_eq!(manager.activity_types(), vec!["rewind.noop.v1", "test.scripted.v1"]);
        assert!(!manager.is_running());
    }

    #[test]
    fn build_reports_missing_activity_types() {
        let result = ManagerBuilder::new(store())
            .expect_activities(&[Scripted::TYPE, "billing.card.refund.v1"])
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingActivityTypes(missing))
                if missing == vec!["test.scripted.v1".to_string(), "billing.card.refund.v1".to_string()]
        ));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = ManagerConfig {
            sweep_interval_ms: 0,
            ..ManagerConfig::default()
        };
        let result = ManagerBuilder::new(store()).with_config(config).build();
        assert!(matches!(result, Err(BuildError::Config(ConfigError::Zero("sweep_interval_ms")))));
    }

    #[test]
    fn duplicate_registration_fails_fast() {
        let result = ManagerBuilder::new(store())
            .register::<Scripted>()
            .and_then(|b| b.register::<Scripted>());
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }
}
