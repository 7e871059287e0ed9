use crate::domain::model::{ModuleId, PersistenceUnit};
use crate::domain::ports::{ComponentFactory, ComponentInstance, Module};
use crate::utils::error::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A module together with the persistence units resolved from it.
pub struct PersistentModule {
    module: Arc<dyn Module>,
    units: HashSet<PersistenceUnit>,
    factory: Arc<dyn ComponentFactory>,
    instances: Mutex<Vec<Box<dyn ComponentInstance>>>,
    tracked_at: DateTime<Utc>,
    destroyed: AtomicBool,
}

impl PersistentModule {
    pub fn new(
        module: Arc<dyn Module>,
        units: HashSet<PersistenceUnit>,
        factory: Arc<dyn ComponentFactory>,
    ) -> Result<Self> {
        if units.is_empty() {
            return Err(PersistenceError::EmptyUnitSet {
                module: module.id(),
            });
        }

        Ok(Self {
            module,
            units,
            factory,
            instances: Mutex::new(Vec::new()),
            tracked_at: Utc::now(),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ModuleId {
        self.module.id()
    }

    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    pub fn units(&self) -> &HashSet<PersistenceUnit> {
        &self.units
    }

    pub fn tracked_at(&self) -> DateTime<Utc> {
        self.tracked_at
    }

    /// Units sorted by name, then by location.
    pub fn sorted_units(&self, location_property: &str) -> Vec<&PersistenceUnit> {
        let mut units: Vec<&PersistenceUnit> = self.units.iter().collect();
        units.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.property(location_property).cmp(&b.property(location_property)))
        });
        units
    }

    /// Hands every unit to the factory. A unit the factory rejects is logged and left out.
    ///
    /// Returns the number of live instances.
    pub fn realize(&self) -> usize {
        let mut created = Vec::new();
        for unit in &self.units {
            match self.factory.create_instance(self.module.as_ref(), unit) {
                Ok(instance) => created.push(instance),
                Err(e) => {
                    tracing::error!(
                        module_id = %self.id(),
                        "❌ Cannot create persistence unit '{}' of module {}: {}",
                        unit.name,
                        self.module.name(),
                        e
                    );
                }
            }
        }

        let mut instances = self.lock_instances();
        instances.extend(created);
        instances.len()
    }

    pub fn instance_count(&self) -> usize {
        self.lock_instances().len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Disposes every live instance. Later calls do nothing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let instances = std::mem::take(&mut *self.lock_instances());
        tracing::info!(
            module_id = %self.id(),
            "Releasing {} persistence unit instance(s) of module {}",
            instances.len(),
            self.module.name()
        );
        for instance in instances {
            tracing::debug!(module_id = %self.id(), "Disposing unit {}", instance.unit_name());
            instance.dispose();
        }
    }

    // 某個 instance panic 後仍要能釋放其餘 instance
    fn lock_instances(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn ComponentInstance>>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for PersistentModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentModule")
            .field("module", &self.module)
            .field("units", &self.units.len())
            .field("tracked_at", &self.tracked_at)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
