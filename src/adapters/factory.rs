use crate::domain::model::{ModuleId, PersistenceUnit};
use crate::domain::ports::{ComponentFactory, ComponentInstance, Module};
use crate::utils::error::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A factory that only records instance lifecycles in the log.
///
/// Stands in for a real persistence provider when the bridge runs on its own.
#[derive(Debug, Clone)]
pub struct LoggingFactory {
    location_property: String,
    live: Arc<AtomicUsize>,
}

impl LoggingFactory {
    pub fn new(location_property: impl Into<String>) -> Self {
        Self {
            location_property: location_property.into(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn live_instances(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl ComponentFactory for LoggingFactory {
    fn create_instance(
        &self,
        module: &dyn Module,
        unit: &PersistenceUnit,
    ) -> Result<Box<dyn ComponentInstance>> {
        tracing::info!(
            module_id = %module.id(),
            location = unit.property(&self.location_property).unwrap_or("?"),
            "Creating persistence unit instance '{}'",
            unit.name
        );
        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(LoggedInstance {
            module: module.id(),
            unit_name: unit.name.clone(),
            live: Arc::clone(&self.live),
        }))
    }
}

struct LoggedInstance {
    module: ModuleId,
    unit_name: String,
    live: Arc<AtomicUsize>,
}

impl ComponentInstance for LoggedInstance {
    fn unit_name(&self) -> &str {
        &self.unit_name
    }

    fn dispose(self: Box<Self>) {
        tracing::info!(module_id = %self.module, "Disposing persistence unit instance '{}'", self.unit_name);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
