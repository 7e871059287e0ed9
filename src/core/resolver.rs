use crate::config::DiscoveryConfig;
use crate::core::unmarshal::DescriptorContext;
use crate::domain::model::{ModuleId, Persistence, PersistenceUnit};
use crate::domain::ports::Module;
use crate::utils::error::{PersistenceError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// A declared location that contributed nothing.
#[derive(Debug)]
pub struct SkippedLocation {
    pub location: String,
    pub reason: PersistenceError,
}

/// Outcome of resolving one module.
#[derive(Debug)]
pub enum Resolution {
    /// No header and no default descriptor.
    NotPersistent,
    /// Descriptors were declared but none produced a unit.
    Empty {
        declared: String,
        skipped: Vec<SkippedLocation>,
    },
    Units {
        declared: String,
        units: HashSet<PersistenceUnit>,
        skipped: Vec<SkippedLocation>,
    },
}

impl Resolution {
    pub fn units(&self) -> Option<&HashSet<PersistenceUnit>> {
        match self {
            Resolution::Units { units, .. } => Some(units),
            _ => None,
        }
    }

    pub fn skipped(&self) -> &[SkippedLocation] {
        match self {
            Resolution::NotPersistent => &[],
            Resolution::Empty { skipped, .. } | Resolution::Units { skipped, .. } => skipped,
        }
    }
}

/// Splits a `Meta-Persistence` value: comma separated, trimmed, empty entries dropped.
pub fn split_locations(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub struct Resolver {
    context: Arc<DescriptorContext>,
    discovery: DiscoveryConfig,
}

impl Resolver {
    pub fn new(context: Arc<DescriptorContext>, discovery: DiscoveryConfig) -> Self {
        Self { context, discovery }
    }

    pub fn resolve(&self, module: &dyn Module) -> Resolution {
        tracing::debug!(module_id = %module.id(), "Analysing module {}", module.name());

        let Some(declared) = self.declared_locations(module) else {
            return Resolution::NotPersistent;
        };
        tracing::info!(
            module_id = %module.id(),
            "{} header found in module {}: {}",
            self.discovery.header,
            module.name(),
            declared
        );

        let mut units = HashSet::new();
        let mut skipped = Vec::new();

        for location in split_locations(&declared) {
            tracing::info!(module_id = %module.id(), location, "Analysing location");

            match self.load_location(module, location) {
                Ok(persistence) => {
                    for mut unit in persistence.persistence_units {
                        // 先蓋上 location 再放入 set，不同檔案的相同 unit 不會合併
                        unit.stamp_location(&self.discovery.location_property, location);
                        tracing::info!(
                            module_id = %module.id(),
                            location,
                            "Adding persistence unit {}",
                            unit.name
                        );
                        units.insert(unit);
                    }
                }
                Err(reason) => {
                    tracing::error!(
                        module_id = %module.id(),
                        location,
                        "❌ Skipping location in module {}: {}",
                        module.name(),
                        reason
                    );
                    skipped.push(SkippedLocation {
                        location: location.to_string(),
                        reason,
                    });
                }
            }
        }

        if units.is_empty() {
            Resolution::Empty { declared, skipped }
        } else {
            Resolution::Units {
                declared,
                units,
                skipped,
            }
        }
    }

    /// Header value, or the default descriptor path for non-system modules that ship one.
    fn declared_locations(&self, module: &dyn Module) -> Option<String> {
        if let Some(value) = module
            .header(&self.discovery.header)
            .filter(|v| !v.trim().is_empty())
        {
            return Some(value);
        }

        let system = ModuleId(self.discovery.system_module_id);
        if module.id() != system && module.resource(&self.discovery.default_location).is_some() {
            return Some(self.discovery.default_location.clone());
        }

        None
    }

    fn load_location(&self, module: &dyn Module, location: &str) -> Result<Persistence> {
        let resource =
            module
                .resource(location)
                .ok_or_else(|| PersistenceError::LocationUnresolvable {
                    module: module.id(),
                    location: location.to_string(),
                })?;

        tracing::debug!(module_id = %module.id(), url = resource.url(), "Unmarshalling descriptor");
        self.context.unmarshal_resource(&resource)
    }
}
