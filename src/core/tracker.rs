use crate::config::ExtenderConfig;
use crate::core::persistent_module::PersistentModule;
use crate::core::resolver::{Resolution, Resolver};
use crate::core::unmarshal::DescriptorContext;
use crate::domain::model::ModuleId;
use crate::domain::ports::{
    ComponentFactory, Module, ModuleEvent, ModuleEventKind, ModuleListener, ModuleSource,
    SubscriptionId,
};
use crate::utils::error::{PersistenceError, Result};
use crate::utils::validation::Validate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Unobserved,
    Resolving,
    Tracked,
    Ignored,
}

enum TrackingEntry {
    Resolving,
    Tracked(Arc<PersistentModule>),
    Ignored,
}

impl TrackingEntry {
    fn state(&self) -> TrackingState {
        match self {
            TrackingEntry::Resolving => TrackingState::Resolving,
            TrackingEntry::Tracked(_) => TrackingState::Tracked,
            TrackingEntry::Ignored => TrackingState::Ignored,
        }
    }
}

struct Session {
    resolver: Arc<Resolver>,
    subscription: Option<(Arc<dyn ModuleSource>, SubscriptionId)>,
}

/// Watches modules come and go and keeps a [`PersistentModule`] for every
/// module that declares at least one persistence unit.
///
/// A failure while handling one module only leaves that module untracked.
pub struct PersistenceTracker {
    config: ExtenderConfig,
    factory: Arc<dyn ComponentFactory>,
    session: RwLock<Option<Session>>,
    entries: DashMap<ModuleId, TrackingEntry>,
}

impl PersistenceTracker {
    pub fn new(config: ExtenderConfig, factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            config,
            factory,
            session: RwLock::new(None),
            entries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ExtenderConfig {
        &self.config
    }

    /// Creates the descriptor context, starts listening to `source` and picks
    /// up the modules that are already active.
    pub fn open(self: &Arc<Self>, source: Arc<dyn ModuleSource>) -> Result<()> {
        self.config.validate()?;

        {
            let mut session = self.write_session();
            if session.is_some() {
                return Err(PersistenceError::TrackerAlreadyOpen);
            }
            let context = Arc::new(DescriptorContext::new(
                self.config.descriptor.target_namespace.as_str(),
            ));
            tracing::debug!("Descriptor context bound to {}", context.target_namespace());
            *session = Some(Session {
                resolver: Arc::new(Resolver::new(context, self.config.discovery.clone())),
                subscription: None,
            });
        }

        // 上次 session 留下的紀錄：Ignored 重新解析，Tracked 待確認是否仍在
        self.entries
            .retain(|_, entry| !matches!(entry, TrackingEntry::Ignored));
        let previous: Vec<(ModuleId, Arc<PersistentModule>)> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.value() {
                TrackingEntry::Tracked(persistent) => Some((*entry.key(), Arc::clone(persistent))),
                _ => None,
            })
            .collect();

        let listener: Arc<dyn ModuleListener> = self.clone();
        let subscription = source.subscribe(listener);
        if let Some(session) = self.write_session().as_mut() {
            session.subscription = Some((Arc::clone(&source), subscription));
        }

        let active = source.active_modules();
        let active_ids: HashSet<ModuleId> = active.iter().map(|module| module.id()).collect();
        for (id, persistent) in previous {
            if !active_ids.contains(&id) {
                self.release_stale(id, &persistent);
            }
        }

        tracing::info!("🔍 Persistence tracker opened, {} active module(s)", active.len());
        for module in active {
            self.module_added(module);
        }

        Ok(())
    }

    /// Stops listening and drops the descriptor context.
    ///
    /// Tracked modules stay registered; use [`Self::destroy_all`] to release them.
    /// The next [`Self::open`] releases those that left in the meantime.
    pub fn close(&self) {
        let session = self.write_session().take();
        let Some(session) = session else {
            tracing::debug!("Persistence tracker already closed");
            return;
        };

        if let Some((source, subscription)) = session.subscription {
            source.unsubscribe(subscription);
        }
        tracing::info!(
            "Persistence tracker closed, {} module(s) still tracked",
            self.tracked_modules().len()
        );
    }

    pub fn is_open(&self) -> bool {
        self.read_session().is_some()
    }

    pub fn module_added(&self, module: Arc<dyn Module>) {
        let id = module.id();
        let resolver = match self.resolver() {
            Ok(resolver) => resolver,
            Err(e) => {
                tracing::warn!(module_id = %id, "{}, module {} not analysed", e, module.name());
                return;
            }
        };

        match self.entries.entry(id) {
            Entry::Occupied(_) => {
                tracing::debug!(module_id = %id, "Module {} already observed", module.name());
                return;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TrackingEntry::Resolving);
            }
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.build_entry(&resolver, &module)))
            .unwrap_or_else(|payload| {
                Err(PersistenceError::UnexpectedResolutionFailure {
                    module: id,
                    cause: panic_message(&*payload),
                })
            });

        let entry = match outcome {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(
                    module_id = %id,
                    "❌ While parsing module {} for persistence units we encountered an unexpected error: {}. \
                     The module (and every persistence unit it declares) is ignored.",
                    module.name(),
                    e
                );
                TrackingEntry::Ignored
            }
        };

        self.complete(id, entry);
    }

    pub fn module_removed(&self, module: &dyn Module) {
        match self.entries.remove(&module.id()) {
            Some((id, TrackingEntry::Tracked(persistent))) => {
                tracing::info!(module_id = %id, "Module {} left, releasing its persistence units", module.name());
                persistent.destroy();
            }
            Some((id, TrackingEntry::Resolving)) => {
                tracing::debug!(module_id = %id, "Module {} left while being resolved", module.name());
            }
            Some((_, TrackingEntry::Ignored)) | None => {}
        }
    }

    pub fn state(&self, id: ModuleId) -> TrackingState {
        self.entries
            .get(&id)
            .map(|entry| entry.state())
            .unwrap_or(TrackingState::Unobserved)
    }

    pub fn persistent_module(&self, id: ModuleId) -> Option<Arc<PersistentModule>> {
        self.entries.get(&id).and_then(|entry| match &*entry {
            TrackingEntry::Tracked(persistent) => Some(Arc::clone(persistent)),
            _ => None,
        })
    }

    /// Tracked modules ordered by id.
    pub fn tracked_modules(&self) -> Vec<Arc<PersistentModule>> {
        let mut tracked: Vec<Arc<PersistentModule>> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.value() {
                TrackingEntry::Tracked(persistent) => Some(Arc::clone(persistent)),
                _ => None,
            })
            .collect();
        tracked.sort_by_key(|persistent| persistent.id());
        tracked
    }

    /// Tears down every tracked module, as if each had been removed.
    pub fn destroy_all(&self) {
        let ids: Vec<ModuleId> = self
            .entries
            .iter()
            .filter(|entry| matches!(entry.value(), TrackingEntry::Tracked(_)))
            .map(|entry| *entry.key())
            .collect();

        for id in ids {
            if let Some((_, TrackingEntry::Tracked(persistent))) = self.entries.remove(&id) {
                persistent.destroy();
            }
        }
    }

    fn build_entry(&self, resolver: &Resolver, module: &Arc<dyn Module>) -> Result<TrackingEntry> {
        match resolver.resolve(module.as_ref()) {
            Resolution::NotPersistent => {
                tracing::debug!(module_id = %module.id(), "Module {} declares no persistence unit", module.name());
                Ok(TrackingEntry::Ignored)
            }
            Resolution::Empty { declared, skipped } => {
                tracing::warn!(
                    module_id = %module.id(),
                    "⚠️ No persistence unit found in module {}, despite a {} header ({}); {} location(s) skipped",
                    module.name(),
                    self.config.discovery.header,
                    declared,
                    skipped.len()
                );
                Ok(TrackingEntry::Ignored)
            }
            Resolution::Units { units, skipped, .. } => {
                let persistent = Arc::new(PersistentModule::new(
                    Arc::clone(module),
                    units,
                    Arc::clone(&self.factory),
                )?);
                let instances = persistent.realize();
                tracing::info!(
                    module_id = %module.id(),
                    "✅ Tracking module {}: {} persistence unit(s), {} instance(s), {} location(s) skipped",
                    module.name(),
                    persistent.units().len(),
                    instances,
                    skipped.len()
                );
                Ok(TrackingEntry::Tracked(persistent))
            }
        }
    }

    /// Drops an entry whose module left while the tracker was closed.
    fn release_stale(&self, id: ModuleId, persistent: &Arc<PersistentModule>) {
        let removed = self.entries.remove_if(&id, |_, entry| {
            matches!(entry, TrackingEntry::Tracked(current) if Arc::ptr_eq(current, persistent))
        });
        if removed.is_some() {
            tracing::info!(module_id = %id, "Module left while the tracker was closed, releasing it");
            persistent.destroy();
        }
    }

    fn complete(&self, id: ModuleId, entry: TrackingEntry) {
        let orphan = match self.entries.get_mut(&id) {
            Some(mut current) if matches!(*current, TrackingEntry::Resolving) => {
                *current = entry;
                None
            }
            _ => Some(entry),
        };

        // 解析期間模組已被移除
        if let Some(TrackingEntry::Tracked(persistent)) = orphan {
            tracing::info!(module_id = %id, "Module left before tracking completed, releasing it");
            persistent.destroy();
        }
    }

    fn resolver(&self) -> Result<Arc<Resolver>> {
        self.read_session()
            .as_ref()
            .map(|session| Arc::clone(&session.resolver))
            .ok_or(PersistenceError::TrackerClosed)
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ModuleListener for PersistenceTracker {
    fn module_changed(&self, event: &ModuleEvent) {
        match event.kind {
            ModuleEventKind::Added => self.module_added(Arc::clone(&event.module)),
            ModuleEventKind::Removed => self.module_removed(event.module.as_ref()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryModule;
    use crate::adapters::registry::ModuleRegistry;
    use crate::domain::model::PersistenceUnit;
    use crate::domain::ports::ComponentInstance;

    struct NoopFactory;

    struct NoopInstance(String);

    impl ComponentInstance for NoopInstance {
        fn unit_name(&self) -> &str {
            &self.0
        }

        fn dispose(self: Box<Self>) {}
    }

    impl ComponentFactory for NoopFactory {
        fn create_instance(
            &self,
            _module: &dyn Module,
            unit: &PersistenceUnit,
        ) -> Result<Box<dyn ComponentInstance>> {
            Ok(Box::new(NoopInstance(unit.name.clone())))
        }
    }

    const UNIT: &str = r#"<persistence><persistence-unit name="PU"/></persistence>"#;

    fn tracker() -> Arc<PersistenceTracker> {
        Arc::new(PersistenceTracker::new(
            ExtenderConfig::default(),
            Arc::new(NoopFactory),
        ))
    }

    #[test]
    fn test_closed_tracker_ignores_modules() {
        let tracker = tracker();
        let module: Arc<dyn Module> =
            Arc::new(MemoryModule::new(4, "early").with_resource("META-INF/persistence.xml", UNIT));

        tracker.module_added(module);

        assert_eq!(tracker.state(ModuleId(4)), TrackingState::Unobserved);
        assert!(matches!(tracker.resolver(), Err(PersistenceError::TrackerClosed)));
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let tracker = tracker();
        let registry = Arc::new(ModuleRegistry::new());

        tracker.open(registry.clone()).unwrap();
        let err = tracker.open(registry.clone()).unwrap_err();

        assert!(matches!(err, PersistenceError::TrackerAlreadyOpen));
        tracker.close();
        assert!(!tracker.is_open());
        assert_eq!(registry.listener_count(), 0);
    }

    #[test]
    fn test_invalid_config_prevents_open() {
        let mut config = ExtenderConfig::default();
        config.descriptor.target_namespace = String::new();
        let tracker = Arc::new(PersistenceTracker::new(config, Arc::new(NoopFactory)));

        assert!(tracker.open(Arc::new(ModuleRegistry::new())).is_err());
        assert!(!tracker.is_open());
    }

    #[test]
    fn test_module_is_resolved_once() {
        let tracker = tracker();
        let registry = Arc::new(ModuleRegistry::new());
        tracker.open(registry.clone()).unwrap();

        let module: Arc<dyn Module> =
            Arc::new(MemoryModule::new(4, "orders").with_resource("META-INF/persistence.xml", UNIT));
        tracker.module_added(Arc::clone(&module));
        let first = tracker.persistent_module(ModuleId(4)).unwrap();
        tracker.module_added(module);
        let second = tracker.persistent_module(ModuleId(4)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_removal_during_resolution_destroys_result() {
        let tracker = tracker();
        let registry = Arc::new(ModuleRegistry::new());
        tracker.open(registry).unwrap();

        let module: Arc<dyn Module> =
            Arc::new(MemoryModule::new(9, "racy").with_resource("META-INF/persistence.xml", UNIT));
        tracker.entries.insert(ModuleId(9), TrackingEntry::Resolving);
        let resolver = tracker.resolver().unwrap();
        let entry = tracker.build_entry(&resolver, &module).unwrap();
        let persistent = match &entry {
            TrackingEntry::Tracked(persistent) => Arc::clone(persistent),
            _ => panic!("module should resolve"),
        };

        tracker.module_removed(module.as_ref());
        tracker.complete(ModuleId(9), entry);

        assert!(persistent.is_destroyed());
        assert_eq!(tracker.state(ModuleId(9)), TrackingState::Unobserved);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
