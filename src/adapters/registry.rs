use crate::domain::model::ModuleId;
use crate::domain::ports::{Module, ModuleEvent, ModuleListener, ModuleSource, SubscriptionId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// An in-process module host.
///
/// Events are delivered synchronously on the calling thread, in call order.
/// Listeners are called without any registry lock held.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<ModuleId, Arc<dyn Module>>,
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn ModuleListener>)>>,
    next_subscription: AtomicU64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `module` and notifies listeners. A module with the same id is replaced
    /// (removed first).
    pub fn install(&self, module: Arc<dyn Module>) {
        if let Some(previous) = self.modules.insert(module.id(), Arc::clone(&module)) {
            self.notify(&ModuleEvent::removed(previous));
        }
        tracing::debug!(module_id = %module.id(), "Installed module {}", module.name());
        self.notify(&ModuleEvent::added(module));
    }

    pub fn uninstall(&self, id: ModuleId) -> Option<Arc<dyn Module>> {
        let (_, module) = self.modules.remove(&id)?;
        tracing::debug!(module_id = %id, "Uninstalled module {}", module.name());
        self.notify(&ModuleEvent::removed(Arc::clone(&module)));
        Some(module)
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.modules.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn notify(&self, event: &ModuleEvent) {
        let listeners: Vec<Arc<dyn ModuleListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener.module_changed(event);
        }
    }
}

impl ModuleSource for ModuleRegistry {
    fn active_modules(&self) -> Vec<Arc<dyn Module>> {
        let mut modules: Vec<Arc<dyn Module>> = self
            .modules
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        modules.sort_by_key(|module| module.id());
        modules
    }

    fn subscribe(&self, listener: Arc<dyn ModuleListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(subscription, _)| *subscription != id);
        listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryModule;
    use crate::domain::ports::ModuleEventKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(ModuleEventKind, ModuleId)>>,
    }

    impl ModuleListener for Recorder {
        fn module_changed(&self, event: &ModuleEvent) {
            self.events
                .lock()
                .unwrap()
                .push((event.kind, event.module.id()));
        }
    }

    #[test]
    fn test_events_are_delivered_in_order() {
        let registry = ModuleRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());

        registry.install(Arc::new(MemoryModule::new(1, "a")));
        registry.install(Arc::new(MemoryModule::new(2, "b")));
        registry.uninstall(ModuleId(1));
        assert!(registry.uninstall(ModuleId(1)).is_none());

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (ModuleEventKind::Added, ModuleId(1)),
                (ModuleEventKind::Added, ModuleId(2)),
                (ModuleEventKind::Removed, ModuleId(1)),
            ]
        );
        assert_eq!(registry.module_ids(), vec![ModuleId(2)]);
    }

    #[test]
    fn test_reinstall_replaces_module() {
        let registry = ModuleRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());

        registry.install(Arc::new(MemoryModule::new(1, "a")));
        registry.install(Arc::new(MemoryModule::new(1, "a2")));

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], (ModuleEventKind::Removed, ModuleId(1)));
        assert_eq!(registry.active_modules()[0].name(), "a2");
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = ModuleRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let subscription = registry.subscribe(recorder.clone());

        assert!(registry.unsubscribe(subscription));
        assert!(!registry.unsubscribe(subscription));
        registry.install(Arc::new(MemoryModule::new(1, "a")));

        assert!(recorder.events.lock().unwrap().is_empty());
        assert_eq!(registry.listener_count(), 0);
    }
}
