pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{
    directory::{discover_modules, DirectoryModule},
    factory::LoggingFactory,
    memory::MemoryModule,
    registry::ModuleRegistry,
};
pub use config::ExtenderConfig;
pub use crate::core::{
    namespace_filter::NamespaceFilter,
    persistent_module::PersistentModule,
    resolver::{Resolution, Resolver},
    tracker::{PersistenceTracker, TrackingState},
    unmarshal::DescriptorContext,
};
pub use domain::model::{ModuleId, Persistence, PersistenceUnit};
pub use utils::error::{PersistenceError, Result};
