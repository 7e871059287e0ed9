pub mod namespace_filter;
pub mod persistent_module;
pub mod resolver;
pub mod tracker;
pub mod unmarshal;
pub mod xml_events;

pub use crate::domain::model::{Persistence, PersistenceUnit};
pub use crate::domain::ports::{ComponentFactory, Module, ModuleSource};
pub use crate::utils::error::Result;
