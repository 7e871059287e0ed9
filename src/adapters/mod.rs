// Adapters layer: concrete modules, an in-process module host and a logging component factory.

pub mod directory;
pub mod factory;
pub mod memory;
pub mod registry;
