pub mod toml_config;

pub use toml_config::{DescriptorConfig, DiscoveryConfig, ExtenderConfig, LogFormat, LoggingConfig};
