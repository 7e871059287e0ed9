use crate::domain::model::ModuleId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Descriptor parse error: {message}")]
    DescriptorParseError { message: String },

    #[error("Module {module} declares location '{location}' but no such resource exists")]
    LocationUnresolvable { module: ModuleId, location: String },

    #[error("Unexpected failure while resolving module {module}: {cause}")]
    UnexpectedResolutionFailure { module: ModuleId, cause: String },

    #[error("Module {module} has no persistence unit")]
    EmptyUnitSet { module: ModuleId },

    #[error("Component factory failed for unit '{unit}': {message}")]
    FactoryError { unit: String, message: String },

    #[error("Tracker is already open")]
    TrackerAlreadyOpen,

    #[error("Tracker is closed")]
    TrackerClosed,

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

impl PersistenceError {
    pub fn parse(message: impl Into<String>) -> Self {
        PersistenceError::DescriptorParseError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
