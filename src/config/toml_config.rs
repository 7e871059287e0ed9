use crate::core::namespace_filter::PERSISTENCE_NAMESPACE;
use crate::domain::model::ModuleId;
use crate::utils::error::{PersistenceError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const META_PERSISTENCE_HEADER: &str = "Meta-Persistence";
pub const DEFAULT_DESCRIPTOR_LOCATION: &str = "META-INF/persistence.xml";
pub const LOCATION_PROPERTY: &str = "location";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderConfig {
    pub discovery: DiscoveryConfig,
    pub descriptor: DescriptorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 宣告描述檔位置的 header
    pub header: String,
    /// 沒有 header 時檢查的預設位置
    pub default_location: String,
    /// 不套用預設位置的系統模組
    pub system_module_id: u64,
    /// 記錄來源位置的 property 名稱
    pub location_property: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            header: META_PERSISTENCE_HEADER.to_string(),
            default_location: DEFAULT_DESCRIPTOR_LOCATION.to_string(),
            system_module_id: ModuleId::SYSTEM.0,
            location_property: LOCATION_PROPERTY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    pub target_namespace: String,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            target_namespace: PERSISTENCE_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl ExtenderConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PersistenceError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| PersistenceError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PERSISTENCE_HEADER})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PersistenceError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_token("discovery.header", &self.discovery.header)?;
        validation::validate_resource_path(
            "discovery.default_location",
            &self.discovery.default_location,
        )?;
        validation::validate_token(
            "discovery.location_property",
            &self.discovery.location_property,
        )?;
        validation::validate_namespace_uri(
            "descriptor.target_namespace",
            &self.descriptor.target_namespace,
        )?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(PersistenceError::InvalidConfigValueError {
                field: "logging.level".to_string(),
                value: self.logging.level.clone(),
                reason: format!("Valid levels: {}", valid_levels.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for ExtenderConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_conventions() {
        let config = ExtenderConfig::from_toml_str("").unwrap();

        assert_eq!(config.discovery.header, "Meta-Persistence");
        assert_eq!(config.discovery.default_location, "META-INF/persistence.xml");
        assert_eq!(config.discovery.system_module_id, 0);
        assert_eq!(config.discovery.location_property, "location");
        assert_eq!(
            config.descriptor.target_namespace,
            "http://xmlns.jcp.org/xml/ns/persistence"
        );
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
[discovery]
default_location = "META-INF/jpa/persistence.xml"

[logging]
level = "debug"
format = "json"
"#;

        let config = ExtenderConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.discovery.header, "Meta-Persistence");
        assert_eq!(config.discovery.default_location, "META-INF/jpa/persistence.xml");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PB_TEST_TARGET_NAMESPACE", "urn:example:persistence");

        let toml_content = r#"
[descriptor]
target_namespace = "${PB_TEST_TARGET_NAMESPACE}"
"#;

        let config = ExtenderConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.descriptor.target_namespace, "urn:example:persistence");

        std::env::remove_var("PB_TEST_TARGET_NAMESPACE");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[discovery]
header = "Meta Persistence"
"#;
        let config = ExtenderConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());

        let toml_content = r#"
[discovery]
default_location = "../persistence.xml"
"#;
        let config = ExtenderConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());

        let toml_content = r#"
[logging]
level = "loud"
"#;
        let config = ExtenderConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = ExtenderConfig::from_toml_str("[discovery\nheader = 1").unwrap_err();
        assert!(matches!(err, PersistenceError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[discovery]\nheader = \"X-Persistence\"\n")
            .unwrap();

        let config = ExtenderConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.discovery.header, "X-Persistence");
    }
}
