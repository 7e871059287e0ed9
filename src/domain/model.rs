use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host 指派的模組識別碼；0 保留給系統模組
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl ModuleId {
    pub const SYSTEM: ModuleId = ModuleId(0);
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root of a parsed `persistence.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Persistence {
    pub version: Option<String>,
    pub persistence_units: Vec<PersistenceUnit>,
}

/// One `<persistence-unit>` entry.
///
/// Equality and hashing cover every field, so two units only collapse inside a
/// `HashSet` when their whole declaration matches, stamped `location` included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistenceUnit {
    pub name: String,
    pub transaction_type: Option<TransactionType>,
    pub description: Option<String>,
    pub provider: Option<String>,
    pub jta_data_source: Option<String>,
    pub non_jta_data_source: Option<String>,
    pub mapping_files: Vec<String>,
    pub jar_files: Vec<String>,
    pub classes: Vec<String>,
    pub exclude_unlisted_classes: Option<bool>,
    pub shared_cache_mode: Option<SharedCacheMode>,
    pub validation_mode: Option<ValidationMode>,
    pub properties: Option<Properties>,
}

impl PersistenceUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties_mut().property.push(Property::new(name, value));
        self
    }

    /// 取得 properties，不存在時建立空集合
    pub fn properties_mut(&mut self) -> &mut Properties {
        self.properties.get_or_insert_with(Properties::default)
    }

    /// Last value declared for `name`, so a stamped location wins over an earlier one.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .as_ref()?
            .property
            .iter()
            .rev()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Appends the provenance property. Existing properties are kept as-is.
    pub fn stamp_location(&mut self, property_name: &str, location: &str) {
        self.properties_mut()
            .property
            .push(Property::new(property_name, location));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Properties {
    pub property: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Jta,
    ResourceLocal,
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JTA" => Ok(TransactionType::Jta),
            "RESOURCE_LOCAL" => Ok(TransactionType::ResourceLocal),
            other => Err(format!("unknown transaction-type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SharedCacheMode {
    All,
    None,
    EnableSelective,
    DisableSelective,
    Unspecified,
}

impl FromStr for SharedCacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(SharedCacheMode::All),
            "NONE" => Ok(SharedCacheMode::None),
            "ENABLE_SELECTIVE" => Ok(SharedCacheMode::EnableSelective),
            "DISABLE_SELECTIVE" => Ok(SharedCacheMode::DisableSelective),
            "UNSPECIFIED" => Ok(SharedCacheMode::Unspecified),
            other => Err(format!("unknown shared-cache-mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    Auto,
    Callback,
    None,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTO" => Ok(ValidationMode::Auto),
            "CALLBACK" => Ok(ValidationMode::Callback),
            "NONE" => Ok(ValidationMode::None),
            other => Err(format!("unknown validation-mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_stamp_location_creates_properties() {
        let mut unit = PersistenceUnit::new("orders");
        assert!(unit.properties.is_none());

        unit.stamp_location("location", "META-INF/persistence.xml");

        assert_eq!(unit.property("location"), Some("META-INF/persistence.xml"));
        assert_eq!(unit.properties.as_ref().unwrap().property.len(), 1);
    }

    #[test]
    fn test_stamp_location_appends_after_existing_properties() {
        let mut unit = PersistenceUnit::new("orders")
            .with_property("hibernate.show_sql", "true")
            .with_property("location", "declared-by-author");

        unit.stamp_location("location", "META-INF/a.xml");

        let values: Vec<&str> = unit
            .properties
            .as_ref()
            .unwrap()
            .property
            .iter()
            .map(|p| p.value.as_str())
            .collect();
        assert_eq!(values, vec!["true", "declared-by-author", "META-INF/a.xml"]);
        assert_eq!(unit.property("location"), Some("META-INF/a.xml"));
    }

    #[test]
    fn test_equality_includes_stamped_location() {
        let mut a = PersistenceUnit::new("orders").with_property("k", "v");
        let mut b = a.clone();
        assert_eq!(a, b);

        a.stamp_location("location", "META-INF/a.xml");
        b.stamp_location("location", "META-INF/b.xml");

        let set: HashSet<PersistenceUnit> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("JTA".parse::<TransactionType>(), Ok(TransactionType::Jta));
        assert_eq!(
            "ENABLE_SELECTIVE".parse::<SharedCacheMode>(),
            Ok(SharedCacheMode::EnableSelective)
        );
        assert_eq!("CALLBACK".parse::<ValidationMode>(), Ok(ValidationMode::Callback));
        assert!("jta".parse::<TransactionType>().is_err());
    }
}
