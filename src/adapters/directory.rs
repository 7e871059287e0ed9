use crate::domain::model::ModuleId;
use crate::domain::ports::{Module, Resource};
use crate::utils::error::{PersistenceError, Result};
use crate::utils::validation;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "module.toml";

#[derive(Debug, Clone, Deserialize)]
struct ModuleManifest {
    id: u64,
    name: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// A module unpacked on disk, described by a `module.toml` manifest:
///
/// ```toml
/// id = 12
/// name = "org.example.orders"
///
/// [headers]
/// Meta-Persistence = "META-INF/orders.xml, META-INF/audit.xml"
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryModule {
    id: ModuleId,
    name: String,
    headers: BTreeMap<String, String>,
    root: PathBuf,
}

impl DirectoryModule {
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path)?;

        let manifest: ModuleManifest =
            toml::from_str(&content).map_err(|e| PersistenceError::ConfigValidationError {
                field: manifest_path.display().to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;

        if manifest.name.trim().is_empty() {
            return Err(PersistenceError::InvalidConfigValueError {
                field: format!("{}: name", manifest_path.display()),
                value: manifest.name,
                reason: "Module name cannot be empty".to_string(),
            });
        }

        Ok(Self {
            id: ModuleId(manifest.id),
            name: manifest.name,
            headers: manifest.headers,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Module for DirectoryModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn header(&self, key: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }

    fn resource(&self, path: &str) -> Option<Resource> {
        let path = path.trim_start_matches('/');
        if validation::validate_resource_path("resource", path).is_err() {
            tracing::warn!(module_id = %self.id, "Rejected resource path '{}'", path);
            return None;
        }

        let full_path = self.root.join(path);
        full_path.is_file().then(|| Resource::from_file(full_path))
    }
}

/// Loads every sub-directory of `parent` that holds a manifest, ordered by module id.
pub fn discover_modules<P: AsRef<Path>>(parent: P) -> Result<Vec<DirectoryModule>> {
    let mut modules = Vec::new();

    for entry in fs::read_dir(parent.as_ref())? {
        let path = entry?.path();
        if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
            modules.push(DirectoryModule::load(&path)?);
        } else {
            tracing::debug!("Skipping {} (no {})", path.display(), MANIFEST_FILE);
        }
    }

    modules.sort_by_key(|module| module.id);

    let mut seen = HashSet::new();
    for module in &modules {
        if !seen.insert(module.id) {
            return Err(PersistenceError::InvalidConfigValueError {
                field: "id".to_string(),
                value: module.id.to_string(),
                reason: format!("Duplicate module id (at {})", module.root.display()),
            });
        }
    }

    Ok(modules)
}
