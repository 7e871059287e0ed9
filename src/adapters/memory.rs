use crate::domain::model::ModuleId;
use crate::domain::ports::{Module, Resource};
use std::collections::HashMap;
use std::sync::Arc;

/// A module whose headers and resources live in memory.
#[derive(Debug, Clone)]
pub struct MemoryModule {
    id: ModuleId,
    name: String,
    headers: Vec<(String, String)>,
    resources: HashMap<String, Arc<[u8]>>,
}

impl MemoryModule {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: ModuleId(id),
            name: name.into(),
            headers: Vec::new(),
            resources: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_resource(mut self, path: impl Into<String>, data: impl AsRef<[u8]>) -> Self {
        self.resources.insert(path.into(), Arc::from(data.as_ref()));
        self
    }
}

impl Module for MemoryModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    // header 名稱不分大小寫
    fn header(&self, key: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }

    fn resource(&self, path: &str) -> Option<Resource> {
        let path = path.trim_start_matches('/');
        self.resources.get(path).map(|data| {
            Resource::from_bytes(format!("memory://{}/{}", self.id, path), Arc::clone(data))
        })
    }
}
