use crate::domain::model::{ModuleId, PersistenceUnit};
use crate::utils::error::Result;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

/// A deployable unit managed by the host. The bridge only observes modules.
pub trait Module: Send + Sync {
    fn id(&self) -> ModuleId;

    fn name(&self) -> &str;

    fn header(&self, key: &str) -> Option<String>;

    fn resource(&self, path: &str) -> Option<Resource>;
}

impl fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name(), self.id())
    }
}

/// A resource found inside a module; nothing is opened until [`Resource::open`].
#[derive(Debug, Clone)]
pub struct Resource {
    url: String,
    backing: ResourceBacking,
}

#[derive(Debug, Clone)]
enum ResourceBacking {
    Memory(Arc<[u8]>),
    File(PathBuf),
}

impl Resource {
    pub fn from_bytes(url: impl Into<String>, data: Arc<[u8]>) -> Self {
        Self {
            url: url.into(),
            backing: ResourceBacking::Memory(data),
        }
    }

    pub fn from_file(path: PathBuf) -> Self {
        Self {
            url: format!("file://{}", path.display()),
            backing: ResourceBacking::File(path),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn open(&self) -> std::io::Result<Box<dyn BufRead + Send>> {
        match &self.backing {
            ResourceBacking::Memory(data) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            ResourceBacking::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEventKind {
    Added,
    Removed,
}

#[derive(Debug, Clone)]
pub struct ModuleEvent {
    pub kind: ModuleEventKind,
    pub module: Arc<dyn Module>,
}

impl ModuleEvent {
    pub fn added(module: Arc<dyn Module>) -> Self {
        Self {
            kind: ModuleEventKind::Added,
            module,
        }
    }

    pub fn removed(module: Arc<dyn Module>) -> Self {
        Self {
            kind: ModuleEventKind::Removed,
            module,
        }
    }
}

pub trait ModuleListener: Send + Sync {
    fn module_changed(&self, event: &ModuleEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// The host side: a stream of module add/remove notifications.
pub trait ModuleSource: Send + Sync {
    /// Modules that are currently starting or active.
    fn active_modules(&self) -> Vec<Arc<dyn Module>>;

    fn subscribe(&self, listener: Arc<dyn ModuleListener>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Turns resolved units into live persistence-unit instances.
pub trait ComponentFactory: Send + Sync {
    fn create_instance(
        &self,
        module: &dyn Module,
        unit: &PersistenceUnit,
    ) -> Result<Box<dyn ComponentInstance>>;
}

pub trait ComponentInstance: Send {
    fn unit_name(&self) -> &str;

    fn dispose(self: Box<Self>);
}
