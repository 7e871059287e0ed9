use crate::core::namespace_filter::{NamespaceFilter, PERSISTENCE_NAMESPACE};
use crate::core::xml_events::{XmlAttribute, XmlEvent, XmlEventReader};
use crate::domain::model::{Persistence, PersistenceUnit, Property};
use crate::domain::ports::Resource;
use crate::utils::error::{PersistenceError, Result};
use std::io::BufRead;

const ROOT_ELEMENT: &str = "persistence";
const UNIT_ELEMENT: &str = "persistence-unit";
const PROPERTIES_ELEMENT: &str = "properties";
const PROPERTY_ELEMENT: &str = "property";

const LEAF_ELEMENTS: &[&str] = &[
    "description",
    "provider",
    "jta-data-source",
    "non-jta-data-source",
    "mapping-file",
    "jar-file",
    "class",
    "exclude-unlisted-classes",
    "shared-cache-mode",
    "validation-mode",
];

/// Immutable schema binding shared by every unmarshalling session.
///
/// Created once when the tracker opens; sessions borrow it and never mutate it,
/// so one context can serve concurrent resolutions.
#[derive(Debug, Clone)]
pub struct DescriptorContext {
    target_namespace: String,
}

impl DescriptorContext {
    pub fn new(target_namespace: impl Into<String>) -> Self {
        Self {
            target_namespace: target_namespace.into(),
        }
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// 每次呼叫都建立全新的 filter 與 builder
    pub fn create_unmarshaller(&self) -> Unmarshaller<'_> {
        Unmarshaller {
            filter: NamespaceFilter::new(self.target_namespace.as_str()),
            builder: DescriptorBuilder::new(&self.target_namespace),
        }
    }

    /// Opens `resource` and unmarshals it; the stream is dropped on every path.
    pub fn unmarshal_resource(&self, resource: &Resource) -> Result<Persistence> {
        let stream = resource.open().map_err(|e| {
            PersistenceError::parse(format!("cannot open {}: {}", resource.url(), e))
        })?;
        self.create_unmarshaller().unmarshal(stream)
    }
}

impl Default for DescriptorContext {
    fn default() -> Self {
        Self::new(PERSISTENCE_NAMESPACE)
    }
}

/// A single-use unmarshalling session.
pub struct Unmarshaller<'a> {
    filter: NamespaceFilter,
    builder: DescriptorBuilder<'a>,
}

impl Unmarshaller<'_> {
    pub fn unmarshal<R: BufRead>(mut self, source: R) -> Result<Persistence> {
        let filter = &self.filter;
        let events = XmlEventReader::new(source).map(|event| event.map(|e| filter.apply(e)));

        for event in events {
            self.builder.handle(event?)?;
        }

        self.builder.finish()
    }
}

/// Builds the [`Persistence`] graph from namespace-normalized events.
///
/// Elements outside the bound namespace, unknown elements, and missing
/// required attributes are mapping errors.
struct DescriptorBuilder<'a> {
    namespace: &'a str,
    path: Vec<String>,
    text: String,
    document: Option<Persistence>,
    unit: Option<PersistenceUnit>,
    closed: bool,
}

impl<'a> DescriptorBuilder<'a> {
    fn new(namespace: &'a str) -> Self {
        Self {
            namespace,
            path: Vec::new(),
            text: String::new(),
            document: None,
            unit: None,
            closed: false,
        }
    }

    fn handle(&mut self, event: XmlEvent) -> Result<()> {
        match event {
            XmlEvent::StartElement {
                namespace,
                local_name,
                attributes,
                ..
            } => {
                if namespace.as_deref() != Some(self.namespace) {
                    return Err(schema_error(format!(
                        "element <{}> is not in namespace {}",
                        local_name, self.namespace
                    )));
                }
                self.start(&local_name, &attributes)?;
                self.path.push(local_name);
                Ok(())
            }
            XmlEvent::EndElement { local_name, .. } => {
                self.path.pop();
                self.end(&local_name)
            }
            XmlEvent::Characters(text) => {
                if self.in_leaf() {
                    self.text.push_str(&text);
                    Ok(())
                } else if text.trim().is_empty() {
                    Ok(())
                } else {
                    Err(schema_error(format!(
                        "unexpected text '{}' inside <{}>",
                        text.trim(),
                        self.path.last().map(String::as_str).unwrap_or("document")
                    )))
                }
            }
        }
    }

    fn in_leaf(&self) -> bool {
        self.path.len() == 3 && LEAF_ELEMENTS.contains(&self.path[2].as_str())
    }

    fn start(&mut self, local: &str, attributes: &[XmlAttribute]) -> Result<()> {
        let parent = self.path.last().map(String::as_str);

        match (self.path.len(), local) {
            (0, _) if self.document.is_some() => {
                return Err(schema_error(format!(
                    "multiple root elements, found <{}> after <{}>",
                    local, ROOT_ELEMENT
                )));
            }
            (0, ROOT_ELEMENT) => {
                self.document = Some(Persistence {
                    version: attribute(attributes, "version").map(str::to_string),
                    persistence_units: Vec::new(),
                });
            }
            (1, UNIT_ELEMENT) => {
                let name = required_attribute(attributes, UNIT_ELEMENT, "name")?;
                let mut unit = PersistenceUnit::new(name);
                if let Some(value) = attribute(attributes, "transaction-type") {
                    unit.transaction_type = Some(value.trim().parse().map_err(schema_error)?);
                }
                self.unit = Some(unit);
            }
            (2, PROPERTIES_ELEMENT) => {
                self.current_unit()?.properties_mut();
            }
            (2, leaf) if LEAF_ELEMENTS.contains(&leaf) => {
                self.text.clear();
            }
            (3, PROPERTY_ELEMENT) if parent == Some(PROPERTIES_ELEMENT) => {
                let name = required_attribute(attributes, PROPERTY_ELEMENT, "name")?;
                let value = required_attribute(attributes, PROPERTY_ELEMENT, "value")?;
                self.current_unit()?
                    .properties_mut()
                    .property
                    .push(Property::new(name, value));
            }
            _ => {
                return Err(schema_error(format!(
                    "unexpected element <{}> inside <{}>",
                    local,
                    parent.unwrap_or("document")
                )));
            }
        }

        Ok(())
    }

    fn end(&mut self, local: &str) -> Result<()> {
        match (self.path.len(), local) {
            (2, leaf) if LEAF_ELEMENTS.contains(&leaf) => self.assign_leaf(leaf),
            (1, UNIT_ELEMENT) => {
                let unit = self
                    .unit
                    .take()
                    .ok_or_else(|| schema_error("</persistence-unit> without a unit"))?;
                if let Some(document) = self.document.as_mut() {
                    document.persistence_units.push(unit);
                }
                Ok(())
            }
            (0, ROOT_ELEMENT) => {
                self.closed = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn assign_leaf(&mut self, leaf: &str) -> Result<()> {
        let value = std::mem::take(&mut self.text).trim().to_string();
        let unit = self.current_unit()?;

        match leaf {
            "description" => set_once(&mut unit.description, leaf, value),
            "provider" => set_once(&mut unit.provider, leaf, value),
            "jta-data-source" => set_once(&mut unit.jta_data_source, leaf, value),
            "non-jta-data-source" => set_once(&mut unit.non_jta_data_source, leaf, value),
            "mapping-file" => {
                unit.mapping_files.push(value);
                Ok(())
            }
            "jar-file" => {
                unit.jar_files.push(value);
                Ok(())
            }
            "class" => {
                unit.classes.push(value);
                Ok(())
            }
            "exclude-unlisted-classes" => {
                set_once(&mut unit.exclude_unlisted_classes, leaf, parse_bool(&value)?)
            }
            "shared-cache-mode" => {
                let mode = value.parse().map_err(schema_error)?;
                set_once(&mut unit.shared_cache_mode, leaf, mode)
            }
            "validation-mode" => {
                let mode = value.parse().map_err(schema_error)?;
                set_once(&mut unit.validation_mode, leaf, mode)
            }
            _ => Ok(()),
        }
    }

    fn current_unit(&mut self) -> Result<&mut PersistenceUnit> {
        self.unit
            .as_mut()
            .ok_or_else(|| schema_error("no enclosing <persistence-unit>"))
    }

    fn finish(mut self) -> Result<Persistence> {
        if !self.closed {
            return Err(schema_error("document has no complete <persistence> root"));
        }
        self.document
            .take()
            .ok_or_else(|| schema_error("document has no <persistence> root"))
    }
}

fn attribute<'a>(attributes: &'a [XmlAttribute], qname: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.qname == qname)
        .map(|a| a.value.as_str())
}

fn required_attribute(attributes: &[XmlAttribute], element: &str, qname: &str) -> Result<String> {
    attribute(attributes, qname)
        .map(str::to_string)
        .ok_or_else(|| schema_error(format!("<{}> is missing attribute '{}'", element, qname)))
}

// 單值元素只能出現一次
fn set_once<T>(slot: &mut Option<T>, leaf: &str, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(schema_error(format!("<{}> may appear only once", leaf)));
    }
    *slot = Some(value);
    Ok(())
}

// xsd:boolean；空元素代表 true
fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "" | "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(schema_error(format!("'{}' is not a boolean", other))),
    }
}

fn schema_error(message: impl Into<String>) -> PersistenceError {
    PersistenceError::parse(format!("schema mismatch: {}", message.into()))
}
