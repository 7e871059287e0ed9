use crate::core::xml_events::XmlEvent;

/// Namespace of the persistence 2.1 schema, the model the builder is bound to.
pub const PERSISTENCE_NAMESPACE: &str = "http://xmlns.jcp.org/xml/ns/persistence";

/// Namespace used by the 1.0 and 2.0 persistence schemas.
pub const LEGACY_PERSISTENCE_NAMESPACE: &str = "http://java.sun.com/xml/ns/persistence";

/// Moves every element into one target namespace.
///
/// Only start and end element events change, and only their namespace: local
/// name, qualified name and attributes are kept. Older descriptors, or ones
/// without any namespace, then look like 2.1 documents to the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceFilter {
    target: String,
}

impl NamespaceFilter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn apply(&self, event: XmlEvent) -> XmlEvent {
        match event {
            XmlEvent::StartElement {
                local_name,
                qname,
                attributes,
                ..
            } => XmlEvent::StartElement {
                namespace: Some(self.target.clone()),
                local_name,
                qname,
                attributes,
            },
            XmlEvent::EndElement {
                local_name, qname, ..
            } => XmlEvent::EndElement {
                namespace: Some(self.target.clone()),
                local_name,
                qname,
            },
            other => other,
        }
    }
}

impl Default for NamespaceFilter {
    fn default() -> Self {
        Self::new(PERSISTENCE_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::xml_events::XmlAttribute;

    #[test]
    fn test_rewrites_start_element_namespace_only() {
        let filter = NamespaceFilter::default();
        let event = XmlEvent::StartElement {
            namespace: Some(LEGACY_PERSISTENCE_NAMESPACE.to_string()),
            local_name: "persistence-unit".to_string(),
            qname: "p:persistence-unit".to_string(),
            attributes: vec![XmlAttribute {
                qname: "name".to_string(),
                value: "orders".to_string(),
            }],
        };

        let rewritten = filter.apply(event);

        assert_eq!(
            rewritten,
            XmlEvent::StartElement {
                namespace: Some(PERSISTENCE_NAMESPACE.to_string()),
                local_name: "persistence-unit".to_string(),
                qname: "p:persistence-unit".to_string(),
                attributes: vec![XmlAttribute {
                    qname: "name".to_string(),
                    value: "orders".to_string(),
                }],
            }
        );
    }

    #[test]
    fn test_rewrites_unqualified_end_element() {
        let filter = NamespaceFilter::new("urn:target");
        let rewritten = filter.apply(XmlEvent::end(None, "persistence"));
        assert_eq!(rewritten, XmlEvent::end(Some("urn:target"), "persistence"));
    }

    #[test]
    fn test_characters_pass_through() {
        let filter = NamespaceFilter::default();
        let text = XmlEvent::Characters("org.example.Order".to_string());
        assert_eq!(filter.apply(text.clone()), text);
    }

    #[test]
    fn test_canonical_namespace_is_left_as_is() {
        let filter = NamespaceFilter::default();
        let event = XmlEvent::start(Some(PERSISTENCE_NAMESPACE), "persistence");
        assert_eq!(filter.apply(event.clone()), event);
    }
}
