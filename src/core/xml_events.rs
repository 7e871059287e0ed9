use crate::utils::error::{PersistenceError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub qname: String,
    pub value: String,
}

/// Namespace-resolved document events, in document order.
///
/// Comments, processing instructions, the XML declaration and the doctype are
/// not surfaced. Empty elements arrive as a start/end pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartElement {
        namespace: Option<String>,
        local_name: String,
        qname: String,
        attributes: Vec<XmlAttribute>,
    },
    EndElement {
        namespace: Option<String>,
        local_name: String,
        qname: String,
    },
    Characters(String),
}

impl XmlEvent {
    pub fn start(namespace: Option<&str>, qname: &str) -> Self {
        XmlEvent::StartElement {
            namespace: namespace.map(str::to_string),
            local_name: local_part(qname).to_string(),
            qname: qname.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn end(namespace: Option<&str>, qname: &str) -> Self {
        XmlEvent::EndElement {
            namespace: namespace.map(str::to_string),
            local_name: local_part(qname).to_string(),
            qname: qname.to_string(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            XmlEvent::StartElement { namespace, .. } | XmlEvent::EndElement { namespace, .. } => {
                namespace.as_deref()
            }
            XmlEvent::Characters(_) => None,
        }
    }
}

fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

enum Step {
    Start(XmlEvent),
    End(XmlEvent),
    Empty(XmlEvent, XmlEvent),
    Text(String),
    Skip,
    Eof,
}

/// Non-validating pull reader that yields [`XmlEvent`]s until the end of input.
///
/// Stops after the first error; an element still open at end of input is
/// reported as malformed.
pub struct XmlEventReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    depth: usize,
    pending_end: Option<XmlEvent>,
    finished: bool,
}

impl<R: BufRead> XmlEventReader<R> {
    pub fn new(source: R) -> Self {
        let mut reader = NsReader::from_reader(source);
        let config = reader.config_mut();
        config.trim_text(true);
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Self {
            reader,
            buf: Vec::new(),
            depth: 0,
            pending_end: None,
            finished: false,
        }
    }

    fn read_next(&mut self) -> Result<Option<XmlEvent>> {
        loop {
            if let Some(end) = self.pending_end.take() {
                return Ok(Some(end));
            }

            self.buf.clear();
            let step = match self.reader.read_resolved_event_into(&mut self.buf) {
                Ok((ns, event)) => convert(ns, event),
                Err(e) => Err(e.to_string()),
            };

            match step {
                Err(message) => {
                    return Err(PersistenceError::parse(format!(
                        "malformed XML near byte {}: {}",
                        self.reader.buffer_position(),
                        message
                    )));
                }
                Ok(Step::Skip) => continue,
                Ok(Step::Eof) => {
                    if self.depth > 0 {
                        return Err(PersistenceError::parse(format!(
                            "unexpected end of document, {} element(s) left open",
                            self.depth
                        )));
                    }
                    return Ok(None);
                }
                Ok(Step::Start(event)) => {
                    self.depth += 1;
                    return Ok(Some(event));
                }
                Ok(Step::End(event)) => {
                    self.depth = self.depth.saturating_sub(1);
                    return Ok(Some(event));
                }
                Ok(Step::Empty(start, end)) => {
                    self.pending_end = Some(end);
                    return Ok(Some(start));
                }
                Ok(Step::Text(text)) => return Ok(Some(XmlEvent::Characters(text))),
            }
        }
    }
}

impl<R: BufRead> Iterator for XmlEventReader<R> {
    type Item = Result<XmlEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn convert(ns: ResolveResult<'_>, event: Event<'_>) -> std::result::Result<Step, String> {
    match event {
        Event::Start(e) => Ok(Step::Start(start_element(ns, &e)?)),
        Event::Empty(e) => {
            let start = start_element(ns, &e)?;
            let end = XmlEvent::EndElement {
                namespace: start.namespace().map(str::to_string),
                local_name: utf8(e.local_name().as_ref())?,
                qname: utf8(e.name().as_ref())?,
            };
            Ok(Step::Empty(start, end))
        }
        Event::End(e) => Ok(Step::End(XmlEvent::EndElement {
            namespace: namespace_of(ns)?,
            local_name: utf8(e.local_name().as_ref())?,
            qname: utf8(e.name().as_ref())?,
        })),
        Event::Text(e) => {
            let text = e.unescape().map_err(|e| e.to_string())?;
            if text.is_empty() {
                Ok(Step::Skip)
            } else {
                Ok(Step::Text(text.into_owned()))
            }
        }
        Event::CData(e) => Ok(Step::Text(utf8(&e)?)),
        Event::Eof => Ok(Step::Eof),
        Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => Ok(Step::Skip),
    }
}

fn start_element(ns: ResolveResult<'_>, e: &BytesStart<'_>) -> std::result::Result<XmlEvent, String> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        attributes.push(XmlAttribute {
            qname: utf8(attr.key.as_ref())?,
            value: attr.unescape_value().map_err(|e| e.to_string())?.into_owned(),
        });
    }

    Ok(XmlEvent::StartElement {
        namespace: namespace_of(ns)?,
        local_name: utf8(e.local_name().as_ref())?,
        qname: utf8(e.name().as_ref())?,
        attributes,
    })
}

fn namespace_of(ns: ResolveResult<'_>) -> std::result::Result<Option<String>, String> {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => Ok(Some(utf8(uri)?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(format!(
            "undeclared namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        )),
    }
}

fn utf8(bytes: &[u8]) -> std::result::Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| format!("invalid UTF-8: {}", e))
}
