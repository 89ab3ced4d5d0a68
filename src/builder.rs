//! Schema Model Builder
//!
//! Consumes the event stream of a schema document and builds a validated
//! [`Protocol`]. Top-level keys are either section keywords or element
//! declarations:
//!
//! ```yaml
//! configuration:
//!   protocol_name: expr
//! protocol:
//!   eval:
//!     return: int
//!     default: returns 0
//! Lit:
//!   fields:
//!     value: int
//!   methods:
//!     eval: custom
//! ```
//!
//! `extends` is flattened eagerly while the declaring element is read, so the
//! finished model holds no element-to-element links.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::error::{Error, Mark, Result};
use crate::model::{
    is_integer_type, Element, Field, ImplDescriptor, ImplKind, KeywordError, Method, Protocol,
    FINALIZE_METHOD,
};
use crate::schema::{EventKind, EventSource};

/// Top-level section of a schema document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    Configuration,
    Definitions,
    Prologue,
    Protocol,
    Epilogue,
    Element,
}

impl Section {
    fn from_key(key: &str) -> Self {
        match key {
            "configuration" => Self::Configuration,
            "definitions" => Self::Definitions,
            "prologue" => Self::Prologue,
            "protocol" => Self::Protocol,
            "epilogue" => Self::Epilogue,
            _ => Self::Element,
        }
    }
}

/// Builds a [`Protocol`] from schema events
#[derive(Debug)]
pub struct ProtocolBuilder {
    padding_type: String,
    protocol_name: Option<String>,
    header_path: Option<String>,
    impl_path: Option<String>,
    prologue: String,
    definitions: String,
    epilogue: String,
    methods: Vec<Method>,
    elements: Vec<Element>,
    sections: HashSet<Section>,
}

impl Default for ProtocolBuilder {
    fn default() -> Self {
        Self::with_padding("long".to_string())
    }
}

impl ProtocolBuilder {
    /// Create a builder whose synthetic padding members have `padding_type`,
    /// which must be an integer type
    pub fn new(padding_type: impl Into<String>) -> Result<Self> {
        let padding_type = padding_type.into();
        if !is_integer_type(&padding_type) {
            return Err(Error::Usage(format!(
                "padding_type `{}` is not an integer type",
                padding_type
            )));
        }
        Ok(Self::with_padding(padding_type))
    }

    fn with_padding(padding_type: String) -> Self {
        Self {
            padding_type,
            protocol_name: None,
            header_path: None,
            impl_path: None,
            prologue: String::new(),
            definitions: String::new(),
            epilogue: String::new(),
            methods: Vec::new(),
            elements: Vec::new(),
            sections: HashSet::new(),
        }
    }

    /// Read a whole document and return the finished model
    pub fn build<S: EventSource>(mut self, source: &mut S) -> Result<Protocol> {
        source.expect(EventKind::StreamStart)?;
        source.expect(EventKind::MappingStart)?;

        while let Some((key, mark)) = next_key(source)? {
            self.read_section(source, key, mark)?;
        }

        let end = source.expect(EventKind::StreamEnd)?;
        self.finish(end.mark)
    }

    fn finish(self, mark: Mark) -> Result<Protocol> {
        let name = self.protocol_name.ok_or_else(|| Error::MissingProtocolName {
            mark,
            section: "end of document".to_string(),
        })?;
        if !self.sections.contains(&Section::Protocol) {
            return Err(Error::MissingSection {
                mark,
                name: "protocol".to_string(),
            });
        }

        debug!(
            protocol = %name,
            methods = self.methods.len(),
            elements = self.elements.len(),
            "schema model built"
        );

        Ok(Protocol {
            name,
            header_path: self.header_path,
            impl_path: self.impl_path,
            prologue: self.prologue,
            definitions: self.definitions,
            epilogue: self.epilogue,
            methods: self.methods,
            elements: self.elements,
        })
    }

    // =========================================================================
    // Sections
    // =========================================================================

    fn read_section<S: EventSource>(
        &mut self,
        source: &mut S,
        key: String,
        mark: Mark,
    ) -> Result<()> {
        if self.sections.contains(&Section::Epilogue) {
            return Err(Error::UnknownSection { mark, name: key });
        }

        let section = Section::from_key(&key);
        if section != Section::Element && !self.sections.insert(section) {
            return Err(Error::DuplicateSection { mark, name: key });
        }
        trace!(section = %key, line = mark.line, "reading section");

        match section {
            Section::Configuration => self.read_configuration(source),
            Section::Definitions => {
                self.definitions = source.expect_scalar()?.0;
                Ok(())
            }
            Section::Prologue => {
                self.prologue = source.expect_scalar()?.0;
                Ok(())
            }
            Section::Epilogue => {
                self.epilogue = source.expect_scalar()?.0;
                Ok(())
            }
            Section::Protocol => self.read_protocol(source, mark),
            Section::Element => self.read_element(source, key, mark),
        }
    }

    fn read_configuration<S: EventSource>(&mut self, source: &mut S) -> Result<()> {
        source.expect(EventKind::MappingStart)?;
        while let Some((key, mark)) = next_key(source)? {
            let value = source.expect_scalar()?.0;
            match key.as_str() {
                "protocol_name" => self.protocol_name = Some(value),
                "header" => self.header_path = Some(value),
                "output" => self.impl_path = Some(value),
                _ => return Err(Error::UnknownConfigOption { mark, name: key }),
            }
        }
        Ok(())
    }

    fn protocol_name(&self, mark: Mark, section: &str) -> Result<String> {
        self.protocol_name
            .clone()
            .ok_or_else(|| Error::MissingProtocolName {
                mark,
                section: section.to_string(),
            })
    }

    // =========================================================================
    // Protocol methods
    // =========================================================================

    fn read_protocol<S: EventSource>(&mut self, source: &mut S, mark: Mark) -> Result<()> {
        let protocol = self.protocol_name(mark, "protocol")?;

        if open_mapping(source)? {
            while let Some((name, mark)) = next_key(source)? {
                let method = read_method(source, &self.methods, &protocol, name, mark)?;
                self.methods.push(method);
            }
        }

        self.methods.push(Method {
            name: FINALIZE_METHOD.to_string(),
            return_type: "void".to_string(),
            parameters: Vec::new(),
            default_impl: ImplDescriptor::new(ImplKind::DoesNothing, protocol.as_str()),
            is_implicit: true,
        });
        Ok(())
    }

    // =========================================================================
    // Elements
    // =========================================================================

    fn read_element<S: EventSource>(
        &mut self,
        source: &mut S,
        name: String,
        mark: Mark,
    ) -> Result<()> {
        let protocol = self.protocol_name(mark, &format!("element {}", name))?;
        if !self.sections.contains(&Section::Protocol) {
            return Err(Error::ProtocolRequired {
                mark,
                element: name,
            });
        }
        if self.elements.iter().any(|e| e.name == name) {
            return Err(Error::DuplicateElement { mark, name });
        }
        if name == protocol {
            return Err(Error::ElementNamedAfterProtocol { mark, name });
        }

        let mut element = Element {
            implementations: self.methods.iter().map(|m| m.default_impl.clone()).collect(),
            members: Vec::new(),
            name,
        };

        if open_mapping(source)? {
            let mut first = true;
            while let Some((key, mark)) = next_key(source)? {
                match key.as_str() {
                    "extends" if first => self.read_extends(source, &mut element, &protocol)?,
                    "extends" => return Err(Error::ExtendsOutOfOrder { mark }),
                    "fields" => read_fields(source, &mut element)?,
                    "methods" => self.read_element_methods(source, &mut element)?,
                    _ => return Err(Error::UnknownElementSubsection { mark, name: key }),
                }
                first = false;
            }
        }

        element
            .members
            .insert(0, Field::padding(self.padding_type.as_str()));

        debug!(
            element = %element.name,
            members = element.members.len(),
            "element declared"
        );
        self.elements.push(element);
        Ok(())
    }

    fn read_extends<S: EventSource>(
        &self,
        source: &mut S,
        element: &mut Element,
        protocol: &str,
    ) -> Result<()> {
        source.expect(EventKind::SequenceStart)?;
        loop {
            let event = source.next_event()?;
            if event.kind == EventKind::SequenceEnd {
                return Ok(());
            }
            event.expect(EventKind::Scalar)?;
            self.extend(element, &event.value, event.mark, protocol)?;
        }
    }

    /// Flatten `ancestor` into `element`.
    ///
    /// Ancestor members are appended after those inherited from earlier
    /// `extends` entries. Only descriptors the ancestor moved away from the
    /// protocol default are copied, so a later ancestor overrides an earlier
    /// one only where it actually customized the method.
    fn extend(
        &self,
        element: &mut Element,
        ancestor: &str,
        mark: Mark,
        protocol: &str,
    ) -> Result<()> {
        if ancestor == element.name {
            return Err(Error::SelfExtension {
                mark,
                name: element.name.clone(),
            });
        }
        let parent = self
            .elements
            .iter()
            .find(|e| e.name == ancestor)
            .ok_or_else(|| Error::NoSuchElement {
                mark,
                name: ancestor.to_string(),
            })?;

        element.members.extend(parent.members.iter().cloned());

        for (own, inherited) in element
            .implementations
            .iter_mut()
            .zip(&parent.implementations)
        {
            if inherited.implementor != protocol {
                *own = inherited.clone();
            }
        }

        trace!(element = %element.name, ancestor, "extends flattened");
        Ok(())
    }

    fn read_element_methods<S: EventSource>(
        &self,
        source: &mut S,
        element: &mut Element,
    ) -> Result<()> {
        source.expect(EventKind::MappingStart)?;
        while let Some((name, mark)) = next_key(source)? {
            let index = self
                .methods
                .iter()
                .position(|m| m.name == name)
                .ok_or_else(|| Error::UndeclaredMethod { mark, name })?;
            element.implementations[index] = read_impl(source, &element.name)?;
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Next mapping key, or `None` at the end of the mapping
fn next_key<S: EventSource>(source: &mut S) -> Result<Option<(String, Mark)>> {
    let event = source.next_event()?;
    if event.kind == EventKind::MappingEnd {
        return Ok(None);
    }
    event.expect(EventKind::Scalar)?;
    Ok(Some((event.value, event.mark)))
}

/// Open a mapping value. A null value reads as an empty mapping and
/// returns `false`.
fn open_mapping<S: EventSource>(source: &mut S) -> Result<bool> {
    let event = source.next_event()?;
    if event.kind == EventKind::Scalar && event.value.is_empty() {
        return Ok(false);
    }
    event.expect(EventKind::MappingStart)?;
    Ok(true)
}

fn read_method<S: EventSource>(
    source: &mut S,
    existing: &[Method],
    protocol: &str,
    name: String,
    mark: Mark,
) -> Result<Method> {
    if name == FINALIZE_METHOD || existing.iter().any(|m| m.name == name) {
        return Err(Error::DuplicateMethod { mark, name });
    }

    let mut method = Method {
        name,
        return_type: "void".to_string(),
        parameters: Vec::new(),
        default_impl: ImplDescriptor::new(ImplKind::Undefined, protocol),
        is_implicit: false,
    };

    if open_mapping(source)? {
        while let Some((key, mark)) = next_key(source)? {
            match key.as_str() {
                "return" => method.return_type = source.expect_scalar()?.0,
                "default" => method.default_impl = read_impl(source, protocol)?,
                _ => {
                    if method.parameter(&key).is_some() {
                        return Err(Error::DuplicateArgument {
                            mark,
                            method: method.name.clone(),
                            name: key,
                        });
                    }
                    let ty = source.expect_scalar()?.0;
                    method.parameters.push(Field::new(key, ty));
                }
            }
        }
    }

    trace!(method = %method.name, default = %method.default_impl.kind, "method declared");
    Ok(method)
}

fn read_impl<S: EventSource>(source: &mut S, implementor: &str) -> Result<ImplDescriptor> {
    let (keyword, mark) = source.expect_scalar()?;
    match ImplKind::from_keyword(&keyword) {
        Ok(kind) => Ok(ImplDescriptor::new(kind, implementor)),
        Err(KeywordError::Unsupported) => Err(Error::UnsupportedImplementation {
            mark,
            name: keyword,
        }),
        Err(KeywordError::Unknown) => Err(Error::UnknownImplementation {
            mark,
            name: keyword,
        }),
    }
}

fn read_fields<S: EventSource>(source: &mut S, element: &mut Element) -> Result<()> {
    source.expect(EventKind::MappingStart)?;
    while let Some((name, mark)) = next_key(source)? {
        if element.member(&name).is_some() {
            return Err(Error::DuplicateField { mark, name });
        }
        let ty = source.expect_scalar()?.0;
        element.members.push(Field::new(name, ty));
    }
    Ok(())
}
