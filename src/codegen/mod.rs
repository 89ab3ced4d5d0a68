//! Code Synthesis
//!
//! Turns a resolved protocol into a C header and a C implementation.
//!
//! Architecture:
//! - CodegenContext: immutable after build(), holds the model, the dispatch
//!   table, configuration and the derived C names
//! - ElementRegion: projection of one element and its resolved vtable row
//! - Emitters (`header`, `source`): consume the context and its regions
//!
//! Emitters never re-run resolution; every implementor and linkage decision
//! is read from the [`DispatchTable`].

pub mod header;
pub mod names;
pub mod source;
pub mod writer;

use tracing::{debug, info};

use crate::arena::ContextLayout;
use crate::config::CodegenConfig;
use crate::error::{Error, Result};
use crate::model::{Element, Field, Method, Protocol, FINALIZE_METHOD};
use crate::resolve::{DispatchTable, ElementDispatch};

use names::CNames;

// =============================================================================
// Region
// =============================================================================

/// One element together with its resolved vtable row
#[derive(Debug, Clone, Copy)]
pub struct ElementRegion<'a> {
    pub element: &'a Element,
    pub dispatch: &'a ElementDispatch,
    protocol: &'a Protocol,
}

impl<'a> ElementRegion<'a> {
    pub fn name(&self) -> &'a str {
        &self.element.name
    }

    /// Members pointing at protocol instances, in declaration order
    pub fn instance_members(&self) -> impl Iterator<Item = &'a Field> + 'a {
        let protocol = self.protocol;
        self.element
            .members
            .iter()
            .filter(move |m| !m.is_padding() && protocol.is_instance_pointer(&m.ty))
    }

    /// Constructor parameters that become children of the new instance
    pub fn child_parameters(&self) -> impl Iterator<Item = &'a Field> + 'a {
        let protocol = self.protocol;
        self.element
            .ctor_parameters()
            .filter(move |m| protocol.is_instance_pointer(&m.ty))
    }
}

// =============================================================================
// CodegenContext
// =============================================================================

/// Immutable synthesis context, frozen after build()
#[derive(Debug)]
pub struct CodegenContext<'a> {
    protocol: &'a Protocol,
    table: &'a DispatchTable,
    config: &'a CodegenConfig,
    names: CNames,
    layout: ContextLayout,
    input_name: String,
    header_include: String,
}

impl<'a> CodegenContext<'a> {
    /// Build a context, checking that `table` was resolved from `protocol`
    /// and that the derived C identifiers are unambiguous.
    ///
    /// `input_name` is named in the banner; `header_include` is what the
    /// implementation `#include`s to reach the header.
    pub fn build(
        protocol: &'a Protocol,
        table: &'a DispatchTable,
        config: &'a CodegenConfig,
        input_name: impl Into<String>,
        header_include: impl Into<String>,
    ) -> Result<Self> {
        let matches = table.protocol == protocol.name
            && table.methods.len() == protocol.methods.len()
            && table
                .methods
                .iter()
                .zip(&protocol.methods)
                .all(|(t, m)| *t == m.name)
            && table.elements.len() == protocol.elements.len()
            && table
                .elements
                .iter()
                .zip(&protocol.elements)
                .all(|(t, e)| t.element == e.name && t.slots.len() == protocol.methods.len());
        if !matches {
            return Err(Error::DispatchMismatch {
                protocol: protocol.name.clone(),
                table: table.protocol.clone(),
            });
        }

        names::check_collisions(protocol, table)?;

        Ok(Self {
            protocol,
            table,
            config,
            names: CNames::new(protocol.name.as_str()),
            layout: ContextLayout::new(protocol.name.as_str(), config.location_type.as_str()),
            input_name: input_name.into(),
            header_include: header_include.into(),
        })
    }

    pub fn protocol(&self) -> &'a Protocol {
        self.protocol
    }

    pub fn table(&self) -> &'a DispatchTable {
        self.table
    }

    pub fn config(&self) -> &'a CodegenConfig {
        self.config
    }

    pub fn names(&self) -> &CNames {
        &self.names
    }

    pub fn layout(&self) -> &ContextLayout {
        &self.layout
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn header_include(&self) -> &str {
        &self.header_include
    }

    /// Elements in declaration order
    pub fn regions(&self) -> impl Iterator<Item = ElementRegion<'a>> + '_ {
        self.protocol
            .elements
            .iter()
            .zip(&self.table.elements)
            .map(move |(element, dispatch)| ElementRegion {
                element,
                dispatch,
                protocol: self.protocol,
            })
    }

    /// Methods paired with their slot index
    pub fn methods(&self) -> impl Iterator<Item = (usize, &'a Method)> {
        self.protocol.methods.iter().enumerate()
    }

    /// The implicit lifecycle method, if the protocol declares it
    pub fn finalizer(&self) -> Option<&'a Method> {
        self.protocol
            .methods
            .iter()
            .find(|m| m.is_implicit && m.name == FINALIZE_METHOD)
    }
}

// =============================================================================
// Generated Output
// =============================================================================

/// Output from code synthesis
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    /// C header text
    pub header: String,
    /// C implementation text
    pub implementation: String,
    /// Number of element types emitted
    pub element_count: usize,
    /// Number of method bodies generated
    pub body_count: usize,
}

// =============================================================================
// Public API
// =============================================================================

/// Synthesize the header and implementation for a resolved protocol
pub fn synthesize(
    protocol: &Protocol,
    table: &DispatchTable,
    config: &CodegenConfig,
    input_name: &str,
    header_include: &str,
) -> Result<GeneratedOutput> {
    let ctx = CodegenContext::build(protocol, table, config, input_name, header_include)?;

    let header = header::emit_header(&ctx);
    debug!(bytes = header.len(), "header emitted");
    let implementation = source::emit_source(&ctx);
    debug!(bytes = implementation.len(), "implementation emitted");

    let output = GeneratedOutput {
        header,
        implementation,
        element_count: protocol.elements.len(),
        body_count: table.generated_bodies().count(),
    };
    info!(
        protocol = %protocol.name,
        elements = output.element_count,
        bodies = output.body_count,
        "synthesis complete"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProtocolBuilder;
    use crate::resolve::ResolveOptions;
    use crate::schema::YamlEventSource;

    fn resolved(text: &str) -> (Protocol, DispatchTable) {
        let mut source = YamlEventSource::from_str(text).unwrap();
        let protocol = ProtocolBuilder::default().build(&mut source).unwrap();
        let table = DispatchTable::resolve(&protocol, ResolveOptions::default()).unwrap();
        (protocol, table)
    }

    const TREE: &str = "configuration:\n  protocol_name: node\nprotocol:\n  walk:\n    default: recursive\nLeaf:\n  fields:\n    label: const char*\nPair:\n  fields:\n    left: node*\n    right: struct node_s*\n    _owner: node*\n";

    #[test]
    fn test_regions_follow_declaration_order() {
        let (protocol, table) = resolved(TREE);
        let config = CodegenConfig::default();
        let ctx = CodegenContext::build(&protocol, &table, &config, "tree.yaml", "tree.h").unwrap();
        let names: Vec<&str> = ctx.regions().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Leaf", "Pair"]);
    }

    #[test]
    fn test_instance_members_and_children() {
        let (protocol, table) = resolved(TREE);
        let config = CodegenConfig::default();
        let ctx = CodegenContext::build(&protocol, &table, &config, "tree.yaml", "tree.h").unwrap();
        let pair = ctx.regions().nth(1).unwrap();

        let members: Vec<&str> = pair.instance_members().map(|f| f.name.as_str()).collect();
        assert_eq!(members, vec!["left", "right", "_owner"]);
        let children: Vec<&str> = pair.child_parameters().map(|f| f.name.as_str()).collect();
        assert_eq!(children, vec!["left", "right"]);
    }

    #[test]
    fn test_rejects_table_from_other_protocol() {
        let (protocol, _) = resolved(TREE);
        let (_, other) = resolved("configuration:\n  protocol_name: expr\nprotocol:\nLit:\n");
        let config = CodegenConfig::default();
        let err = CodegenContext::build(&protocol, &other, &config, "tree.yaml", "tree.h").unwrap_err();
        assert!(matches!(err, Error::DispatchMismatch { .. }), "{:?}", err);
    }

    #[test]
    fn test_synthesize_counts() {
        let (protocol, table) = resolved(TREE);
        let output = synthesize(&protocol, &table, &CodegenConfig::default(), "tree.yaml", "tree.h").unwrap();
        assert_eq!(output.element_count, 2);
        // walk and _finalize for each element
        assert_eq!(output.body_count, 4);
        assert!(output.header.contains("Auto-generated from tree.yaml by protogen."));
        assert!(output.implementation.contains("#include \"tree.h\""));
    }
}
