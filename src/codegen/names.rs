//! C Naming Pass
//!
//! Derives every C identifier the synthesizer emits from the protocol,
//! element and method names, and checks that no two distinct entities end
//! up sharing one. C has two relevant namespaces at file scope: ordinary
//! identifiers (functions, objects, typedefs, macros) and struct tags. Each
//! is checked separately.
//!
//! This pass runs AFTER dispatch resolution, BEFORE emission.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{Field, Method, Protocol};
use crate::resolve::DispatchTable;

// =============================================================================
// Identifier derivation
// =============================================================================

/// Names derived from the protocol name
#[derive(Debug, Clone)]
pub struct CNames {
    protocol: String,
}

impl CNames {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
        }
    }

    /// Typedef naming the protocol core struct
    pub fn protocol_type(&self) -> &str {
        &self.protocol
    }

    pub fn protocol_tag(&self) -> String {
        format!("{}_s", self.protocol)
    }

    pub fn vtable_tag(&self) -> String {
        format!("{}_vtable_s", self.protocol)
    }

    pub fn context_tag(&self) -> String {
        format!("{}_context_s", self.protocol)
    }

    pub fn context_type(&self) -> String {
        format!("{}_context_t", self.protocol)
    }

    /// Overridable macro standing for the context type
    pub fn context_macro(&self) -> String {
        format!("{}_CONTEXT_T", self.protocol)
    }

    pub fn context_global(&self) -> String {
        format!("{}_context", self.protocol)
    }

    pub fn context_create(&self) -> String {
        format!("{}_context_create", self.protocol)
    }

    pub fn context_destroy(&self) -> String {
        format!("{}_context_destroy", self.protocol)
    }

    pub fn unimplemented_handler(&self) -> String {
        format!("{}_unimplemented", self.protocol)
    }

    pub fn element_tag(&self, element: &str) -> String {
        format!("{}_s", element)
    }

    pub fn vtable_value(&self, element: &str) -> String {
        format!("{}_vtable", element)
    }

    /// Public methods are called by their own name; implicit ones get an
    /// internal trampoline prefixed with the protocol name.
    pub fn trampoline(&self, method: &Method) -> String {
        if method.is_implicit {
            format!("{}_{}", self.protocol, method.name)
        } else {
            method.name.clone()
        }
    }

    /// Receiver-first parameter list
    pub fn parameters(&self, method: &Method) -> String {
        let mut params = vec![format!("{}* {}", self.protocol, RECEIVER)];
        params.extend(method.parameters.iter().map(declaration));
        params.join(", ")
    }

    /// Receiver-first argument list forwarding `receiver`
    pub fn arguments(&self, receiver: &str, method: &Method) -> String {
        let mut args = vec![receiver.to_string()];
        args.extend(method.parameters.iter().map(|p| p.name.clone()));
        args.join(", ")
    }

    /// `PREFIX_PROTOCOL_H_`, restricted to identifier characters
    pub fn include_guard(&self, prefix: &str) -> String {
        let raw = format!("{}_{}_H_", prefix, self.protocol);
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// `type name`, with the padding member rendered as an unnamed zero-width
/// bit-field
pub fn declaration(field: &Field) -> String {
    if field.is_padding() {
        format!("{} :0", field.ty)
    } else {
        format!("{} {}", field.ty, field.name)
    }
}

// =============================================================================
// Collision check
// =============================================================================

/// Element struct member holding the protocol core header
pub const CORE_MEMBER: &str = "core";

/// Receiver parameter of every method
pub const RECEIVER: &str = "this";

/// Local naming the element view of the receiver or of a new instance
pub const SELF_LOCAL: &str = "_self";

/// Local holding a zero-initialized return value
pub const ZERO_LOCAL: &str = "_zero";

/// Constructor parameter carrying the source location
pub const WHERE_PARAMETER: &str = "_where";

#[derive(Debug, Default)]
struct Namespace {
    owners: HashMap<String, String>,
}

impl Namespace {
    /// Record that `owner` uses `name`. Re-claiming by the same owner is a
    /// no-op.
    fn claim(&mut self, name: String, owner: String) -> Result<()> {
        match self.owners.get(&name) {
            Some(existing) if *existing != owner => Err(Error::SymbolCollision {
                symbol: name,
                first: existing.clone(),
                second: owner,
            }),
            Some(_) => Ok(()),
            None => {
                self.owners.insert(name, owner);
                Ok(())
            }
        }
    }
}

/// C library functions called from generated bodies and constructors
const LIBRARY_CALLS: &[&str] = &["malloc", "memset", "abort"];

/// Identifiers derived from the protocol name alone
fn protocol_identifiers(names: &CNames) -> Vec<(String, &'static str)> {
    vec![
        (names.protocol_type().to_string(), "the protocol type"),
        (names.context_type(), "the context type"),
        (names.context_macro(), "the context type macro"),
        (names.context_global(), "the context global"),
        (names.context_create(), "the context constructor"),
        (names.context_destroy(), "the context destructor"),
        (names.unimplemented_handler(), "the unimplemented handler"),
    ]
}

/// Names a parameter of a generated function must not shadow: its locals,
/// the library calls and the protocol-level identifiers
fn function_scope(names: &CNames, locals: &[&str]) -> Namespace {
    let mut scope = Namespace::default();
    for local in locals {
        scope
            .owners
            .insert(local.to_string(), "a generated local".to_string());
    }
    for call in LIBRARY_CALLS {
        scope
            .owners
            .insert(call.to_string(), "the C library".to_string());
    }
    for (name, owner) in protocol_identifiers(names) {
        scope.owners.insert(name, owner.to_string());
    }
    scope
}

/// Verify that every emitted identifier has a single owner and that no
/// parameter shadows a name its function body refers to
pub fn check_collisions(protocol: &Protocol, table: &DispatchTable) -> Result<()> {
    let names = CNames::new(protocol.name.as_str());
    let mut idents = Namespace::default();
    let mut tags = Namespace::default();

    for (name, owner) in protocol_identifiers(&names) {
        idents.claim(name, owner.to_string())?;
    }
    tags.claim(names.protocol_tag(), "the protocol".to_string())?;
    tags.claim(names.vtable_tag(), "the vtable type".to_string())?;
    tags.claim(names.context_tag(), "the context type".to_string())?;

    for method in &protocol.methods {
        let trampoline = names.trampoline(method);
        let owner = format!("the trampoline for method `{}`", method.name);
        idents.claim(trampoline.clone(), owner.clone())?;

        // recursive and visit-parent bodies call their own trampoline
        let mut locals = function_scope(&names, &[RECEIVER, SELF_LOCAL, ZERO_LOCAL]);
        locals.owners.insert(trampoline, owner);
        for param in &method.parameters {
            locals.claim(
                param.name.clone(),
                format!("a parameter of `{}`", method.name),
            )?;
        }
    }

    for element in &protocol.elements {
        let vtable = names.vtable_value(&element.name);
        idents.claim(
            element.name.clone(),
            format!("the constructor of `{}`", element.name),
        )?;
        idents.claim(vtable.clone(), format!("the vtable of `{}`", element.name))?;
        tags.claim(
            names.element_tag(&element.name),
            format!("the struct of `{}`", element.name),
        )?;

        let mut members = Namespace::default();
        members.claim(CORE_MEMBER.to_string(), "the protocol core".to_string())?;
        for member in element.members.iter().filter(|m| !m.is_padding()) {
            members.claim(
                member.name.clone(),
                format!("a member of `{}`", element.name),
            )?;
        }

        let mut params = function_scope(&names, &[SELF_LOCAL, WHERE_PARAMETER]);
        params
            .owners
            .insert(vtable, format!("the vtable of `{}`", element.name));
        for member in element.ctor_parameters() {
            params.claim(
                member.name.clone(),
                format!("a constructor parameter of `{}`", element.name),
            )?;
        }
    }

    for row in &table.elements {
        for (slot, method) in row.slots.iter().zip(&table.methods) {
            if let Some(binding) = slot.binding() {
                idents.claim(
                    binding.symbol.clone(),
                    format!("`{}` implementing `{}`", binding.implementor, method),
                )?;
            }
        }
    }

    Ok(())
}
