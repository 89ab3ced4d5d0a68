//! Dispatch Resolution
//!
//! Decides, for every (element, method) pair, which entity supplies the
//! function and how it is linked. The result is a [`DispatchTable`] with one
//! row per element and one [`Slot`] per method, both in declaration order.
//!
//! Resolution is a pure function of the [`Protocol`]: resolving the same
//! model twice yields identical tables.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VoidConstantPolicy;
use crate::error::{Error, Result};
use crate::model::{Element, ImplDescriptor, ImplKind, Method, Protocol};

/// How the implementing function is linked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Generated into the implementation file with internal linkage
    Internal,
    /// Supplied by the user; only declared
    External,
}

/// A callable implementation bound to a vtable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Protocol or element whose function is used
    pub implementor: String,
    pub kind: ImplKind,
    pub linkage: Linkage,
    /// Name of the C function
    pub symbol: String,
}

impl Binding {
    /// Whether `element` owns the generated body for this binding
    pub fn is_generated_by(&self, element: &str) -> bool {
        self.linkage == Linkage::Internal && self.implementor == element
    }
}

/// One vtable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum Slot {
    /// No implementation; the slot holds a null function
    Undefined,
    Bound(Binding),
}

impl Slot {
    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Self::Undefined => None,
            Self::Bound(binding) => Some(binding),
        }
    }
}

/// Resolved vtable contents of one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDispatch {
    pub element: String,
    pub slots: Vec<Slot>,
}

/// Resolution knobs
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub void_constant: VoidConstantPolicy,
}

/// Resolved (method, element) → implementor/linkage assignments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTable {
    pub protocol: String,
    /// Method names, in slot order
    pub methods: Vec<String>,
    pub elements: Vec<ElementDispatch>,
}

impl DispatchTable {
    /// Resolve every slot of every element
    pub fn resolve(protocol: &Protocol, options: ResolveOptions) -> Result<Self> {
        let mut elements = Vec::with_capacity(protocol.elements.len());

        for element in &protocol.elements {
            let slots = protocol
                .methods
                .iter()
                .zip(&element.implementations)
                .map(|(method, descriptor)| {
                    let descriptor = check_void_constant(element, method, descriptor, options)?;
                    Ok(resolve_slot(&protocol.name, method, &element.name, &descriptor))
                })
                .collect::<Result<Vec<_>>>()?;

            elements.push(ElementDispatch {
                element: element.name.clone(),
                slots,
            });
        }

        let table = Self {
            protocol: protocol.name.clone(),
            methods: protocol.methods.iter().map(|m| m.name.clone()).collect(),
            elements,
        };
        debug!(
            protocol = %table.protocol,
            generated = table.generated_bodies().count(),
            external = table.external_symbols().len(),
            "dispatch resolved"
        );
        Ok(table)
    }

    pub fn element(&self, name: &str) -> Option<&ElementDispatch> {
        self.elements.iter().find(|e| e.element == name)
    }

    /// Slot for `method` in `element`'s vtable
    pub fn slot(&self, element: &str, method: &str) -> Option<&Slot> {
        let index = self.methods.iter().position(|m| m == method)?;
        self.element(element)?.slots.get(index)
    }

    /// Bodies to generate: (element index, method index, binding)
    pub fn generated_bodies(&self) -> impl Iterator<Item = (usize, usize, &Binding)> {
        self.elements.iter().enumerate().flat_map(|(e, row)| {
            row.slots
                .iter()
                .enumerate()
                .filter_map(move |(m, slot)| match slot {
                    Slot::Bound(b) if b.is_generated_by(&row.element) => Some((e, m, b)),
                    _ => None,
                })
        })
    }

    /// Externally supplied functions as (method index, symbol), each symbol
    /// once, in first-use order
    pub fn external_symbols(&self) -> Vec<(usize, &str)> {
        let mut seen: Vec<(usize, &str)> = Vec::new();
        for row in &self.elements {
            for (m, slot) in row.slots.iter().enumerate() {
                if let Slot::Bound(b) = slot {
                    if b.linkage == Linkage::External && !seen.iter().any(|(_, s)| *s == b.symbol)
                    {
                        seen.push((m, b.symbol.as_str()));
                    }
                }
            }
        }
        seen
    }
}

/// Resolve a single slot.
///
/// A descriptor whose implementor is not the protocol was set by an explicit
/// override or inherited through `extends` and is used as is. A descriptor
/// still carrying the protocol default is shared as one function when it is
/// `custom`; every other default kind gets a body generated per element.
pub fn resolve_slot(
    protocol: &str,
    method: &Method,
    element: &str,
    descriptor: &ImplDescriptor,
) -> Slot {
    if descriptor.kind == ImplKind::Undefined {
        return Slot::Undefined;
    }

    let (implementor, linkage) = if descriptor.implementor != protocol {
        (descriptor.implementor.as_str(), linkage_of(descriptor.kind))
    } else if descriptor.kind == ImplKind::Custom {
        (protocol, Linkage::External)
    } else {
        (element, Linkage::Internal)
    };

    Slot::Bound(Binding {
        implementor: implementor.to_string(),
        kind: descriptor.kind,
        linkage,
        symbol: function_symbol(implementor, &method.name),
    })
}

/// Name of the function `implementor` supplies for `method`
pub fn function_symbol(implementor: &str, method: &str) -> String {
    format!("{}_{}", implementor, method)
}

fn linkage_of(kind: ImplKind) -> Linkage {
    if kind == ImplKind::Custom {
        Linkage::External
    } else {
        Linkage::Internal
    }
}

fn check_void_constant(
    element: &Element,
    method: &Method,
    descriptor: &ImplDescriptor,
    options: ResolveOptions,
) -> Result<ImplDescriptor> {
    if !(descriptor.kind.is_constant() && method.returns_void()) {
        return Ok(descriptor.clone());
    }
    match options.void_constant {
        VoidConstantPolicy::Reject => Err(Error::ConstantOnVoid {
            element: element.name.clone(),
            method: method.name.clone(),
            kind: descriptor.kind,
        }),
        VoidConstantPolicy::Coerce => {
            warn!(
                element = %element.name,
                method = %method.name,
                kind = %descriptor.kind,
                "constant implementation on void method generates an empty body"
            );
            Ok(ImplDescriptor::new(
                ImplKind::DoesNothing,
                descriptor.implementor.as_str(),
            ))
        }
    }
}
