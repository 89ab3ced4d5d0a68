//! Arena Runtime Contract
//!
//! Generated code keeps every instance of a protocol on an intrusive singly
//! linked chain owned by an allocation context. Constructors append in O(1)
//! through the tracked tail, link children to their new parent (each instance
//! has at most one parent), and teardown walks the chain, finalizing and
//! freeing every instance.
//!
//! [`ContextLayout`] fixes the members the synthesizer emits for the context
//! and for the core header every instance starts with. [`Arena`] is a checked
//! in-process model of the same contract: it reports a violated single-parent
//! invariant or a call through an undefined slot as an [`ArenaError`]
//! instead of asserting or crashing.

use std::fmt;

use thiserror::Error;

use crate::model::{Field, Protocol, FINALIZE_METHOD};
use crate::resolve::{DispatchTable, Slot};

// =============================================================================
// Layout
// =============================================================================

/// Member names of the generated context and instance header
#[derive(Debug, Clone)]
pub struct ContextLayout {
    protocol: String,
    location_type: String,
}

impl ContextLayout {
    pub const FIRST: &'static str = "first";
    pub const LAST: &'static str = "last";
    pub const OOM: &'static str = "oom";
    pub const UNIMPLEMENTED: &'static str = "unimplemented";

    pub const VTABLE: &'static str = "vtable";
    pub const WHERE: &'static str = "where";
    pub const PARENT: &'static str = "parent";
    pub const GC_NEXT: &'static str = "gc_next";

    pub fn new(protocol: impl Into<String>, location_type: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            location_type: location_type.into(),
        }
    }

    /// Members of `<protocol>_context_t`, as C declarations
    pub fn context_members(&self) -> Vec<String> {
        let p = &self.protocol;
        vec![
            format!("struct {}_s* {};", p, Self::FIRST),
            format!("struct {}_s* {};", p, Self::LAST),
            format!("void (*{})(void);", Self::OOM),
            format!("void (*{})(const struct {}_s*, const char*);", Self::UNIMPLEMENTED, p),
        ]
    }

    /// Members of the core header shared by every instance
    pub fn core_members(&self) -> Vec<Field> {
        let p = &self.protocol;
        vec![
            Field::new(Self::VTABLE, format!("const struct {}_vtable_s*", p)),
            Field::new(Self::WHERE, self.location_type.as_str()),
            Field::new(Self::PARENT, format!("struct {}_s*", p)),
            Field::new(Self::GC_NEXT, format!("struct {}_s*", p)),
        ]
    }
}

// =============================================================================
// Checked model
// =============================================================================

/// Handle to an instance owned by an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runtime contract violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("No such element: {0}")]
    UnknownElement(String),

    #[error("No such method: {0}")]
    UnknownMethod(String),

    #[error("No such instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("{element} takes {expected} child pointer(s), got {found}")]
    ArityMismatch {
        element: String,
        expected: usize,
        found: usize,
    },

    #[error("Instance {child} already has parent {parent}")]
    AlreadyParented {
        child: InstanceId,
        parent: InstanceId,
    },

    #[error("Instance {child} is passed more than once to one constructor")]
    DuplicateChild { child: InstanceId },

    #[error("{element} does not implement {method}")]
    Unimplemented { element: String, method: String },
}

#[derive(Debug, Clone)]
struct Instance {
    element: usize,
    parent: Option<InstanceId>,
    children: Vec<Option<InstanceId>>,
}

/// Per-instance hook run during [`Arena::teardown`]
pub trait Finalizer {
    /// `slot` is the instance's resolved finalizer slot
    fn finalize(&mut self, instance: InstanceId, element: &str, slot: &Slot);
}

impl<F> Finalizer for F
where
    F: FnMut(InstanceId, &str, &Slot),
{
    fn finalize(&mut self, instance: InstanceId, element: &str, slot: &Slot) {
        self(instance, element, slot)
    }
}

/// Checked model of a generated allocation context
#[derive(Debug)]
pub struct Arena<'a> {
    protocol: &'a Protocol,
    table: &'a DispatchTable,
    /// Live chain, in construction order
    live: Vec<Instance>,
}

impl<'a> Arena<'a> {
    pub fn new(protocol: &'a Protocol, table: &'a DispatchTable) -> Self {
        Self {
            protocol,
            table,
            live: Vec::new(),
        }
    }

    /// Construct an instance of `element`.
    ///
    /// `children` supplies one value per constructor-visible member pointing
    /// at a protocol instance, in declaration order. Every non-null child
    /// must be parentless; on failure nothing is linked or allocated.
    pub fn construct(
        &mut self,
        element: &str,
        children: &[Option<InstanceId>],
    ) -> Result<InstanceId, ArenaError> {
        let index = self
            .protocol
            .elements
            .iter()
            .position(|e| e.name == element)
            .ok_or_else(|| ArenaError::UnknownElement(element.to_string()))?;

        let expected = self.protocol.elements[index]
            .ctor_parameters()
            .filter(|m| self.protocol.is_instance_pointer(&m.ty))
            .count();
        if children.len() != expected {
            return Err(ArenaError::ArityMismatch {
                element: element.to_string(),
                expected,
                found: children.len(),
            });
        }

        let mut claimed: Vec<InstanceId> = Vec::new();
        for child in children.iter().flatten() {
            let current = self.get(*child)?;
            if let Some(parent) = current.parent {
                return Err(ArenaError::AlreadyParented {
                    child: *child,
                    parent,
                });
            }
            if claimed.contains(child) {
                return Err(ArenaError::DuplicateChild { child: *child });
            }
            claimed.push(*child);
        }

        let id = InstanceId(self.live.len());
        for child in &claimed {
            self.live[child.0].parent = Some(id);
        }
        self.live.push(Instance {
            element: index,
            parent: None,
            children: children.to_vec(),
        });
        Ok(id)
    }

    fn get(&self, id: InstanceId) -> Result<&Instance, ArenaError> {
        self.live.get(id.0).ok_or(ArenaError::UnknownInstance(id))
    }

    pub fn parent(&self, id: InstanceId) -> Result<Option<InstanceId>, ArenaError> {
        Ok(self.get(id)?.parent)
    }

    /// Child pointers as passed to the constructor
    pub fn children(&self, id: InstanceId) -> Result<&[Option<InstanceId>], ArenaError> {
        Ok(&self.get(id)?.children)
    }

    pub fn element_of(&self, id: InstanceId) -> Result<&str, ArenaError> {
        let instance = self.get(id)?;
        Ok(&self.protocol.elements[instance.element].name)
    }

    /// Live instances, in chain order
    pub fn live(&self) -> impl Iterator<Item = InstanceId> + '_ {
        (0..self.live.len()).map(InstanceId)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Look up the slot a call of `method` on `id` dispatches through.
    /// Undefined slots are reported instead of being called.
    pub fn dispatch(&self, id: InstanceId, method: &str) -> Result<&Slot, ArenaError> {
        let element = self.element_of(id)?;
        let index = self
            .table
            .methods
            .iter()
            .position(|m| m == method)
            .ok_or_else(|| ArenaError::UnknownMethod(method.to_string()))?;
        let row = self
            .table
            .element(element)
            .ok_or_else(|| ArenaError::UnknownElement(element.to_string()))?;

        match &row.slots[index] {
            Slot::Undefined => Err(ArenaError::Unimplemented {
                element: element.to_string(),
                method: method.to_string(),
            }),
            slot => Ok(slot),
        }
    }

    /// Finalize every live instance in chain order, then release them all.
    /// Returns the number of instances torn down.
    pub fn teardown<F: Finalizer>(self, mut finalizer: F) -> usize {
        let slot_index = self.table.methods.iter().position(|m| m == FINALIZE_METHOD);
        let undefined = Slot::Undefined;
        for (i, instance) in self.live.iter().enumerate() {
            let element = &self.protocol.elements[instance.element].name;
            let slot = slot_index
                .and_then(|s| self.table.element(element).map(|row| &row.slots[s]))
                .unwrap_or(&undefined);
            finalizer.finalize(InstanceId(i), element, slot);
        }
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProtocolBuilder;
    use crate::resolve::ResolveOptions;
    use crate::schema::YamlEventSource;

    const EXPR: &str = "configuration:\n  protocol_name: expr\nprotocol:\n  eval:\n    return: int\n    default: returns 0\n  simplify:\n    return: expr*\nLit:\n  fields:\n    value: int\nNeg:\n  fields:\n    child: expr*\nAdd:\n  fields:\n    lhs: expr*\n    rhs: expr*\n    _cache: expr*\n  methods:\n    _finalize: custom\n";

    fn fixture() -> (Protocol, DispatchTable) {
        let mut source = YamlEventSource::from_str(EXPR).unwrap();
        let protocol = ProtocolBuilder::default().build(&mut source).unwrap();
        let table = DispatchTable::resolve(&protocol, ResolveOptions::default()).unwrap();
        (protocol, table)
    }

    #[test]
    fn test_context_layout() {
        let layout = ContextLayout::new("expr", "YYLTYPE");
        let members = layout.context_members();
        assert_eq!(members[0], "struct expr_s* first;");
        assert_eq!(members[1], "struct expr_s* last;");
        let core: Vec<String> = layout.core_members().into_iter().map(|f| f.name).collect();
        assert_eq!(core, vec!["vtable", "where", "parent", "gc_next"]);
    }

    #[test]
    fn test_construct_links_children() {
        let (protocol, table) = fixture();
        let mut arena = Arena::new(&protocol, &table);
        let lit = arena.construct("Lit", &[]).unwrap();
        let neg = arena.construct("Neg", &[Some(lit)]).unwrap();
        assert_eq!(arena.parent(lit).unwrap(), Some(neg));
        assert_eq!(arena.parent(neg).unwrap(), None);
        assert_eq!(arena.live().collect::<Vec<_>>(), vec![lit, neg]);
    }

    #[test]
    fn test_single_parent_invariant() {
        let (protocol, table) = fixture();
        let mut arena = Arena::new(&protocol, &table);
        let lit = arena.construct("Lit", &[]).unwrap();
        let first = arena.construct("Neg", &[Some(lit)]).unwrap();

        let err = arena.construct("Neg", &[Some(lit)]).unwrap_err();
        assert_eq!(
            err,
            ArenaError::AlreadyParented {
                child: lit,
                parent: first
            }
        );
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_same_child_twice_is_rejected_without_side_effects() {
        let (protocol, table) = fixture();
        let mut arena = Arena::new(&protocol, &table);
        let lit = arena.construct("Lit", &[]).unwrap();
        let err = arena.construct("Add", &[Some(lit), Some(lit)]).unwrap_err();
        assert_eq!(err, ArenaError::DuplicateChild { child: lit });
        assert_eq!(err.to_string(), "Instance #0 is passed more than once to one constructor");
        assert_eq!(arena.parent(lit).unwrap(), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_null_children_and_arity() {
        let (protocol, table) = fixture();
        let mut arena = Arena::new(&protocol, &table);
        // _cache is implicit and not a constructor parameter
        assert!(arena.construct("Add", &[None, None]).is_ok());
        let err = arena.construct("Add", &[None]).unwrap_err();
        assert_eq!(
            err,
            ArenaError::ArityMismatch {
                element: "Add".to_string(),
                expected: 2,
                found: 1
            }
        );
        assert!(matches!(
            arena.construct("Mul", &[]),
            Err(ArenaError::UnknownElement(_))
        ));
    }

    #[test]
    fn test_dispatch_reports_undefined_slot() {
        let (protocol, table) = fixture();
        let mut arena = Arena::new(&protocol, &table);
        let lit = arena.construct("Lit", &[]).unwrap();

        let slot = arena.dispatch(lit, "eval").unwrap();
        assert_eq!(slot.binding().unwrap().symbol, "Lit_eval");

        let err = arena.dispatch(lit, "simplify").unwrap_err();
        assert_eq!(
            err,
            ArenaError::Unimplemented {
                element: "Lit".to_string(),
                method: "simplify".to_string()
            }
        );
        assert!(matches!(
            arena.dispatch(lit, "print"),
            Err(ArenaError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_teardown_finalizes_in_chain_order() {
        let (protocol, table) = fixture();
        let mut arena = Arena::new(&protocol, &table);
        let a = arena.construct("Lit", &[]).unwrap();
        let b = arena.construct("Lit", &[]).unwrap();
        arena.construct("Add", &[Some(a), Some(b)]).unwrap();

        let mut seen = Vec::new();
        let count = arena.teardown(|id: InstanceId, element: &str, slot: &Slot| {
            let symbol = slot.binding().map(|b| b.symbol.clone());
            seen.push((id, element.to_string(), symbol));
        });

        assert_eq!(count, 3);
        assert_eq!(seen[0].1, "Lit");
        assert_eq!(seen[0].2.as_deref(), Some("Lit__finalize"));
        assert_eq!(seen[2].1, "Add");
        assert_eq!(seen[2].2.as_deref(), Some("Add__finalize"));
        assert_eq!(seen.iter().map(|s| s.0).collect::<Vec<_>>(), vec![a, b, InstanceId(2)]);
    }
}
