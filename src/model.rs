//! Protocol Model
//!
//! The resolved object model a schema document describes: one protocol with
//! an ordered method list and an ordered element list. All sequences are kept
//! in declaration order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Field names starting with this marker are alignment-only slots.
pub const PADDING_MARKER: char = ':';

/// Field names starting with this marker stay out of constructor signatures.
pub const IMPLICIT_MARKER: char = '_';

/// Name of the synthetic padding member heading every element.
pub const PADDING_FIELD: &str = ":0";

/// Implicit lifecycle method run on every live instance at teardown.
pub const FINALIZE_METHOD: &str = "_finalize";

// =============================================================================
// Field
// =============================================================================

/// A typed name, used for method parameters and element members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }

    /// The synthetic alignment member
    pub fn padding(ty: impl Into<String>) -> Self {
        Self::new(PADDING_FIELD, ty)
    }

    pub fn is_padding(&self) -> bool {
        self.name.starts_with(PADDING_MARKER)
    }

    pub fn is_implicit(&self) -> bool {
        self.name.starts_with(IMPLICIT_MARKER)
    }

    /// Whether the generated constructor takes this member as a parameter
    pub fn is_ctor_parameter(&self) -> bool {
        !self.is_padding() && !self.is_implicit()
    }
}

/// Whether `ty` spells a C integer type. Bit-fields, including the unnamed
/// padding member, accept nothing else.
pub fn is_integer_type(ty: &str) -> bool {
    const NAMED: &[&str] = &[
        "_Bool", "bool", "size_t", "ptrdiff_t", "intptr_t", "uintptr_t", "intmax_t", "uintmax_t",
        "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
    ];
    const SPECIFIERS: &[&str] = &["signed", "unsigned", "char", "short", "int", "long"];

    let words: Vec<&str> = ty.split_whitespace().collect();
    match words.as_slice() {
        [] => false,
        [single] if NAMED.contains(single) => true,
        words => {
            words.iter().all(|w| SPECIFIERS.contains(w))
                && !(words.contains(&"signed") && words.contains(&"unsigned"))
        }
    }
}

// =============================================================================
// Implementation kinds
// =============================================================================

/// Strategy used to produce a method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplKind {
    Recursive,
    VisitParent,
    ReturnsZero,
    ReturnsOne,
    ReturnsThis,
    DoesNothing,
    Undefined,
    Custom,
}

/// Why an implementation keyword was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordError {
    /// Not in the vocabulary at all
    Unknown,
    /// Reserved in the vocabulary but without a generation strategy
    Unsupported,
}

const KEYWORDS: &[(&str, ImplKind)] = &[
    ("recursive", ImplKind::Recursive),
    ("visit parent", ImplKind::VisitParent),
    ("visits parent", ImplKind::VisitParent),
    ("returns 0", ImplKind::ReturnsZero),
    ("return 0", ImplKind::ReturnsZero),
    ("returns 1", ImplKind::ReturnsOne),
    ("return 1", ImplKind::ReturnsOne),
    ("returns this", ImplKind::ReturnsThis),
    ("return this", ImplKind::ReturnsThis),
    ("does nothing", ImplKind::DoesNothing),
    ("do nothing", ImplKind::DoesNothing),
    ("undefined", ImplKind::Undefined),
    ("custom", ImplKind::Custom),
];

const RESERVED_KEYWORDS: &[&str] = &["graphviz"];

impl ImplKind {
    /// Look up an implementation keyword.
    ///
    /// Matching ignores case, treats `_` and `-` as spaces and collapses
    /// runs of whitespace, so `Returns_This` selects [`ImplKind::ReturnsThis`].
    pub fn from_keyword(keyword: &str) -> Result<Self, KeywordError> {
        let normalized = normalize_keyword(keyword);
        if let Some((_, kind)) = KEYWORDS.iter().find(|(k, _)| *k == normalized) {
            return Ok(*kind);
        }
        if RESERVED_KEYWORDS.contains(&normalized.as_str()) {
            return Err(KeywordError::Unsupported);
        }
        Err(KeywordError::Unknown)
    }

    /// Canonical keyword
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Recursive => "recursive",
            Self::VisitParent => "visit parent",
            Self::ReturnsZero => "returns 0",
            Self::ReturnsOne => "returns 1",
            Self::ReturnsThis => "returns this",
            Self::DoesNothing => "does nothing",
            Self::Undefined => "undefined",
            Self::Custom => "custom",
        }
    }

    /// Kinds that return a fixed value regardless of arguments
    pub fn is_constant(self) -> bool {
        matches!(self, Self::ReturnsZero | Self::ReturnsOne | Self::ReturnsThis)
    }
}

impl fmt::Display for ImplKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

fn normalize_keyword(keyword: &str) -> String {
    keyword
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// An implementation kind together with the entity supplying the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplDescriptor {
    pub kind: ImplKind,
    /// Protocol or element name
    pub implementor: String,
}

impl ImplDescriptor {
    pub fn new(kind: ImplKind, implementor: impl Into<String>) -> Self {
        Self {
            kind,
            implementor: implementor.into(),
        }
    }
}

// =============================================================================
// Method
// =============================================================================

/// A virtual operation declared once on the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub return_type: String,
    /// Parameters after the receiver, in declaration order
    pub parameters: Vec<Field>,
    pub default_impl: ImplDescriptor,
    /// System-injected; never part of the public dispatch surface
    pub is_implicit: bool,
}

impl Method {
    pub fn returns_void(&self) -> bool {
        self.return_type.trim() == "void"
    }

    pub fn parameter(&self, name: &str) -> Option<&Field> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

// =============================================================================
// Element
// =============================================================================

/// A concrete instantiable record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    /// Members in declaration order, synthetic padding first
    pub members: Vec<Field>,
    /// One descriptor per protocol method, indexed like [`Protocol::methods`]
    pub implementations: Vec<ImplDescriptor>,
}

impl Element {
    pub fn member(&self, name: &str) -> Option<&Field> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Members the constructor takes as parameters, in declaration order
    pub fn ctor_parameters(&self) -> impl Iterator<Item = &Field> {
        self.members.iter().filter(|m| m.is_ctor_parameter())
    }
}

// =============================================================================
// Protocol
// =============================================================================

/// The root aggregate handed read-only to resolution and synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    /// Header path requested by the document's configuration
    pub header_path: Option<String>,
    /// Implementation path requested by the document's configuration
    pub impl_path: Option<String>,
    pub prologue: String,
    pub definitions: String,
    pub epilogue: String,
    pub methods: Vec<Method>,
    pub elements: Vec<Element>,
}

impl Protocol {
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Methods exposed through public trampolines
    pub fn public_methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter().filter(|m| !m.is_implicit)
    }

    /// Whether `ty` denotes a pointer to an instance of this protocol
    pub fn is_instance_pointer(&self, ty: &str) -> bool {
        let compact: String = ty.chars().filter(|c| !c.is_whitespace()).collect();
        compact
            .strip_suffix('*')
            .is_some_and(|base| base == self.name || base == format!("struct{}_s", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_synonyms() {
        assert_eq!(ImplKind::from_keyword("returns this"), Ok(ImplKind::ReturnsThis));
        assert_eq!(ImplKind::from_keyword("return this"), Ok(ImplKind::ReturnsThis));
        assert_eq!(ImplKind::from_keyword("visits parent"), Ok(ImplKind::VisitParent));
        assert_eq!(ImplKind::from_keyword("do nothing"), Ok(ImplKind::DoesNothing));
    }

    #[test]
    fn test_keyword_case_and_spacing() {
        assert_eq!(ImplKind::from_keyword("Returns  0"), Ok(ImplKind::ReturnsZero));
        assert_eq!(ImplKind::from_keyword(" visit_parent "), Ok(ImplKind::VisitParent));
        assert_eq!(ImplKind::from_keyword("DOES-NOTHING"), Ok(ImplKind::DoesNothing));
    }

    #[test]
    fn test_integer_types() {
        for ty in ["long", "int", "unsigned char", "long long", "unsigned  int", "uint32_t", "_Bool"] {
            assert!(is_integer_type(ty), "{}", ty);
        }
        for ty in ["double", "max_align_t", "void*", "", "signed unsigned", "struct s"] {
            assert!(!is_integer_type(ty), "{}", ty);
        }
    }

    #[test]
    fn test_graphviz_is_reserved() {
        assert_eq!(ImplKind::from_keyword("graphviz"), Err(KeywordError::Unsupported));
        assert_eq!(ImplKind::from_keyword("frobnicate"), Err(KeywordError::Unknown));
    }

    #[test]
    fn test_field_markers() {
        assert!(Field::padding("long").is_padding());
        assert!(!Field::padding("long").is_ctor_parameter());
        assert!(Field::new("_owner", "expr*").is_implicit());
        assert!(Field::new("value", "int").is_ctor_parameter());
    }

    #[test]
    fn test_instance_pointer_detection() {
        let protocol = Protocol {
            name: "expr".to_string(),
            header_path: None,
            impl_path: None,
            prologue: String::new(),
            definitions: String::new(),
            epilogue: String::new(),
            methods: Vec::new(),
            elements: Vec::new(),
        };
        assert!(protocol.is_instance_pointer("expr*"));
        assert!(protocol.is_instance_pointer("expr *"));
        assert!(protocol.is_instance_pointer("struct expr_s*"));
        assert!(!protocol.is_instance_pointer("expr**"));
        assert!(!protocol.is_instance_pointer("expr"));
        assert!(!protocol.is_instance_pointer("expression*"));
    }
}
