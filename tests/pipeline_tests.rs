//! End-to-end pipeline tests
//!
//! Each fixture goes through the public API: event source, builder,
//! resolver, synthesizer and the checked arena model.

use protogen::schema::YamlEventSource;
use protogen::{
    synthesize, Arena, ArenaError, CodegenConfig, DispatchTable, Error, ErrorClass, ImplKind,
    Linkage, Protocol, ProtocolBuilder, ResolveOptions, Slot,
};

fn build(text: &str) -> Result<Protocol, Error> {
    let mut events = YamlEventSource::from_str(text)?;
    ProtocolBuilder::default().build(&mut events)
}

fn resolve(text: &str) -> (Protocol, DispatchTable) {
    let protocol = build(text).unwrap();
    let table = DispatchTable::resolve(&protocol, ResolveOptions::default()).unwrap();
    (protocol, table)
}

fn binding(table: &DispatchTable, element: &str, method: &str) -> protogen::Binding {
    match table.slot(element, method) {
        Some(Slot::Bound(b)) => b.clone(),
        other => panic!("Expected {}.{} to be bound, got {:?}", element, method, other),
    }
}

// =============================================================================
// Resolution scenarios
// =============================================================================

#[test]
fn test_custom_override_and_generated_default() {
    let (_, table) = resolve(include_str!("fixtures/expr.yaml"));

    let lit = binding(&table, "Lit", "eval");
    assert_eq!(lit.implementor, "Lit");
    assert_eq!(lit.linkage, Linkage::External);
    assert_eq!(lit.kind, ImplKind::Custom);

    let neg = binding(&table, "Neg", "eval");
    assert_eq!(neg.implementor, "Neg");
    assert_eq!(neg.linkage, Linkage::Internal);
    assert_eq!(neg.kind, ImplKind::ReturnsZero);
}

#[test]
fn test_inherited_override_is_generated_once_under_ancestor() {
    let (_, table) = resolve(include_str!("fixtures/inherit.yaml"));

    let b = binding(&table, "B", "eval");
    assert_eq!(b.implementor, "A");
    assert_eq!(b.linkage, Linkage::Internal);
    assert_eq!(b.symbol, "A_eval");

    let eval = table.methods.iter().position(|m| m == "eval").unwrap();
    let owners: Vec<&str> = table
        .generated_bodies()
        .filter(|(_, m, b)| *m == eval && b.symbol == "A_eval")
        .map(|(e, _, _)| table.elements[e].element.as_str())
        .collect();
    assert_eq!(owners, vec!["A"]);
}

#[test]
fn test_later_ancestor_override_wins() {
    let (protocol, table) = resolve(include_str!("fixtures/inherit.yaml"));
    let d = binding(&table, "D", "eval");
    assert_eq!(d.implementor, "C");
    assert_eq!(d.kind, ImplKind::ReturnsOne);

    let members: Vec<&str> = protocol
        .element("D")
        .unwrap()
        .ctor_parameters()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(members, vec!["a1", "a2", "d1", "d2", "d3"]);
}

#[test]
fn test_shared_protocol_custom() {
    let (_, table) = resolve(include_str!("fixtures/inherit.yaml"));
    for element in ["A", "B", "C", "D"] {
        let dump = binding(&table, element, "dump");
        assert_eq!(dump.implementor, "expr");
        assert_eq!(dump.symbol, "expr_dump");
    }
}

#[test]
fn test_every_element_covers_every_method_in_order() {
    for text in [include_str!("fixtures/expr.yaml"), include_str!("fixtures/inherit.yaml")] {
        let (protocol, table) = resolve(text);
        let declared: Vec<&str> = protocol.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(table.methods, declared);
        for element in &protocol.elements {
            assert_eq!(element.implementations.len(), protocol.methods.len());
        }
        for row in &table.elements {
            assert_eq!(row.slots.len(), protocol.methods.len());
        }
    }
}

#[test]
fn test_resolution_is_reproducible() {
    let text = include_str!("fixtures/inherit.yaml");
    let (_, first) = resolve(text);
    let (_, second) = resolve(text);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

// =============================================================================
// Synthesis
// =============================================================================

#[test]
fn test_constructor_parameters_follow_declaration_order() {
    let (protocol, table) = resolve(include_str!("fixtures/inherit.yaml"));
    let output = synthesize(&protocol, &table, &CodegenConfig::default(), "inherit.yaml", "inherit.h").unwrap();
    assert!(output
        .header
        .contains("expr* D(YYLTYPE _where, int a1, int a2, expr* d1, expr* d2, int d3);"));
    assert!(output.implementation.contains(
        "  if (d1) {\n    assert(!d1->parent);\n    d1->parent = &_self->core;\n  }\n  if (d2) {\n"
    ));
}

#[test]
fn test_expr_document_end_to_end() {
    let (protocol, table) = resolve(include_str!("fixtures/expr.yaml"));
    let output = synthesize(&protocol, &table, &CodegenConfig::default(), "expr.yaml", "expr.h").unwrap();

    let h = &output.header;
    assert!(h.contains("typedef struct { int first_line, first_column; } YYLTYPE;"));
    assert!(h.contains("int eval(expr* this);"));
    assert!(h.contains("void print(expr* this, FILE* out);"));
    assert!(h.contains("expr* root(expr* this);"));

    let c = &output.implementation;
    assert!(c.contains("int Lit_eval(expr* this);\n"));
    assert!(c.contains("static int Neg_eval(expr* this) {\n  return (int)0;\n}\n"));
    assert!(c.contains("    return root(this->parent);\n"));
    assert!(c.contains("    print(_self->child, out);\n"));
    assert!(c.contains("  .eval = Lit_eval,\n"));
    assert!(c.contains("  .eval = Neg_eval,\n"));
    assert!(c.trim_end().ends_with('}'));
}

// =============================================================================
// Arena contract
// =============================================================================

#[test]
fn test_arena_enforces_single_parent() {
    let (protocol, table) = resolve(include_str!("fixtures/expr.yaml"));
    let mut arena = Arena::new(&protocol, &table);

    let lit = arena.construct("Lit", &[]).unwrap();
    let neg = arena.construct("Neg", &[Some(lit)]).unwrap();
    assert_eq!(arena.parent(lit).unwrap(), Some(neg));

    let err = arena.construct("Neg", &[Some(lit)]).unwrap_err();
    assert!(matches!(err, ArenaError::AlreadyParented { .. }));

    let outer = arena.construct("Neg", &[Some(neg)]).unwrap();
    assert_eq!(arena.parent(neg).unwrap(), Some(outer));
}

#[test]
fn test_arena_teardown_visits_every_instance() {
    let (protocol, table) = resolve(include_str!("fixtures/expr.yaml"));
    let mut arena = Arena::new(&protocol, &table);
    let lit = arena.construct("Lit", &[]).unwrap();
    arena.construct("Neg", &[Some(lit)]).unwrap();
    arena.construct("Lit", &[]).unwrap();

    let mut finalized = Vec::new();
    let count = arena.teardown(|_: protogen::InstanceId, element: &str, _: &Slot| {
        finalized.push(element.to_string());
    });
    assert_eq!(count, 3);
    assert_eq!(finalized, vec!["Lit", "Neg", "Lit"]);
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_out_of_order_extends_is_positioned() {
    let err = build(include_str!("fixtures/bad_extends.yaml")).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Data);
    let mark = err.mark().unwrap();
    assert_eq!((mark.line, mark.column), (12, 2));
    assert!(err.to_string().starts_with("12:2: "));
}

#[test]
fn test_self_and_forward_extension_rejected() {
    let head = "configuration:\n  protocol_name: p\nprotocol:\n";
    assert!(matches!(
        build(&format!("{}A:\n  extends: [A]\n", head)),
        Err(Error::SelfExtension { .. })
    ));
    assert!(matches!(
        build(&format!("{}A:\n  extends: [B]\nB:\n", head)),
        Err(Error::NoSuchElement { .. })
    ));
}

#[test]
fn test_yaml_syntax_error_is_data_error() {
    let err = build("protocol: [unclosed\n").unwrap_err();
    assert!(matches!(err, Error::Syntax { .. }), "{:?}", err);
    assert_eq!(err.class(), ErrorClass::Data);
}
