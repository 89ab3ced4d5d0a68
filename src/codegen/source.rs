//! Implementation Emitter
//!
//! Emits, in order: standard includes, the user prologue, the generated
//! header include, the context global, element structs, prototypes, the
//! unimplemented handler, vtable values, trampolines, generated method
//! bodies, constructors, the context lifecycle and the user epilogue.

use crate::arena::ContextLayout;
use crate::model::{ImplKind, Method};
use crate::resolve::{Binding, Linkage, Slot};

use super::header::constructor_signature;
use super::names::{declaration, CORE_MEMBER, RECEIVER, SELF_LOCAL, WHERE_PARAMETER, ZERO_LOCAL};
use super::writer::CWriter;
use super::{CodegenContext, ElementRegion};

const SYSTEM_INCLUDES: &[&str] = &["assert.h", "stdio.h", "stdlib.h", "string.h"];

/// Emit the complete implementation file
pub fn emit_source(ctx: &CodegenContext<'_>) -> String {
    let mut w = CWriter::new();

    w.banner(ctx.input_name(), &ctx.config().tool_name);
    for include in SYSTEM_INCLUDES {
        w.line(&format!("#include <{}>", include));
    }
    w.blank();
    if !ctx.protocol().prologue.is_empty() {
        w.verbatim(&ctx.protocol().prologue);
        w.blank();
    }
    w.line(&format!("#include \"{}\"", ctx.header_include()));
    w.blank();

    let names = ctx.names();
    w.line(&format!(
        "{}* {};",
        names.context_macro(),
        names.context_global()
    ));
    w.blank();

    for region in ctx.regions() {
        emit_element_struct(&mut w, ctx, &region);
        w.blank();
    }

    emit_prototypes(&mut w, ctx);
    w.blank();
    emit_unimplemented_handler(&mut w, ctx);
    w.blank();

    for region in ctx.regions() {
        emit_vtable_value(&mut w, ctx, &region);
        w.blank();
    }

    for (_, method) in ctx.methods() {
        emit_trampoline(&mut w, ctx, method);
        w.blank();
    }

    let methods = &ctx.protocol().methods;
    for region in ctx.regions() {
        for (method, slot) in methods.iter().zip(&region.dispatch.slots) {
            if let Slot::Bound(binding) = slot {
                if binding.is_generated_by(region.name()) {
                    emit_body(&mut w, ctx, &region, method, binding);
                    w.blank();
                }
            }
        }
    }

    for region in ctx.regions() {
        emit_constructor(&mut w, ctx, &region);
        w.blank();
    }

    emit_context_lifecycle(&mut w, ctx);

    if !ctx.protocol().epilogue.is_empty() {
        w.blank();
        w.verbatim(&ctx.protocol().epilogue);
    }
    w.finish()
}

// =============================================================================
// Declarations
// =============================================================================

fn emit_element_struct(w: &mut CWriter, ctx: &CodegenContext<'_>, region: &ElementRegion<'_>) {
    w.open(&format!("struct {}", ctx.names().element_tag(region.name())));
    w.line(&format!("{} {};", ctx.names().protocol_type(), CORE_MEMBER));
    for member in &region.element.members {
        w.line(&format!("{};", declaration(member)));
    }
    w.close(";");
}

fn function_signature(ctx: &CodegenContext<'_>, method: &Method, name: &str) -> String {
    format!(
        "{} {}({})",
        method.return_type,
        name,
        ctx.names().parameters(method)
    )
}

/// Generated bodies and implicit trampolines are internal; custom functions
/// are declared for the client to define.
fn emit_prototypes(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    let methods = &ctx.protocol().methods;

    for (_, method) in ctx.methods().filter(|(_, m)| m.is_implicit) {
        w.line(&format!(
            "static {};",
            function_signature(ctx, method, &ctx.names().trampoline(method))
        ));
    }
    for (_, m, binding) in ctx.table().generated_bodies() {
        w.line(&format!(
            "static {};",
            function_signature(ctx, &methods[m], &binding.symbol)
        ));
    }
    for (m, symbol) in ctx.table().external_symbols() {
        w.line(&format!("{};", function_signature(ctx, &methods[m], symbol)));
    }
}

fn emit_unimplemented_handler(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    let names = ctx.names();
    let context = names.context_global();
    w.open(&format!(
        "static void {}(const {}* {}, const char* method)",
        names.unimplemented_handler(),
        names.protocol_type(),
        RECEIVER
    ));
    w.open(&format!(
        "if ({} && {}->{})",
        context,
        context,
        ContextLayout::UNIMPLEMENTED
    ));
    w.line(&format!(
        "{}->{}({}, method);",
        context,
        ContextLayout::UNIMPLEMENTED,
        RECEIVER
    ));
    w.else_block();
    w.line("fprintf(stderr, \"%s: method not implemented\\n\", method);");
    w.close("");
    w.line("abort();");
    w.close("");
}

fn emit_vtable_value(w: &mut CWriter, ctx: &CodegenContext<'_>, region: &ElementRegion<'_>) {
    w.open(&format!(
        "static const struct {} {} =",
        ctx.names().vtable_tag(),
        ctx.names().vtable_value(region.name())
    ));
    for (method, slot) in ctx.table().methods.iter().zip(&region.dispatch.slots) {
        let value = match slot {
            Slot::Undefined => "NULL",
            Slot::Bound(binding) => binding.symbol.as_str(),
        };
        w.line(&format!(".{} = {},", method, value));
    }
    w.close(";");
}

// =============================================================================
// Dispatch
// =============================================================================

/// Null slots go to the unimplemented handler, which does not return
fn emit_trampoline(w: &mut CWriter, ctx: &CodegenContext<'_>, method: &Method) {
    let names = ctx.names();
    let name = names.trampoline(method);
    let signature = function_signature(ctx, method, &name);

    if method.is_implicit {
        w.open(&format!("static {}", signature));
    } else {
        w.open(&signature);
    }

    let slot = format!("{}->{}->{}", RECEIVER, ContextLayout::VTABLE, method.name);
    w.open(&format!("if (!{})", slot));
    w.line(&format!(
        "{}({}, \"{}\");",
        names.unimplemented_handler(),
        RECEIVER,
        method.name
    ));
    w.close("");

    let call = format!("{}({})", slot, names.arguments(RECEIVER, method));
    if method.returns_void() {
        w.line(&format!("{};", call));
    } else {
        w.line(&format!("return {};", call));
    }
    w.close("");
}

// =============================================================================
// Generated bodies
// =============================================================================

fn emit_body(
    w: &mut CWriter,
    ctx: &CodegenContext<'_>,
    region: &ElementRegion<'_>,
    method: &Method,
    binding: &Binding,
) {
    debug_assert_eq!(binding.linkage, Linkage::Internal);
    w.open(&format!(
        "static {}",
        function_signature(ctx, method, &binding.symbol)
    ));

    match binding.kind {
        ImplKind::Recursive => emit_recursive(w, ctx, region, method),
        ImplKind::VisitParent => emit_visit_parent(w, ctx, method),
        ImplKind::ReturnsZero => emit_constant(w, method, "0"),
        ImplKind::ReturnsOne => emit_constant(w, method, "1"),
        ImplKind::ReturnsThis => emit_constant(w, method, RECEIVER),
        ImplKind::DoesNothing => emit_zero_return(w, method),
        ImplKind::Undefined | ImplKind::Custom => {}
    }

    w.close("");
}

/// Forward the call to every member pointing at a protocol instance
fn emit_recursive(
    w: &mut CWriter,
    ctx: &CodegenContext<'_>,
    region: &ElementRegion<'_>,
    method: &Method,
) {
    let children: Vec<_> = region.instance_members().collect();
    if !children.is_empty() {
        let tag = ctx.names().element_tag(region.name());
        w.line(&format!(
            "struct {}* {} = (struct {}*){};",
            tag, SELF_LOCAL, tag, RECEIVER
        ));
    }
    let trampoline = ctx.names().trampoline(method);
    for child in children {
        let target = format!("{}->{}", SELF_LOCAL, child.name);
        w.open(&format!("if ({})", target));
        w.line(&format!(
            "{}({});",
            trampoline,
            ctx.names().arguments(&target, method)
        ));
        w.close("");
    }
    emit_zero_return(w, method);
}

fn emit_visit_parent(w: &mut CWriter, ctx: &CodegenContext<'_>, method: &Method) {
    let parent = format!("{}->{}", RECEIVER, ContextLayout::PARENT);
    let call = format!(
        "{}({})",
        ctx.names().trampoline(method),
        ctx.names().arguments(&parent, method)
    );
    w.open(&format!("if ({})", parent));
    if method.returns_void() {
        w.line(&format!("{};", call));
    } else {
        w.line(&format!("return {};", call));
    }
    w.close("");
    emit_zero_return(w, method);
}

fn emit_constant(w: &mut CWriter, method: &Method, value: &str) {
    w.line(&format!("return ({}){};", method.return_type, value));
}

/// Non-void methods return a zero-filled value of their return type
fn emit_zero_return(w: &mut CWriter, method: &Method) {
    if method.returns_void() {
        return;
    }
    w.line(&format!("{} {};", method.return_type, ZERO_LOCAL));
    w.line(&format!(
        "memset(&{}, 0, sizeof({}));",
        ZERO_LOCAL, ZERO_LOCAL
    ));
    w.line(&format!("return {};", ZERO_LOCAL));
}

// =============================================================================
// Construction and teardown
// =============================================================================

fn emit_constructor(w: &mut CWriter, ctx: &CodegenContext<'_>, region: &ElementRegion<'_>) {
    let names = ctx.names();
    let context = names.context_global();
    let tag = names.element_tag(region.name());
    let core = format!("&{}->{}", SELF_LOCAL, CORE_MEMBER);

    w.open(&constructor_signature(ctx, region));
    w.line(&format!(
        "struct {}* {} = malloc(sizeof(struct {}));",
        tag, SELF_LOCAL, tag
    ));
    w.open(&format!("if (!{})", SELF_LOCAL));
    w.open(&format!("if ({}->{})", context, ContextLayout::OOM));
    w.line(&format!("{}->{}();", context, ContextLayout::OOM));
    w.close("");
    w.line("abort();");
    w.close("");
    w.line(&format!(
        "memset({}, 0, sizeof(struct {}));",
        SELF_LOCAL, tag
    ));
    w.line(&format!(
        "{}->{}.{} = &{};",
        SELF_LOCAL,
        CORE_MEMBER,
        ContextLayout::VTABLE,
        names.vtable_value(region.name())
    ));
    w.line(&format!(
        "{}->{}.{} = {};",
        SELF_LOCAL,
        CORE_MEMBER,
        ContextLayout::WHERE,
        WHERE_PARAMETER
    ));

    for member in region.element.ctor_parameters() {
        w.line(&format!("{}->{} = {};", SELF_LOCAL, member.name, member.name));
    }

    for child in region.child_parameters() {
        w.open(&format!("if ({})", child.name));
        w.line(&format!("assert(!{}->{});", child.name, ContextLayout::PARENT));
        w.line(&format!("{}->{} = {};", child.name, ContextLayout::PARENT, core));
        w.close("");
    }

    w.open(&format!("if ({}->{})", context, ContextLayout::LAST));
    w.line(&format!(
        "{}->{}->{} = {};",
        context,
        ContextLayout::LAST,
        ContextLayout::GC_NEXT,
        core
    ));
    w.else_block();
    w.line(&format!("{}->{} = {};", context, ContextLayout::FIRST, core));
    w.close("");
    w.line(&format!("{}->{} = {};", context, ContextLayout::LAST, core));
    w.line(&format!("return {};", core));
    w.close("");
}

/// Creation zero-fills the context; destruction finalizes every live
/// instance in chain order before releasing any of them.
fn emit_context_lifecycle(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    let names = ctx.names();
    let macro_name = names.context_macro();
    let protocol = names.protocol_type();

    w.open(&format!("{}* {}(void)", macro_name, names.context_create()));
    w.line(&format!("return calloc(1, sizeof({}));", macro_name));
    w.close("");
    w.blank();

    w.open(&format!(
        "void {}({}* context)",
        names.context_destroy(),
        macro_name
    ));
    w.line(&format!("{}* current;", protocol));
    w.line(&format!("{}* next;", protocol));
    let walk = format!(
        "for (current = context->{}; current; current = next)",
        ContextLayout::FIRST
    );

    if let Some(finalizer) = ctx.finalizer() {
        w.open(&walk);
        w.line(&format!("next = current->{};", ContextLayout::GC_NEXT));
        w.open(&format!(
            "if (current->{}->{})",
            ContextLayout::VTABLE,
            finalizer.name
        ));
        w.line(&format!("{}(current);", names.trampoline(finalizer)));
        w.close("");
        w.close("");
    }

    w.open(&walk);
    w.line(&format!("next = current->{};", ContextLayout::GC_NEXT));
    w.line("free(current);");
    w.close("");

    let global = names.context_global();
    w.open(&format!("if ({} == context)", global));
    w.line(&format!("{} = NULL;", global));
    w.close("");
    w.line("free(context);");
    w.close("");
}
