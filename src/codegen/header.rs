//! Header Emitter
//!
//! Declares everything a client needs: the protocol and context types, the
//! vtable shape, public trampolines and element constructors. Element
//! structs stay opaque; only their tags are declared.

use super::names::{declaration, WHERE_PARAMETER};
use super::writer::CWriter;
use super::{CodegenContext, ElementRegion};

/// Emit the complete header
pub fn emit_header(ctx: &CodegenContext<'_>) -> String {
    let names = ctx.names();
    let guard = names.include_guard(&ctx.config().guard_prefix);
    let mut w = CWriter::new();

    w.banner(ctx.input_name(), &ctx.config().tool_name);
    w.line(&format!("#ifndef {}", guard));
    w.line(&format!("#define {}", guard));
    w.blank();

    emit_forward_declarations(&mut w, ctx);
    w.blank();
    emit_context_type(&mut w, ctx);
    w.blank();

    if !ctx.protocol().definitions.is_empty() {
        w.verbatim(&ctx.protocol().definitions);
        w.blank();
    }

    emit_context_api(&mut w, ctx);
    w.blank();
    emit_vtable_type(&mut w, ctx);
    w.blank();
    emit_core_struct(&mut w, ctx);
    w.blank();

    for method in ctx.protocol().public_methods() {
        w.line(&format!(
            "{} {}({});",
            method.return_type,
            names.trampoline(method),
            names.parameters(method)
        ));
    }
    w.blank();

    for region in ctx.regions() {
        w.line(&format!("struct {};", names.element_tag(region.name())));
    }
    w.blank();

    for region in ctx.regions() {
        w.line(&format!("{};", constructor_signature(ctx, &region)));
    }
    w.blank();

    w.line(&format!("#endif /* {} */", guard));
    w.finish()
}

fn emit_forward_declarations(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    let names = ctx.names();
    w.line(&format!("struct {};", names.protocol_tag()));
    w.line(&format!(
        "typedef struct {} {};",
        names.protocol_tag(),
        names.protocol_type()
    ));
}

fn emit_context_type(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    let names = ctx.names();
    w.open(&format!("typedef struct {}", names.context_tag()));
    for member in ctx.layout().context_members() {
        w.line(&member);
    }
    w.close(&format!(" {};", names.context_type()));
}

/// The context type goes through a macro so a client can substitute a
/// larger struct whose leading members match.
fn emit_context_api(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    let names = ctx.names();
    let macro_name = names.context_macro();
    w.line(&format!("#ifndef {}", macro_name));
    w.line(&format!("#define {} {}", macro_name, names.context_type()));
    w.line("#endif");
    w.line(&format!("extern {}* {};", macro_name, names.context_global()));
    w.line(&format!("{}* {}(void);", macro_name, names.context_create()));
    w.line(&format!(
        "void {}({}* context);",
        names.context_destroy(),
        macro_name
    ));
}

fn emit_vtable_type(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    let names = ctx.names();
    w.open(&format!("struct {}", names.vtable_tag()));
    for (_, method) in ctx.methods() {
        w.line(&format!(
            "{} (*{})({});",
            method.return_type,
            method.name,
            names.parameters(method)
        ));
    }
    w.close(";");
}

fn emit_core_struct(w: &mut CWriter, ctx: &CodegenContext<'_>) {
    w.open(&format!("struct {}", ctx.names().protocol_tag()));
    for member in ctx.layout().core_members() {
        w.line(&format!("{};", declaration(&member)));
    }
    w.close(";");
}

/// `P* Element(LOC _where, params...)`
pub(super) fn constructor_signature(ctx: &CodegenContext<'_>, region: &ElementRegion<'_>) -> String {
    let mut params = vec![format!("{} {}", ctx.config().location_type, WHERE_PARAMETER)];
    params.extend(region.element.ctor_parameters().map(declaration));
    format!(
        "{}* {}({})",
        ctx.names().protocol_type(),
        region.name(),
        params.join(", ")
    )
}
