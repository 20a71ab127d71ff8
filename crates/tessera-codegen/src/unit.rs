//! Assembly of the generated source: preamble, the unit type, render
//! routines and the trailing constants.

use tessera_runtime::Charset;

use crate::context::{Accumulator, Frame, SkipStyle};
use crate::error::CodegenError;
use crate::fragments::emit_helper;
use crate::names::{mangle, quote, quote_bytes, unit_type_name};
use crate::node::{Node, ParamType};
use crate::page::{PageInfo, TagDefinition, UnitKind};
use crate::tags::register_pools;
use crate::visit::{collect_declarations, visit_nodes};
use crate::writer::SourceWriter;

const ALLOWS: &str = "#![allow(unused_mut, unused_variables, unused_imports, unused_parens, \
                      unused_assignments, non_snake_case, clippy::all)]";

/// Sample text the response charset must be able to encode before literals
/// are pre-encoded.
const ENCODING_SAMPLE: &str = "testing";

const SERVICE: &str = r#"let mut ctx = PageContext::acquire(exchange, SETTINGS)?;
let routed = match render(&mut ctx) {
    Err(err) if !err.is_skip_page() => {
        ctx.clear_page_buffer();
        ctx.handle_page_exception(err)
    }
    _ => Ok(()),
};
let response = ctx.release();
routed.map(|()| response)"#;

const DO_TAG: &str = r#"fn do_tag(&self, ctx: &mut PageContext) -> Result<(), RenderError> {
    let invoking = ctx.enter_tag_scope();
    let result = self.expose(ctx).and_then(|()| render(ctx));
    ctx.sync_to_invoking(invoking, SYNC_AT_END);
    ctx.exit_tag_scope(invoking);
    result.map_err(|err| match err {
        RenderError::SkipPage | RenderError::Io(_) | RenderError::State(_) => err,
        other => RenderError::wrap_tag(other),
    })
}"#;

/// Charset literals are pre-encoded with, when the page qualifies.
fn byte_encoding(page: &PageInfo, acc: &Accumulator<'_>) -> Option<Charset> {
    let buffer_size = page.buffer_size.unwrap_or(acc.options.default_buffer_size);
    if !acc.options.gen_string_as_byte_array || buffer_size != 0 || page.is_tag_definition() {
        return None;
    }
    Charset::from_content_type(&page.content_type)
        .filter(|charset| charset.can_encode(ENCODING_SAMPLE))
}

fn string_list(items: &[impl AsRef<str>]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| quote(item.as_ref())).collect();
    format!("&[{}]", quoted.join(", "))
}

pub(crate) fn generate_unit(
    root: &[Node],
    page: &PageInfo,
    acc: &mut Accumulator<'_>,
) -> Result<String, CodegenError> {
    register_pools(root, acc);
    let encoding = byte_encoding(page, acc);

    let mut body = SourceWriter::with_indent(1);
    let tag_definition = match &page.kind {
        UnitKind::TagDefinition(def) => Some(def),
        UnitKind::Page => None,
    };
    let frame = match tag_definition {
        Some(_) => Frame::top(SkipStyle::Raise, false),
        None => Frame::top(SkipStyle::Flag, encoding.is_some()),
    };
    if page.is_error_page {
        body.line("let exception = ctx.get_exception();");
        body.line("if exception.is_some() { ctx.set_status(500); }");
    }
    visit_nodes(root, &frame, acc, &mut body)?;
    body.line(match tag_definition {
        Some(_) => "Ok(())",
        None => "Ok(false)",
    });

    let mut out = SourceWriter::default();
    emit_preamble(root, page, encoding, acc, &mut out);
    match tag_definition {
        Some(def) => emit_tag_handler(page, def, &mut out)?,
        None => emit_page_unit(page, acc, &mut out),
    }

    out.blank();
    out.line(match tag_definition {
        Some(_) => "fn render(ctx: &mut PageContext) -> Result<(), RenderError> {",
        None => "fn render(ctx: &mut PageContext) -> Result<bool, RenderError> {",
    });
    let mut text = out.finish();
    text.push_str(&body.finish());
    text.push_str("}\n");

    for method in &acc.methods {
        text.push('\n');
        text.push_str(method);
    }
    let helper = emit_helper(acc);
    if !helper.is_empty() {
        text.push('\n');
        text.push_str(&helper);
    }
    if let Some(charset) = encoding
        && !acc.texts.is_empty()
    {
        text.push('\n');
        for (literal, n) in &acc.texts {
            text.push_str(&format!("const TEXT_{n}: &str = {};\n", quote(literal)));
            text.push_str(&format!(
                "const TEXT_{n}_BYTES: &[u8] = {};\n",
                quote_bytes(&charset.encode(literal))
            ));
        }
    }
    Ok(text)
}

fn emit_preamble(
    root: &[Node],
    page: &PageInfo,
    encoding: Option<Charset>,
    acc: &Accumulator<'_>,
    out: &mut SourceWriter,
) {
    let source = page.source_path.as_deref().unwrap_or(&page.unit_name);
    out.line(&format!("// Generated by tessera-codegen from {source}. Do not edit."));
    out.line(ALLOWS);
    out.blank();
    out.line(&format!("use {}::prelude::*;", acc.options.runtime_crate));
    for import in &page.imports {
        out.line(&format!("use {import};"));
    }

    let mut declarations = Vec::new();
    collect_declarations(root, &mut declarations);
    for code in declarations {
        out.blank();
        out.verbatim(code);
    }

    out.blank();
    out.line(&format!(
        "static DEPENDANTS: &[&str] = {};",
        string_list(&page.dependants)
    ));
    if let Some(charset) = encoding {
        out.line(&format!("const ENCODING: &str = {};", quote(charset.label())));
    }

    if let UnitKind::TagDefinition(def) = &page.kind {
        out.line(&format!(
            "const SYNC_BEFORE_INVOKE: &[&str] = {};",
            string_list(&def.names_synced_before_invoke())
        ));
        out.line(&format!(
            "const SYNC_AT_END: &[&str] = {};",
            string_list(&def.names_synced_at_end())
        ));
    } else {
        emit_settings(page, acc, out);
    }

    if !acc.pools.is_empty() {
        emit_pools(acc, out);
    }
}

fn emit_settings(page: &PageInfo, acc: &Accumulator<'_>, out: &mut SourceWriter) {
    let buffer_size = page.buffer_size.unwrap_or(acc.options.default_buffer_size);
    let error_page = match &page.error_page {
        Some(path) => format!("Some({})", quote(path)),
        None => "None".into(),
    };
    let powered_by = if acc.options.x_powered_by {
        format!("Some({})", quote(concat!("tessera/", env!("CARGO_PKG_VERSION"))))
    } else {
        "None".into()
    };
    out.blank();
    out.open("const SETTINGS: PageSettings = {");
    out.line(&format!(
        "let mut settings = PageSettings::new({});",
        quote(&page.unit_name)
    ));
    out.line(&format!("settings.content_type = {};", quote(&page.content_type)));
    out.line(&format!("settings.error_page = {error_page};"));
    out.line(&format!("settings.needs_session = {};", page.session));
    out.line(&format!("settings.buffer_size = {buffer_size};"));
    out.line(&format!("settings.auto_flush = {};", page.auto_flush));
    out.line(&format!("settings.powered_by = {powered_by};"));
    out.line("settings");
    out.close("};");
}

fn emit_pools(acc: &Accumulator<'_>, out: &mut SourceWriter) {
    out.blank();
    out.open("struct TagPools {");
    for name in acc.pools.names() {
        out.line(&format!("{name}: Arc<TagHandlerPool>,"));
    }
    out.close("}");
    out.blank();
    out.open("fn tag_pools() -> &'static TagPools {");
    out.line("static POOLS: OnceLock<TagPools> = OnceLock::new();");
    out.open("POOLS.get_or_init(|| TagPools {");
    for (signature, name) in acc.pools.entries() {
        out.line(&format!(
            "{name}: TagPoolRegistry::global().pool::<{}>({}, {}),",
            signature.handler(),
            quote(&signature.key()),
            acc.options.tag_pool_size
        ));
    }
    out.close("})");
    out.close("}");
}

fn emit_page_unit(page: &PageInfo, acc: &Accumulator<'_>, out: &mut SourceWriter) {
    let ty = unit_type_name(&page.unit_name);
    out.blank();
    if !page.thread_safe {
        out.line("static SERIAL: parking_lot::Mutex<()> = parking_lot::const_mutex(());");
        out.blank();
    }
    out.line("#[derive(Debug, Default)]");
    out.line(&format!("pub struct {ty};"));
    out.blank();
    out.open(&format!("impl Unit for {ty} {{"));
    out.open("fn service(&self, exchange: Exchange) -> Result<Response, RenderError> {");
    if !page.thread_safe {
        out.line("let _serial = SERIAL.lock();");
    }
    out.verbatim(SERVICE);
    out.close("}");
    if let Some(info) = &page.info {
        out.blank();
        out.open("fn info(&self) -> &str {");
        out.line(&quote(info));
        out.close("}");
    }
    out.blank();
    out.open("fn dependants(&self) -> &'static [&'static str] {");
    out.line("DEPENDANTS");
    out.close("}");
    if !acc.pools.is_empty() {
        out.blank();
        out.open("fn destroy(&self) {");
        out.line("let pools = tag_pools();");
        for name in acc.pools.names() {
            out.line(&format!("pools.{name}.release_all();"));
        }
        out.close("}");
    }
    out.close("}");
}

/// How a declared attribute is exposed in the definition's page scope.
fn exposed_value(ty: &ParamType) -> &'static str {
    match ty {
        ParamType::Enum(_) | ParamType::Other(_) => "Value::object(value)",
        _ => "Value::from(value)",
    }
}

fn emit_tag_handler(
    page: &PageInfo,
    def: &TagDefinition,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let ty = unit_type_name(&page.unit_name);
    let mut fields = Vec::new();
    for attr in &def.attributes {
        let field = mangle(&attr.name);
        if field == "support" || field == "dynamic" {
            return Err(CodegenError::Internal(format!(
                "attribute `{}` clashes with a handler field",
                attr.name
            )));
        }
        fields.push((attr, field));
    }

    out.blank();
    out.line("#[derive(Default)]");
    out.open(&format!("pub struct {ty} {{"));
    out.line("support: SimpleTagSupport,");
    for (attr, field) in &fields {
        out.line(&format!(
            "{field}: parking_lot::Mutex<Option<{}>>,",
            attr.param_type.rust_type()
        ));
    }
    if def.dynamic_attributes.is_some() {
        out.line("dynamic: parking_lot::Mutex<IndexMap<String, Value>>,");
    }
    out.close("}");

    out.blank();
    out.open(&format!("impl {ty} {{"));
    out.open("pub fn dependants() -> &'static [&'static str] {");
    out.line("DEPENDANTS");
    out.close("}");
    for (attr, field) in &fields {
        out.blank();
        out.open(&format!(
            "pub fn set_{field}(&self, value: {}) {{",
            attr.param_type.rust_type()
        ));
        out.line(&format!("*self.{field}.lock() = Some(value);"));
        out.close("}");
    }
    out.blank();
    out.open("fn expose(&self, ctx: &mut PageContext) -> Result<(), RenderError> {");
    for (attr, field) in &fields {
        out.open(&format!("if let Some(value) = self.{field}.lock().clone() {{"));
        out.line(&format!(
            "ctx.set_attribute({}, {})?;",
            quote(&attr.name),
            exposed_value(&attr.param_type)
        ));
        out.close("}");
    }
    out.open("if let Some(body) = self.support.body() {");
    out.line("ctx.set_attribute(attrs::TAG_BODY, Value::from(body))?;");
    out.close("}");
    if let Some(map) = &def.dynamic_attributes {
        out.line("let dynamic = self.dynamic.lock().clone();");
        out.line(&format!("ctx.set_attribute({}, Value::Map(dynamic))?;", quote(map)));
    }
    out.line("Ok(())");
    out.close("}");
    out.close("}");

    out.blank();
    out.open(&format!("impl JspTag for {ty} {{"));
    out.open("fn parent(&self) -> Option<TagRef> {");
    out.line("self.support.parent()");
    out.close("}");
    out.close("}");

    out.blank();
    out.open(&format!("impl SimpleTag for {ty} {{"));
    out.open("fn set_parent(&self, parent: Option<TagRef>) {");
    out.line("self.support.set_parent(parent);");
    out.close("}");
    out.blank();
    out.open("fn set_body(&self, body: Fragment) {");
    out.line("self.support.set_body(body);");
    out.close("}");
    out.blank();
    out.verbatim(DO_TAG);
    out.close("}");

    if def.dynamic_attributes.is_some() {
        out.blank();
        out.open(&format!("impl DynamicAttributes for {ty} {{"));
        out.open(
            "fn set_dynamic_attribute(&self, uri: Option<&str>, name: &str, value: Value) \
             -> Result<(), RenderError> {",
        );
        out.open("if uri.is_none() {");
        out.line("self.dynamic.lock().insert(name.to_string(), value);");
        out.close("}");
        out.line("Ok(())");
        out.close("}");
        out.close("}");
    }
    Ok(())
}
