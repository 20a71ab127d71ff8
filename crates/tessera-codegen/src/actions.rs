//! Standard actions: include, forward, beans, plugin markup, uninterpreted
//! markup, element constructors and the fragment invocations of tag
//! definitions.

use crate::attributes::{Target, named_attribute_text, named_child, value_expr};
use crate::context::{Accumulator, Frame};
use crate::error::CodegenError;
use crate::names::{mangle, quote};
use crate::node::{AttrValue, MarkupAttribute, Node, NodeKind, ParamType, PlugIn, ScopeName};
use crate::visit::visit_nodes;
use crate::writer::SourceWriter;

fn write_text(text: &str, out: &mut SourceWriter) {
    out.line(&format!("ctx.out().write_str({})?;", quote(text)));
}

fn write_var(var: &str, out: &mut SourceWriter) {
    out.line(&format!("ctx.out().write_str(&{var})?;"));
}

/// A `String` expression for an attribute whose target is text.
fn text_expr(
    value: &AttrValue,
    owner: &Node,
    attribute: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<String, CodegenError> {
    match value {
        AttrValue::Runtime(code) => Ok(format!("({code}).to_string()")),
        other => value_expr(other, owner, Target::text(attribute), None, frame, acc, out),
    }
}

/// Binds a text attribute to a fresh local so later output calls can
/// borrow the context.
fn bind_text(
    value: &AttrValue,
    owner: &Node,
    attribute: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<String, CodegenError> {
    let expr = text_expr(value, owner, attribute, frame, acc, out)?;
    let var = acc.temp_var("s");
    out.line(&format!("let {var} = {expr};"));
    Ok(var)
}

/// The children holding an action's parameters, looking through an
/// explicit body element.
fn param_container(node: &Node) -> &[Node] {
    node.children
        .iter()
        .find(|child| matches!(child.kind, NodeKind::JspBody))
        .map_or(node.children.as_slice(), |body| body.children.as_slice())
}

/// Evaluates every `Param` child into `(name, local)` pairs.
fn prepare_params(
    params: &[Node],
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<Vec<(String, String)>, CodegenError> {
    let mut prepared = Vec::new();
    for param in params {
        if let NodeKind::Param { name, value } = &param.kind {
            let var = bind_text(value, param, "value", frame, acc, out)?;
            prepared.push((name.clone(), var));
        }
    }
    Ok(prepared)
}

fn target_url(
    node: &Node,
    page: &AttrValue,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<String, CodegenError> {
    let page = text_expr(page, node, "page", frame, acc, out)?;
    let params = prepare_params(param_container(node), frame, acc, out)?;
    let url = acc.temp_var("url");
    if params.is_empty() {
        out.line(&format!("let {url}: String = {page};"));
    } else {
        let pairs = params
            .iter()
            .map(|(name, var)| format!("({}, {var})", quote(name)))
            .collect::<Vec<_>>()
            .join(", ");
        out.line(&format!("let {url} = url_with_params(&{page}, &[{pairs}]);"));
    }
    Ok(url)
}

pub(crate) fn visit_include(
    node: &Node,
    page: &AttrValue,
    flush: bool,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let url = target_url(node, page, frame, acc, out)?;
    out.line(&format!("ctx.include(&{url}, {flush})?;"));
    Ok(())
}

pub(crate) fn visit_forward(
    node: &Node,
    page: &AttrValue,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let url = target_url(node, page, frame, acc, out)?;
    // `if true` hides the early return from the unreachable-code lint.
    out.open("if true {");
    out.line(&format!("ctx.forward(&{url})?;"));
    out.line(frame.skip_stmt());
    out.close("}");
    Ok(())
}

pub(crate) struct UseBean<'a> {
    pub id: &'a str,
    pub scope: ScopeName,
    pub class: Option<&'a str>,
    pub bean_name: Option<&'a AttrValue>,
    pub type_name: Option<&'a str>,
    pub class_instantiable: bool,
}

pub(crate) fn visit_use_bean(
    node: &Node,
    bean: UseBean<'_>,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let source = match (bean.bean_name, bean.class) {
        (Some(AttrValue::Literal(name)), _) => format!("BeanSource::Named({})", quote(name)),
        (Some(_), _) => {
            return Err(CodegenError::malformed(
                &node.position,
                node.kind.name(),
                "beanName must be a literal",
            ));
        }
        (None, Some(class)) if bean.class_instantiable => {
            format!("BeanSource::Factory(|| shared_bean({class}::default()))")
        }
        (None, Some(class)) if acc.options.error_on_use_bean_invalid_class_attribute => {
            return Err(CodegenError::malformed(
                &node.position,
                node.kind.name(),
                format!("class `{class}` cannot be instantiated"),
            ));
        }
        (None, _) => "BeanSource::Absent".to_string(),
    };
    if let Some(ty) = bean.type_name.or(bean.class) {
        acc.beans.insert(bean.id.to_string(), ty.to_string());
    }

    let created = acc.temp_var("created");
    out.line(&format!(
        "let ({}, {created}) = ctx.use_bean({}, {}, {source})?;",
        mangle(bean.id),
        quote(bean.id),
        bean.scope.rust_path()
    ));
    if node.has_body_children() {
        out.open(&format!("if {created} {{"));
        visit_nodes(node.body_children(), frame, acc, out)?;
        out.close("}");
    }
    Ok(())
}

pub(crate) struct SetProperty<'a> {
    pub name: &'a str,
    pub property: &'a str,
    pub param: Option<&'a str>,
    pub value: Option<&'a AttrValue>,
    pub setter: Option<&'a str>,
}

pub(crate) fn visit_set_property(
    node: &Node,
    set: SetProperty<'_>,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let property = quote(set.property);
    out.open("{");
    out.line(&format!("let _bean = find_bean(ctx, {})?;", quote(set.name)));
    if set.property == "*" {
        out.line("introspect(ctx, &_bean)?;");
        out.close("}");
        return Ok(());
    }
    match (set.value, set.param) {
        (Some(AttrValue::Literal(text)), _) => out.line(&format!(
            "introspect_helper(&_bean, {property}, Some(Value::from({})), None, false)?;",
            quote(text)
        )),
        (Some(AttrValue::Runtime(code)), _) => {
            let typed = acc.beans.get(set.name).zip(set.setter);
            match typed {
                Some((ty, setter)) => out.line(&format!(
                    "with_bean::<{ty}, _>(&_bean, |b| b.{setter}(({code})))?;"
                )),
                None => out.line(&format!(
                    "handle_set_property(&_bean, {property}, ({code}))?;"
                )),
            }
        }
        (Some(AttrValue::El(expression)), _) => {
            out.line(&format!(
                "let _v = ctx.evaluate({}, ExpectedType::Any)?;",
                quote(expression)
            ));
            out.line(&format!("handle_set_property(&_bean, {property}, _v)?;"));
        }
        (Some(AttrValue::Named), _) => {
            let named = named_child(node, "value")?;
            let var = named_attribute_text(named, frame, acc, out)?;
            out.line(&format!(
                "introspect_helper(&_bean, {property}, Some(Value::from({var})), None, false)?;"
            ));
        }
        (None, param) => out.line(&format!(
            "set_property_from_param(ctx, &_bean, {property}, {})?;",
            quote(param.unwrap_or(set.property))
        )),
    }
    out.close("}");
    Ok(())
}

pub(crate) fn visit_get_property(
    name: &str,
    property: &str,
    getter: Option<&str>,
    acc: &Accumulator<'_>,
    out: &mut SourceWriter,
) {
    out.open("{");
    match acc.beans.get(name).zip(getter) {
        Some((ty, getter)) => {
            out.line(&format!("let _bean = find_bean(ctx, {})?;", quote(name)));
            out.line(&format!("let _v = with_bean::<{ty}, _>(&_bean, |b| b.{getter}())?;"));
            out.line("ctx.out().print(&_v)?;");
        }
        None => {
            out.line(&format!(
                "let _v = handle_get_property(ctx, {}, {})?;",
                quote(name),
                quote(property)
            ));
            out.line("ctx.out().write_str(&to_output_string(&_v))?;");
        }
    }
    out.close("}");
}

fn make_attr(name: &str, value: Option<&str>) -> String {
    value.map_or_else(String::new, |value| format!(" {name}=\"{value}\""))
}

fn plugin_param_name(name: &str) -> &str {
    if name.eq_ignore_ascii_case("object") {
        "java_object"
    } else if name.eq_ignore_ascii_case("type") {
        "java_type"
    } else {
        name
    }
}

fn write_dimensions(dims: &[(&str, String)], out: &mut SourceWriter) {
    for (name, var) in dims {
        write_text(&format!(" {name}=\""), out);
        write_var(var, out);
        out.line("ctx.out().write_char('\"')?;");
    }
}

pub(crate) fn visit_plugin(
    node: &Node,
    plugin: &PlugIn,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let mut dims = Vec::new();
    for (name, value) in [("width", &plugin.width), ("height", &plugin.height)] {
        if let Some(value) = value {
            dims.push((name, bind_text(value, node, name, frame, acc, out)?));
        }
    }
    let params = match param_container(node)
        .iter()
        .find(|child| matches!(child.kind, NodeKind::Params))
    {
        Some(params) => prepare_params(&params.children, frame, acc, out)?,
        None => Vec::new(),
    };

    let options = acc.options;
    let ie_url = plugin.iepluginurl.as_deref().unwrap_or(&options.plugin_ie_url);
    let ns_url = plugin.nspluginurl.as_deref().unwrap_or(&options.plugin_ns_url);
    let mime = format!(
        "application/x-java-{};{}",
        plugin.plugin_type,
        plugin
            .jreversion
            .as_ref()
            .map_or_else(String::new, |v| format!("version={v}"))
    );
    let spacing = make_attr("hspace", plugin.hspace.as_deref())
        + &make_attr("vspace", plugin.vspace.as_deref())
        + &make_attr("align", plugin.align.as_deref());

    write_text(
        &format!(
            "<OBJECT{}{}",
            make_attr("classid", Some(options.plugin_ie_class_id.as_str())),
            make_attr("name", plugin.name.as_deref())
        ),
        out,
    );
    write_dimensions(&dims, out);
    write_text(&format!("{spacing}{}>\n", make_attr("codebase", Some(ie_url))), out);
    write_text(
        &format!("<PARAM name=\"java_code\"{}>\n", make_attr("value", Some(plugin.code.as_str()))),
        out,
    );
    for (param, value) in [("java_codebase", &plugin.codebase), ("java_archive", &plugin.archive)] {
        if let Some(value) = value {
            write_text(
                &format!("<PARAM name=\"{param}\"{}>\n", make_attr("value", Some(value.as_str()))),
                out,
            );
        }
    }
    write_text(
        &format!("<PARAM name=\"type\"{}>\n", make_attr("value", Some(mime.as_str()))),
        out,
    );
    for (name, var) in &params {
        write_text(
            &format!("<PARAM name=\"{}\" value=\"", plugin_param_name(name)),
            out,
        );
        write_var(var, out);
        write_text("\">\n", out);
    }

    write_text("<COMMENT>\n", out);
    write_text(
        &format!(
            "<EMBED{}{}",
            make_attr("type", Some(mime.as_str())),
            make_attr("name", plugin.name.as_deref())
        ),
        out,
    );
    write_dimensions(&dims, out);
    write_text(
        &format!(
            "{spacing}{}{}{}{}",
            make_attr("pluginspage", Some(ns_url)),
            make_attr("java_code", Some(plugin.code.as_str())),
            make_attr("java_codebase", plugin.codebase.as_deref()),
            make_attr("java_archive", plugin.archive.as_deref())
        ),
        out,
    );
    for (name, var) in &params {
        write_text(&format!(" {}=\"", plugin_param_name(name)), out);
        write_var(var, out);
        out.line("ctx.out().write_char('\"')?;");
    }
    write_text("/>\n", out);

    write_text("<NOEMBED>\n", out);
    if node.has_body_children() {
        visit_nodes(node.body_children(), frame, acc, out)?;
        out.line("ctx.out().write_char('\\n')?;");
    }
    write_text("</NOEMBED>\n</COMMENT>\n</OBJECT>\n", out);
    Ok(())
}

pub(crate) fn visit_markup(
    node: &Node,
    qname: &str,
    attributes: &[MarkupAttribute],
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let mut open = format!("<{qname}");
    for attr in attributes {
        match &attr.value {
            AttrValue::Literal(value) => {
                let q = if value.contains('"') { '\'' } else { '"' };
                open.push_str(&format!(" {}={q}{value}{q}", attr.name));
            }
            dynamic => {
                let var = bind_text(dynamic, node, &attr.name, frame, acc, out)?;
                write_text(&format!("{open} {}=\"", attr.name), out);
                write_var(&var, out);
                open = "\"".to_string();
            }
        }
    }
    if node.children.is_empty() {
        write_text(&format!("{open} />"), out);
        return Ok(());
    }
    write_text(&format!("{open}>"), out);
    visit_nodes(node.body_children(), frame, acc, out)?;
    write_text(&format!("</{qname}>"), out);
    Ok(())
}

pub(crate) fn visit_element(
    node: &Node,
    name: &AttrValue,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    struct Prepared {
        name: String,
        text: String,
        omit: Option<String>,
    }

    let mut attributes = Vec::new();
    for child in &node.children {
        let NodeKind::NamedAttribute {
            name: attribute,
            omit,
        } = &child.kind
        else {
            continue;
        };
        let omit = match omit {
            None => None,
            Some(AttrValue::Literal(flag)) if flag.eq_ignore_ascii_case("true") => continue,
            Some(AttrValue::Literal(_)) => None,
            Some(dynamic) => {
                let target = Target {
                    attribute: "omit",
                    ty: &ParamType::Bool,
                    editor: None,
                };
                let expr = value_expr(dynamic, child, target, None, frame, acc, out)?;
                let var = acc.temp_var("omit");
                out.line(&format!("let {var}: bool = {expr};"));
                Some(var)
            }
        };
        let text = named_attribute_text(child, frame, acc, out)?;
        attributes.push(Prepared {
            name: attribute.clone(),
            text,
            omit,
        });
    }
    let element = bind_text(name, node, "name", frame, acc, out)?;

    out.line("ctx.out().write_char('<')?;");
    write_var(&element, out);
    for attr in &attributes {
        if let Some(omit) = &attr.omit {
            out.open(&format!("if !{omit} {{"));
        }
        write_text(&format!(" {}=\"", attr.name), out);
        write_var(&attr.text, out);
        out.line("ctx.out().write_char('\"')?;");
        if attr.omit.is_some() {
            out.close("}");
        }
    }
    if node.has_body_children() {
        out.line("ctx.out().write_char('>')?;");
        visit_nodes(node.body_children(), frame, acc, out)?;
        write_text("</", out);
        write_var(&element, out);
        out.line("ctx.out().write_char('>')?;");
    } else {
        write_text("/>", out);
    }
    Ok(())
}

/// `InvokeFragment` and `DoBody`: names the fragment is stored under in
/// page scope, plus the capture settings.
pub(crate) struct Invocation<'a> {
    pub fragment: String,
    pub var: Option<&'a str>,
    pub var_reader: Option<&'a str>,
    pub scope: ScopeName,
}

pub(crate) fn visit_invocation(
    node: &Node,
    invocation: Invocation<'_>,
    acc: &Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    if !acc.page.is_tag_definition() {
        return Err(CodegenError::UnexpectedNode {
            position: node.position.clone(),
            kind: node.kind.name(),
        });
    }
    out.line("ctx.sync_to_caller(SYNC_BEFORE_INVOKE);");
    let capture = match (invocation.var, invocation.var_reader) {
        (Some(var), _) => Some((var, "Value::from(_sout)")),
        (None, Some(reader)) => Some((reader, "Value::object(std::io::Cursor::new(_sout))")),
        (None, None) => None,
    };
    match capture {
        Some((name, value)) => {
            out.open(&format!(
                "let _sout = match page_fragment(ctx, {})? {{",
                invocation.fragment
            ));
            out.line("Some(fragment) => fragment.invoke_to_string(ctx)?,");
            out.line("None => String::new(),");
            out.close("};");
            out.line(&format!(
                "ctx.set_attribute_in({}, {value}, {})?;",
                quote(name),
                invocation.scope.rust_path()
            ));
        }
        None => {
            out.open(&format!(
                "if let Some(fragment) = page_fragment(ctx, {})? {{",
                invocation.fragment
            ));
            out.line("fragment.invoke(ctx)?;");
            out.close("}");
        }
    }
    Ok(())
}
