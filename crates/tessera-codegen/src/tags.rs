//! Extension tag invocation.
//!
//! Classic handlers are driven through start, body, after-body and end
//! calls, optionally wrapped in catch/finally handling. Fragment handlers
//! get their body as a [`Fragment`](tessera_runtime::Fragment) and run once.
//! A scriptless subtree is moved into a routine of its own so render
//! functions stay small.

use crate::attributes::{Target, dynamic_value_expr, value_expr};
use crate::context::{Accumulator, Frame, SkipStyle};
use crate::error::CodegenError;
use crate::fragments::fragment_expr;
use crate::names::{PoolSignature, quote};
use crate::node::{Node, NodeKind, TagBinding, TagNode, VarScope};
use crate::vars;
use crate::visit::visit_nodes;
use crate::writer::SourceWriter;

/// Registers a pool for every classic tag in `nodes`, depth first, so pool
/// names do not depend on which routine a tag ends up in.
pub(crate) fn register_pools(nodes: &[Node], acc: &mut Accumulator<'_>) {
    for node in nodes {
        if let NodeKind::ExtensionTag(tag) = &node.kind {
            let classic = tag
                .binding
                .as_ref()
                .is_some_and(|binding| !binding.lifecycle.is_fragment());
            if classic && acc.pooling {
                acc.pools.register(PoolSignature::of(tag));
            }
        }
        register_pools(&node.children, acc);
    }
}

pub(crate) fn visit_tag(
    node: &Node,
    tag: &TagNode,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let binding = tag
        .binding
        .as_ref()
        .ok_or_else(|| CodegenError::UnresolvedHandler {
            position: node.position.clone(),
            tag: tag.qname(),
        })?;
    let base = acc.tag_var_base(&tag.prefix, &tag.local_name);

    let splittable = tag.child_info.scriptless
        && !tag.child_info.has_scripting_vars
        && tag.variables.is_empty();
    if !splittable {
        return emit_tag(node, tag, binding, &base, frame, acc, out);
    }

    let method = format!("meth_{base}");
    out.open(&format!(
        "if {method}({}, ctx, {})? {{",
        frame.parent_expr(),
        frame.push_count_expr()
    ));
    out.line(frame.skip_stmt());
    out.close("}");

    let slot = acc.reserve_method();
    let inner = Frame {
        parent: frame.parent.as_ref().map(|_| "_parent.clone()".to_string()),
        push_count: frame.push_count.as_ref().map(|_| "_pbc".to_string()),
        method_nesting: frame.method_nesting + 1,
        skip: SkipStyle::Flag,
        ..frame.clone()
    };
    let mut body = SourceWriter::default();
    body.open(&format!(
        "fn {method}(_parent: Option<TagRef>, ctx: &mut PageContext, \
         _pbc: Option<PushBodyCount>) -> Result<bool, RenderError> {{"
    ));
    emit_tag(node, tag, binding, &base, &inner, acc, &mut body)?;
    body.line("Ok(false)");
    body.close("}");
    acc.methods[slot] = body.finish();
    Ok(())
}

fn emit_tag(
    node: &Node,
    tag: &TagNode,
    binding: &TagBinding,
    base: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    if binding.lifecycle.is_fragment() {
        emit_simple(node, tag, binding, base, frame, acc, out)
    } else {
        emit_classic(node, tag, binding, base, frame, acc, out)
    }
}

fn emit_setters(
    node: &Node,
    tag: &TagNode,
    binding: &TagBinding,
    handler: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    for attr in &tag.attributes {
        if attr.dynamic {
            let value = dynamic_value_expr(&attr.value, node, &attr.name, frame, acc, out)?;
            let uri = match &attr.uri {
                Some(uri) => format!("Some({})", quote(uri)),
                None => "None".to_string(),
            };
            out.line(&format!(
                "{handler}.set_dynamic_attribute({uri}, {}, {value})?;",
                quote(&attr.name)
            ));
            continue;
        }
        let setter = binding
            .setters
            .get(&attr.name)
            .ok_or_else(|| CodegenError::UnknownSetter {
                position: node.position.clone(),
                handler: binding.handler.clone(),
                attribute: attr.name.clone(),
            })?;
        let target = Target {
            attribute: &attr.name,
            ty: &setter.param_type,
            editor: setter.editor.as_deref(),
        };
        let value = value_expr(&attr.value, node, target, Some(handler), frame, acc, out)?;
        out.line(&format!("{handler}.{}({value});", setter.method));
    }
    Ok(())
}

/// Returns the handler to its pool, or releases it when pooling is off.
fn release_handler(pool: Option<&str>, handler: &str, out: &mut SourceWriter) {
    match pool {
        Some(pool) => out.line(&format!("tag_pools().{pool}.reuse({handler});")),
        None => out.line(&format!("{handler}.release();")),
    }
}

fn bump_push_count(counter: Option<&str>, op: &str, out: &mut SourceWriter) {
    if let Some(counter) = counter {
        out.line(&format!("if let Some(count) = &{counter} {{ count.{op}(); }}"));
    }
}

fn emit_classic(
    node: &Node,
    tag: &TagNode,
    binding: &TagBinding,
    base: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let lifecycle = binding.lifecycle;
    let handler = format!("_th_{base}");
    let eval = format!("_eval_{base}");
    let tcf = format!("_tcf_{base}");
    let own_count = format!("_pbc_{base}");
    let try_catch = lifecycle.is_try_catch();

    let pool = if acc.pooling {
        let signature = PoolSignature::of(tag);
        let name = acc.pools.get(&signature).ok_or_else(|| {
            CodegenError::Internal(format!("no pool registered for `{}`", tag.qname()))
        })?;
        Some(name.to_string())
    } else {
        None
    };

    vars::declare(tag, VarScope::AtBegin, frame, acc, out);
    vars::save(tag, VarScope::AtBegin, frame, acc, out);

    match &pool {
        Some(pool) => out.line(&format!(
            "let {handler} = tag_pools().{pool}.acquire::<{}>();",
            binding.handler
        )),
        None => out.line(&format!("let {handler} = Arc::new({}::default());", binding.handler)),
    }
    out.line(&format!("{handler}.set_parent({});", frame.parent_expr()));
    emit_setters(node, tag, binding, &handler, frame, acc, out)?;

    // Inside the catch region a skip is reported to the code after it.
    let mut frame = frame.clone();
    let outer_skip = frame.skip_stmt();
    if try_catch {
        frame.skip = SkipStyle::Flag;
        out.line(&format!(
            "let {own_count}: Option<PushBodyCount> = Some(PushBodyCount::default());"
        ));
        out.open(&format!("let {tcf} = (|| -> Result<bool, RenderError> {{"));
    }
    let counter = if try_catch {
        Some(own_count.as_str())
    } else {
        frame.push_count.as_deref()
    };

    out.line(&format!("let {eval} = {handler}.do_start_tag(ctx)?;"));
    if !lifecycle.is_body_tag() {
        vars::sync(tag, VarScope::AtBegin, &frame, acc, out);
    }

    if !tag.has_empty_body {
        out.open(&format!("if {eval} != StartResult::SkipBody {{"));
        vars::declare(tag, VarScope::Nested, &frame, acc, out);
        vars::save(tag, VarScope::Nested, &frame, acc, out);

        let mut inner = frame.under_handler(&handler);
        if try_catch {
            inner.push_count = Some(own_count.clone());
        }
        if lifecycle.is_body_tag() {
            let body = format!("_bh_{base}");
            out.open(&format!("if {eval} == StartResult::BufferBody {{"));
            out.line(&format!("let {body} = ctx.push_body();"));
            bump_push_count(counter, "increment", out);
            out.line(&format!("{handler}.set_body_content({body});"));
            out.line(&format!("{handler}.do_init_body(ctx)?;"));
            out.close("}");
            vars::sync(tag, VarScope::AtBegin, &frame, acc, out);
            vars::sync(tag, VarScope::Nested, &frame, acc, out);
            inner.gen_bytes = false;
        } else {
            vars::sync(tag, VarScope::Nested, &frame, acc, out);
        }

        if lifecycle.is_iteration() {
            out.open("loop {");
        }
        visit_nodes(node.body_children(), &inner, acc, out)?;
        if lifecycle.is_iteration() {
            let after = format!("_after_{base}");
            out.line(&format!("let {after} = {handler}.do_after_body(ctx)?;"));
            vars::sync(tag, VarScope::AtBegin, &frame, acc, out);
            vars::sync(tag, VarScope::Nested, &frame, acc, out);
            out.open(&format!("if {after} != AfterBody::Again {{"));
            out.line("break;");
            out.close("}");
            out.close("}");
        }

        vars::restore(tag, VarScope::Nested, &frame, acc, out);
        if lifecycle.is_body_tag() {
            out.open(&format!("if {eval} != StartResult::IncludeBody {{"));
            out.line("ctx.pop_body();");
            bump_push_count(counter, "decrement", out);
            out.close("}");
        }
        out.close("}");
    }

    out.open(&format!(
        "if {handler}.do_end_tag(ctx)? == EndResult::SkipPage {{"
    ));
    if !try_catch {
        release_handler(pool.as_deref(), &handler, out);
    }
    out.line(frame.skip_stmt());
    out.close("}");
    vars::sync(tag, VarScope::AtBegin, &frame, acc, out);

    if try_catch {
        out.line("Ok(false)");
        out.close("})();");
        out.open(&format!("let {tcf} = {tcf}.or_else(|err| {{"));
        out.open(&format!("if let Some(count) = &{own_count} {{"));
        out.open("for _ in 0..count.take() {");
        out.line("ctx.pop_body();");
        out.close("}");
        out.close("}");
        out.line(&format!("{handler}.do_catch(err).map(|()| false)"));
        out.close("});");
        out.line(&format!("{handler}.do_finally();"));
        release_handler(pool.as_deref(), &handler, out);
        out.open(&format!("if {tcf}? {{"));
        out.line(outer_skip);
        out.close("}");
    } else {
        release_handler(pool.as_deref(), &handler, out);
    }

    vars::declare(tag, VarScope::AtEnd, &frame, acc, out);
    vars::sync(tag, VarScope::AtEnd, &frame, acc, out);
    vars::restore(tag, VarScope::AtBegin, &frame, acc, out);
    Ok(())
}

fn emit_simple(
    node: &Node,
    tag: &TagNode,
    binding: &TagBinding,
    base: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    let handler = format!("_th_{base}");

    vars::declare(tag, VarScope::AtBegin, frame, acc, out);
    vars::save(tag, VarScope::AtBegin, frame, acc, out);

    out.line(&format!("let {handler} = Arc::new({}::default());", binding.handler));
    if frame.parent.is_some() {
        out.line(&format!("{handler}.set_parent({});", frame.parent_expr()));
    }
    emit_setters(node, tag, binding, &handler, frame, acc, out)?;

    if !tag.has_empty_body {
        let explicit_body = node
            .body_children()
            .any(|child| matches!(child.kind, NodeKind::JspBody));
        if explicit_body {
            let inner = Frame {
                simple_tag_body: Some(handler.clone()),
                ..frame.clone()
            };
            visit_nodes(node.body_children(), &inner, acc, out)?;
        } else {
            let parent = format!("Some({handler}.clone() as TagRef)");
            let fragment = fragment_expr(node.body_children(), &parent, frame, acc)?;
            out.line(&format!("{handler}.set_body({fragment});"));
        }
    }
    out.line(&format!("{handler}.do_tag(ctx)?;"));

    vars::restore(tag, VarScope::AtBegin, frame, acc, out);
    vars::sync(tag, VarScope::AtBegin, frame, acc, out);
    vars::declare(tag, VarScope::AtEnd, frame, acc, out);
    vars::sync(tag, VarScope::AtEnd, frame, acc, out);
    Ok(())
}
