//! Scripting variables exposed by tags as `Option<T>` locals.
//!
//! A variable is declared where its scope begins, re-read from the
//! attribute store after each lifecycle step that may change it, and, for a
//! tag nested in one of the same name, saved before and restored after so
//! the outer binding survives.

use crate::context::{Accumulator, Frame};
use crate::names::{mangle, quote};
use crate::node::{ScriptingVariable, TagNode, VarScope};
use crate::writer::SourceWriter;

/// Name a variable is bound under for this tag instance, or `None` for an
/// alias that only exists inside a tag definition.
fn bound_name(tag: &TagNode, var: &ScriptingVariable) -> Option<String> {
    match (&var.name, &var.name_from_attribute) {
        (Some(name), None) => Some(name.clone()),
        (None, Some(attr)) => tag
            .attribute(attr)
            .and_then(|a| a.value.literal())
            .map(str::to_string),
        _ => None,
    }
}

fn in_scope<'t>(
    tag: &'t TagNode,
    scope: VarScope,
    frame: &Frame,
    acc: &Accumulator<'_>,
) -> Vec<(&'t ScriptingVariable, String)> {
    if !frame.scripting_allowed(acc.page) {
        return Vec::new();
    }
    tag.variables
        .iter()
        .filter(|var| var.scope == scope)
        .filter_map(|var| bound_name(tag, var).map(|name| (var, name)))
        .collect()
}

fn save_var(local: &str, tag: &TagNode) -> String {
    format!("_save_{local}_{}", tag.nesting_level)
}

pub(crate) fn declare(
    tag: &TagNode,
    scope: VarScope,
    frame: &Frame,
    acc: &Accumulator<'_>,
    out: &mut SourceWriter,
) {
    for (var, name) in in_scope(tag, scope, frame, acc) {
        if var.declare {
            out.line(&format!(
                "let mut {}: Option<{}> = None;",
                mangle(&name),
                var.type_name
            ));
        }
    }
}

pub(crate) fn save(
    tag: &TagNode,
    scope: VarScope,
    frame: &Frame,
    acc: &Accumulator<'_>,
    out: &mut SourceWriter,
) {
    if tag.nesting_level == 0 {
        return;
    }
    for (var, name) in in_scope(tag, scope, frame, acc) {
        if !var.declare {
            let local = mangle(&name);
            out.line(&format!("let {} = {local}.clone();", save_var(&local, tag)));
        }
    }
}

pub(crate) fn restore(
    tag: &TagNode,
    scope: VarScope,
    frame: &Frame,
    acc: &Accumulator<'_>,
    out: &mut SourceWriter,
) {
    if tag.nesting_level == 0 {
        return;
    }
    for (var, name) in in_scope(tag, scope, frame, acc) {
        if !var.declare {
            let local = mangle(&name);
            out.line(&format!("{local} = {};", save_var(&local, tag)));
        }
    }
}

pub(crate) fn sync(
    tag: &TagNode,
    scope: VarScope,
    frame: &Frame,
    acc: &Accumulator<'_>,
    out: &mut SourceWriter,
) {
    for (_, name) in in_scope(tag, scope, frame, acc) {
        out.line(&format!(
            "{} = sync_value(ctx.find_attribute({})?);",
            mangle(&name),
            quote(&name)
        ));
    }
}
