//! Fragment bodies and the per-unit helper that dispatches to them.

use crate::context::{Accumulator, Frame, SkipStyle};
use crate::error::CodegenError;
use crate::node::Node;
use crate::visit::visit_nodes;
use crate::writer::SourceWriter;

/// Emits an invoke routine rendering `body` and returns the expression that
/// builds the fragment, bound to `parent` and the frame's push counter.
pub(crate) fn fragment_expr<'n>(
    body: impl IntoIterator<Item = &'n Node>,
    parent: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
) -> Result<String, CodegenError> {
    let id = acc.reserve_fragment();
    let inner = Frame {
        parent: Some("_parent.clone()".into()),
        push_count: Some("_pbc".into()),
        method_nesting: 0,
        in_fragment: true,
        skip: SkipStyle::Raise,
        gen_bytes: false,
        simple_tag_body: None,
    };

    let mut out = SourceWriter::with_indent(1);
    out.open(&format!(
        "fn invoke{id}(_frag: &Fragment, ctx: &mut PageContext) -> Result<(), RenderError> {{"
    ));
    out.line("let _parent = _frag.parent();");
    out.line("let _pbc = _frag.push_count();");
    visit_nodes(body, &inner, acc, &mut out)?;
    out.line("Ok(())");
    out.close("}");
    acc.fragments[id] = out.finish();

    Ok(format!(
        "FragmentHelper::new({id}, ctx.scope_mark(), {parent}, {})",
        frame.push_count_expr()
    ))
}

const HELPER_NEW: &str = r#"fn new(
    discriminator: u32,
    scope: ScopeMark,
    parent: Option<TagRef>,
    push_count: Option<PushBodyCount>,
) -> Fragment {
    Fragment::new(discriminator, scope, parent, push_count, Self::dispatch)
}"#;

/// The helper type shared by every fragment of the unit; empty when the
/// unit creates none.
pub(crate) fn emit_helper(acc: &Accumulator<'_>) -> String {
    if acc.fragments.is_empty() {
        return String::new();
    }
    let mut out = SourceWriter::default();
    out.line("struct FragmentHelper;");
    out.blank();
    out.open("impl FragmentHelper {");
    out.verbatim(HELPER_NEW);
    out.blank();
    out.open("fn dispatch(frag: &Fragment, ctx: &mut PageContext) -> Result<(), RenderError> {");
    out.open("match frag.discriminator() {");
    for id in 0..acc.fragments.len() {
        out.line(&format!("{id} => Self::invoke{id}(frag, ctx),"));
    }
    out.line("other => Err(RenderError::state(format!(\"no fragment body {other}\"))),");
    out.close("}");
    out.close("}");
    let mut text = out.finish();
    for body in &acc.fragments {
        text.push('\n');
        text.push_str(body);
    }
    text.push_str("}\n");
    text
}
