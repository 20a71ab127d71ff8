//! Dispatch from node kind to emitter.

use crate::actions::{self, Invocation, SetProperty, UseBean};
use crate::context::{Accumulator, Frame};
use crate::error::CodegenError;
use crate::fragments::fragment_expr;
use crate::names::quote;
use crate::node::{Node, NodeKind};
use crate::tags;
use crate::text::emit_template_text;
use crate::writer::SourceWriter;

pub(crate) fn visit_nodes<'n>(
    nodes: impl IntoIterator<Item = &'n Node>,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    for node in nodes {
        visit(node, frame, acc, out)?;
    }
    Ok(())
}

fn visit(
    node: &Node,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<(), CodegenError> {
    match &node.kind {
        NodeKind::TemplateText { text } => emit_template_text(text, frame, acc, out),
        NodeKind::Expression { code } => {
            out.line(&format!("{{ let _v = ({code}); ctx.out().print(&_v)?; }}"));
        }
        NodeKind::Scriptlet { code } => out.verbatim(code),
        // Hoisted to module level when the unit is assembled.
        NodeKind::Declaration { .. } => {}
        NodeKind::ElExpression { expression } => out.line(&format!(
            "{{ let _v = ctx.evaluate_as::<String>({})?; ctx.out().write_str(&_v)?; }}",
            quote(&format!("${{{expression}}}"))
        )),
        NodeKind::ExtensionTag(tag) => tags::visit_tag(node, tag, frame, acc, out)?,
        // Consumed by the node that owns them.
        NodeKind::NamedAttribute { .. } | NodeKind::Param { .. } | NodeKind::Params => {}
        NodeKind::Fallback => visit_nodes(node.body_children(), frame, acc, out)?,
        NodeKind::JspBody => match &frame.simple_tag_body {
            Some(handler) => {
                let parent = format!("Some({handler}.clone() as TagRef)");
                let fragment = fragment_expr(node.body_children(), &parent, frame, acc)?;
                out.line(&format!("{handler}.set_body({fragment});"));
            }
            None => visit_nodes(node.body_children(), frame, acc, out)?,
        },
        NodeKind::IncludeAction { page, flush } => {
            actions::visit_include(node, page, *flush, frame, acc, out)?;
        }
        NodeKind::ForwardAction { page } => actions::visit_forward(node, page, frame, acc, out)?,
        NodeKind::UseBean {
            id,
            scope,
            class,
            bean_name,
            type_name,
            class_instantiable,
        } => {
            let bean = UseBean {
                id,
                scope: *scope,
                class: class.as_deref(),
                bean_name: bean_name.as_ref(),
                type_name: type_name.as_deref(),
                class_instantiable: *class_instantiable,
            };
            actions::visit_use_bean(node, bean, frame, acc, out)?;
        }
        NodeKind::SetProperty {
            name,
            property,
            param,
            value,
            setter,
        } => {
            let set = SetProperty {
                name,
                property,
                param: param.as_deref(),
                value: value.as_ref(),
                setter: setter.as_deref(),
            };
            actions::visit_set_property(node, set, frame, acc, out)?;
        }
        NodeKind::GetProperty {
            name,
            property,
            getter,
        } => actions::visit_get_property(name, property, getter.as_deref(), acc, out),
        NodeKind::PlugIn(plugin) => actions::visit_plugin(node, plugin, frame, acc, out)?,
        NodeKind::UninterpretedMarkup { qname, attributes } => {
            actions::visit_markup(node, qname, attributes, frame, acc, out)?;
        }
        NodeKind::ElementConstructor { name } => {
            actions::visit_element(node, name, frame, acc, out)?;
        }
        NodeKind::InvokeFragment {
            fragment,
            var,
            var_reader,
            scope,
        } => {
            let invocation = Invocation {
                fragment: quote(fragment),
                var: var.as_deref(),
                var_reader: var_reader.as_deref(),
                scope: *scope,
            };
            actions::visit_invocation(node, invocation, acc, out)?;
        }
        NodeKind::DoBody {
            var,
            var_reader,
            scope,
        } => {
            let invocation = Invocation {
                fragment: "attrs::TAG_BODY".into(),
                var: var.as_deref(),
                var_reader: var_reader.as_deref(),
                scope: *scope,
            };
            actions::visit_invocation(node, invocation, acc, out)?;
        }
    }
    Ok(())
}

/// Declaration code anywhere in the tree, in document order.
pub(crate) fn collect_declarations<'n>(nodes: &'n [Node], found: &mut Vec<&'n str>) {
    for node in nodes {
        if let NodeKind::Declaration { code } = &node.kind {
            found.push(code);
        }
        collect_declarations(&node.children, found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SkipStyle;
    use crate::page::{GeneratorOptions, PageInfo};

    #[test]
    fn expressions_print_and_scriptlets_are_inlined() {
        let options = GeneratorOptions::default();
        let page = PageInfo::new("p");
        let mut acc = Accumulator::new(&options, &page);
        let mut out = SourceWriter::default();
        let nodes = vec![
            Node::new(NodeKind::Scriptlet {
                code: "let n = 2;\n\nlet m = n * 2;".into(),
            }),
            Node::new(NodeKind::Expression { code: "m + 1".into() }),
            Node::new(NodeKind::ElExpression {
                expression: "param.q".into(),
            }),
            Node::new(NodeKind::Declaration {
                code: "fn helper() {}".into(),
            }),
        ];
        visit_nodes(&nodes, &Frame::top(SkipStyle::Flag, false), &mut acc, &mut out).unwrap();
        assert_eq!(
            out.finish(),
            "let n = 2;\n\n\
             let m = n * 2;\n\
             { let _v = (m + 1); ctx.out().print(&_v)?; }\n\
             { let _v = ctx.evaluate_as::<String>(\"${param.q}\")?; ctx.out().write_str(&_v)?; }\n"
        );
        let mut found = Vec::new();
        collect_declarations(&nodes, &mut found);
        assert_eq!(found, ["fn helper() {}"]);
    }
}
