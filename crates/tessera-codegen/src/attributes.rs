//! The attribute value rule: literals are converted while generating,
//! runtime expressions are inlined, EL goes through the evaluator and named
//! attributes are rendered first and converted at runtime.

use crate::context::{Accumulator, Frame};
use crate::error::{CodegenError, Position};
use crate::fragments::fragment_expr;
use crate::names::{quote, quote_char};
use crate::node::{AttrValue, Node, NodeKind, ParamType};
use crate::visit::visit_nodes;
use crate::writer::SourceWriter;

/// What an attribute value is converted into.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target<'a> {
    pub attribute: &'a str,
    pub ty: &'a ParamType,
    pub editor: Option<&'a str>,
}

impl<'a> Target<'a> {
    pub(crate) fn text(attribute: &'a str) -> Self {
        Self {
            attribute,
            ty: &ParamType::Text,
            editor: None,
        }
    }
}

/// Expression for `value` converted to the target type. Code that must run
/// first (named attribute rendering) is written to `out`.
///
/// `handler` is the variable of the tag receiving the value; fragment
/// attributes use it as their parent.
pub(crate) fn value_expr(
    value: &AttrValue,
    owner: &Node,
    target: Target<'_>,
    handler: Option<&str>,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<String, CodegenError> {
    match value {
        AttrValue::Literal(text) => literal_expr(text, target, &owner.position),
        AttrValue::Runtime(code) => Ok(format!("({code})")),
        AttrValue::El(expression) => Ok(el_expr(expression, target)),
        AttrValue::Named => {
            let named = named_child(owner, target.attribute)?;
            if *target.ty == ParamType::Fragment {
                let parent = match handler {
                    Some(var) => format!("Some({var}.clone() as TagRef)"),
                    None => frame.parent_expr(),
                };
                let var = acc.temp_var("na");
                let fragment = fragment_expr(&named.children, &parent, frame, acc)?;
                out.line(&format!("let {var} = {fragment};"));
                return Ok(var);
            }
            let var = named_attribute_text(named, frame, acc, out)?;
            Ok(runtime_expr(&var, target))
        }
    }
}

/// Expression for a dynamic attribute, always a `Value`.
pub(crate) fn dynamic_value_expr(
    value: &AttrValue,
    owner: &Node,
    attribute: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<String, CodegenError> {
    Ok(match value {
        AttrValue::Literal(text) => format!("Value::from({})", quote(text)),
        AttrValue::Runtime(code) => format!("Value::from(({code}))"),
        AttrValue::El(expression) => {
            format!("ctx.evaluate({}, ExpectedType::Any)?", quote(expression))
        }
        AttrValue::Named => {
            let named = named_child(owner, attribute)?;
            let var = named_attribute_text(named, frame, acc, out)?;
            format!("Value::from({var})")
        }
    })
}

pub(crate) fn named_child<'n>(owner: &'n Node, attribute: &str) -> Result<&'n Node, CodegenError> {
    owner.named_attribute(attribute).ok_or_else(|| {
        CodegenError::malformed(
            &owner.position,
            owner.kind.name(),
            format!("attribute `{attribute}` has no body element"),
        )
    })
}

/// Renders a named attribute's body and returns the variable holding the
/// text. A body of one literal needs no buffer.
pub(crate) fn named_attribute_text(
    named: &Node,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) -> Result<String, CodegenError> {
    let var = acc.temp_var("na");
    match named.children.as_slice() {
        [] => out.line(&format!("let {var} = String::new();")),
        [
            Node {
                kind: NodeKind::TemplateText { text },
                ..
            },
        ] => out.line(&format!("let {var} = {}.to_string();", quote(text))),
        body => {
            let handle = acc.temp_var("bh");
            let inner = Frame {
                gen_bytes: false,
                ..frame.clone()
            };
            out.line(&format!("let {handle} = ctx.push_body();"));
            visit_nodes(body, &inner, acc, out)?;
            out.line(&format!("let {var} = ctx.body_text({handle});"));
            out.line("ctx.pop_body();");
        }
    }
    Ok(var)
}

fn literal_expr(
    text: &str,
    target: Target<'_>,
    position: &Position,
) -> Result<String, CodegenError> {
    let illegal = || CodegenError::IllegalCoercion {
        position: position.clone(),
        attribute: target.attribute.to_string(),
        value: text.to_string(),
        target: target.ty.rust_type(),
    };
    if *target.ty == ParamType::Fragment {
        return Err(illegal());
    }
    if let Some(editor) = target.editor {
        return Ok(format!(
            "convert_with_editor::<{editor}>({}, {})?",
            quote(target.attribute),
            quote(text)
        ));
    }

    // Numbers must be exact; surrounding whitespace is not accepted.
    macro_rules! number {
        ($ty:ty, $suffix:literal) => {{
            let n: $ty = if text.is_empty() {
                <$ty>::default()
            } else {
                text.parse().map_err(|_| illegal())?
            };
            format!("{n}{}", $suffix)
        }};
    }
    macro_rules! float {
        ($ty:ty, $suffix:literal) => {{
            let x: $ty = if text.is_empty() {
                0.0
            } else {
                text.parse().map_err(|_| illegal())?
            };
            if x.is_nan() {
                format!("{}::NAN", $suffix)
            } else if x.is_infinite() {
                let sign = if x > 0.0 { "" } else { "NEG_" };
                format!("{}::{sign}INFINITY", $suffix)
            } else {
                format!("{x:?}{}", $suffix)
            }
        }};
    }

    Ok(match target.ty {
        ParamType::Text => format!("{}.to_string()", quote(text)),
        ParamType::Bool => text.eq_ignore_ascii_case("true").to_string(),
        ParamType::Char => quote_char(text.chars().next().unwrap_or('\0')),
        ParamType::I8 => number!(i8, "i8"),
        ParamType::I16 => number!(i16, "i16"),
        ParamType::I32 => number!(i32, "i32"),
        ParamType::I64 => number!(i64, "i64"),
        ParamType::U8 => number!(u8, "u8"),
        ParamType::U16 => number!(u16, "u16"),
        ParamType::U32 => number!(u32, "u32"),
        ParamType::U64 => number!(u64, "u64"),
        ParamType::Usize => number!(usize, "usize"),
        ParamType::F32 => float!(f32, "f32"),
        ParamType::F64 => float!(f64, "f64"),
        ParamType::Optional(inner) => {
            if text.is_empty() {
                "None".to_string()
            } else {
                let inner = Target {
                    ty: inner,
                    ..target
                };
                format!("Some({})", literal_expr(text, inner, position)?)
            }
        }
        ParamType::Enum(path) => format!("coerce_to_enum::<{path}>({})?", quote(text)),
        ParamType::Value => format!("Value::from({})", quote(text)),
        ParamType::Other(path) => format!(
            "<{path} as FromAttributeText>::from_attribute_text({}, {})?",
            quote(target.attribute),
            quote(text)
        ),
        ParamType::Fragment => return Err(illegal()),
    })
}

/// Conversion of the `String` in `var` to the target type at runtime.
fn runtime_expr(var: &str, target: Target<'_>) -> String {
    if let Some(editor) = target.editor {
        return format!(
            "convert_with_editor::<{editor}>({}, &{var})?",
            quote(target.attribute)
        );
    }
    if let Some(coerce) = target.ty.coercion_fn() {
        return format!("{coerce}(&{var})?");
    }
    match target.ty {
        ParamType::Text => var.to_string(),
        ParamType::Bool => format!("coerce_to_bool(&{var})"),
        ParamType::Char => format!("coerce_to_char(&{var})"),
        ParamType::Optional(inner) => {
            let inner = Target {
                ty: inner,
                ..target
            };
            format!(
                "if {var}.is_empty() {{ None }} else {{ Some({}) }}",
                runtime_expr(var, inner)
            )
        }
        ParamType::Enum(path) => format!("coerce_to_enum::<{path}>(&{var})?"),
        ParamType::Value => format!("Value::from({var})"),
        ParamType::Other(path) => format!(
            "<{path} as FromAttributeText>::from_attribute_text({}, &{var})?",
            quote(target.attribute)
        ),
        // Fragments never reach here; numeric types took the coercion path.
        _ => var.to_string(),
    }
}

fn needs_text_conversion(ty: &ParamType) -> bool {
    match ty {
        ParamType::Enum(_) | ParamType::Other(_) => true,
        ParamType::Optional(inner) => needs_text_conversion(inner),
        _ => false,
    }
}

fn el_expr(expression: &str, target: Target<'_>) -> String {
    let quoted = quote(expression);
    if !needs_text_conversion(target.ty) {
        return format!("ctx.evaluate_as::<{}>({quoted})?", target.ty.rust_type());
    }
    let converted = runtime_expr("_el", Target { editor: None, ..target });
    format!("{{ let _el = ctx.evaluate_as::<String>({quoted})?; {converted} }}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str, ty: ParamType) -> Result<String, CodegenError> {
        let target = Target {
            attribute: "a",
            ty: &ty,
            editor: None,
        };
        literal_expr(text, target, &Position::new("p.tsr", 1, 1))
    }

    #[test]
    fn literals_are_converted_while_generating() {
        assert_eq!(lit("Hi \"x\"", ParamType::Text).unwrap(), "\"Hi \\\"x\\\"\".to_string()");
        assert_eq!(lit("TRUE", ParamType::Bool).unwrap(), "true");
        assert_eq!(lit("yes", ParamType::Bool).unwrap(), "false");
        assert_eq!(lit("", ParamType::I32).unwrap(), "0i32");
        assert_eq!(lit("-7", ParamType::I64).unwrap(), "-7i64");
        assert_eq!(lit("2.5", ParamType::F64).unwrap(), "2.5f64");
        assert_eq!(lit("", ParamType::F32).unwrap(), "0.0f32");
        assert_eq!(lit("", ParamType::Char).unwrap(), "'\\0'");
        assert_eq!(lit("", ParamType::Optional(Box::new(ParamType::U8))).unwrap(), "None");
        assert_eq!(
            lit("4", ParamType::Optional(Box::new(ParamType::U8))).unwrap(),
            "Some(4u8)"
        );
        assert_eq!(
            lit("Left", ParamType::Enum("Align".into())).unwrap(),
            "coerce_to_enum::<Align>(\"Left\")?"
        );
    }

    #[test]
    fn bad_literals_are_fatal_with_position() {
        let err = lit("300", ParamType::U8).unwrap_err();
        assert!(matches!(err, CodegenError::IllegalCoercion { .. }));
        assert!(err.to_string().starts_with("p.tsr:1:1:"));
        assert!(lit("x", ParamType::Fragment).is_err());
    }

    #[test]
    fn numeric_literals_with_surrounding_spaces_are_rejected() {
        for (text, ty) in [
            (" 5", ParamType::I32),
            ("5 ", ParamType::U64),
            (" -7 ", ParamType::I64),
            (" 2.5", ParamType::F64),
        ] {
            let err = lit(text, ty).unwrap_err();
            assert!(matches!(err, CodegenError::IllegalCoercion { .. }), "{text:?}");
        }
    }

    #[test]
    fn runtime_text_goes_through_fixed_coercions() {
        let t = |ty: ParamType| {
            runtime_expr(
                "_na_0",
                Target {
                    attribute: "n",
                    ty: &ty,
                    editor: None,
                },
            )
        };
        assert_eq!(t(ParamType::U16), "coerce_to_u16(&_na_0)?");
        assert_eq!(t(ParamType::Text), "_na_0");
        assert_eq!(
            t(ParamType::Optional(Box::new(ParamType::Enum("Kind".into())))),
            "if _na_0.is_empty() { None } else { Some(coerce_to_enum::<Kind>(&_na_0)?) }"
        );
        assert_eq!(
            t(ParamType::Other("Color".into())),
            "<Color as FromAttributeText>::from_attribute_text(\"n\", &_na_0)?"
        );
    }

    #[test]
    fn el_for_enums_evaluates_to_text_first() {
        let ty = ParamType::Enum("Kind".into());
        let target = Target {
            attribute: "k",
            ty: &ty,
            editor: None,
        };
        assert_eq!(
            el_expr("${kind}", target),
            "{ let _el = ctx.evaluate_as::<String>(\"${kind}\")?; coerce_to_enum::<Kind>(&_el)? }"
        );
        assert_eq!(
            el_expr("${n}", Target::text("n")),
            "ctx.evaluate_as::<String>(\"${n}\")?"
        );
    }
}
