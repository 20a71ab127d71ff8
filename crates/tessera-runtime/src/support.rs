//! Helpers called from generated units: attribute coercions, bean
//! property access and URL building for include/forward parameters.

use std::str::FromStr;

use tracing::trace;

use crate::bean::SharedBean;
use crate::context::PageContext;
use crate::error::RenderError;
use crate::fragment::Fragment;
use crate::value::{FromValue, Value};

// Coercions applied to attribute text produced at request time.

pub fn coerce_to_bool(text: &str) -> bool {
    text.eq_ignore_ascii_case("true")
}

pub fn coerce_to_char(text: &str) -> char {
    text.chars().next().unwrap_or('\0')
}

fn parse_number<T: FromStr + Default>(text: &str) -> Result<T, RenderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(T::default());
    }
    trimmed.parse::<T>().map_err(|_| {
        RenderError::argument(format!(
            "`{text}` is not a valid {}",
            std::any::type_name::<T>()
        ))
    })
}

macro_rules! numeric_coercions {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(pub fn $name(text: &str) -> Result<$ty, RenderError> {
            parse_number::<$ty>(text)
        })*
    };
}

numeric_coercions! {
    coerce_to_i8 => i8,
    coerce_to_i16 => i16,
    coerce_to_i32 => i32,
    coerce_to_i64 => i64,
    coerce_to_u8 => u8,
    coerce_to_u16 => u16,
    coerce_to_u32 => u32,
    coerce_to_u64 => u64,
    coerce_to_usize => usize,
    coerce_to_f32 => f32,
    coerce_to_f64 => f64,
}

/// Empty text becomes `None`; anything else converts through
/// [`FromAttributeText`].
pub fn coerce_to_optional<T: FromAttributeText>(
    attribute: &str,
    text: &str,
) -> Result<Option<T>, RenderError> {
    if text.is_empty() {
        return Ok(None);
    }
    T::from_attribute_text(attribute, text).map(Some)
}

pub fn coerce_to_enum<T: FromStr>(text: &str) -> Result<T, RenderError> {
    text.trim().parse::<T>().map_err(|_| {
        RenderError::argument(format!(
            "`{text}` is not a variant of {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Conversion of attribute text into a setter's parameter type.
///
/// Generated code falls back to this for types without a fixed coercion.
pub trait FromAttributeText: Sized {
    fn from_attribute_text(attribute: &str, text: &str) -> Result<Self, RenderError>;
}

impl FromAttributeText for String {
    fn from_attribute_text(_attribute: &str, text: &str) -> Result<Self, RenderError> {
        Ok(text.to_string())
    }
}

impl FromAttributeText for bool {
    fn from_attribute_text(_attribute: &str, text: &str) -> Result<Self, RenderError> {
        Ok(coerce_to_bool(text))
    }
}

impl FromAttributeText for char {
    fn from_attribute_text(_attribute: &str, text: &str) -> Result<Self, RenderError> {
        Ok(coerce_to_char(text))
    }
}

impl FromAttributeText for Value {
    fn from_attribute_text(_attribute: &str, text: &str) -> Result<Self, RenderError> {
        Ok(Value::from(text))
    }
}

macro_rules! numeric_from_text {
    ($($ty:ty),*) => {
        $(impl FromAttributeText for $ty {
            fn from_attribute_text(attribute: &str, text: &str) -> Result<Self, RenderError> {
                parse_number::<$ty>(text).map_err(|_| {
                    RenderError::argument(format!(
                        "attribute `{attribute}`: `{text}` is not a valid {}",
                        stringify!($ty)
                    ))
                })
            }
        })*
    };
}

numeric_from_text!(i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);

/// Text-to-value converter registered for a setter parameter.
pub trait PropertyEditor: Default {
    type Target;

    fn set_as_text(&mut self, text: &str) -> Result<(), RenderError>;

    fn value(self) -> Self::Target;
}

pub fn convert_with_editor<E: PropertyEditor>(
    attribute: &str,
    text: &str,
) -> Result<E::Target, RenderError> {
    let mut editor = E::default();
    editor.set_as_text(text).map_err(|err| {
        RenderError::argument(format!(
            "attribute `{attribute}`: cannot convert `{text}`: {err}"
        ))
    })?;
    Ok(editor.value())
}

// Bean property access.

/// Looks up `name` in every scope and requires it to be a bean.
pub fn find_bean(ctx: &mut PageContext, name: &str) -> Result<SharedBean, RenderError> {
    match ctx.find_attribute(name)? {
        Some(Value::Bean(bean)) => Ok(bean),
        Some(_) => Err(RenderError::Property(format!(
            "attribute `{name}` is not a bean"
        ))),
        None => Err(RenderError::Property(format!(
            "no bean named `{name}` in any scope"
        ))),
    }
}

pub fn handle_get_property(
    ctx: &mut PageContext,
    name: &str,
    property: &str,
) -> Result<Value, RenderError> {
    let bean = find_bean(ctx, name)?;
    let value = bean.lock().property(property);
    value.ok_or_else(|| {
        RenderError::Property(format!(
            "bean `{name}` has no readable property `{property}`"
        ))
    })
}

pub fn handle_set_property(
    bean: &SharedBean,
    property: &str,
    value: impl Into<Value>,
) -> Result<(), RenderError> {
    bean.lock().set_property(property, value.into())
}

/// Sets one property from request text.
///
/// Missing text is ignored, and so is empty text that came from a request
/// parameter. With `ignore_missing` a property the bean does not list is
/// skipped instead of reported.
pub fn introspect_helper(
    bean: &SharedBean,
    property: &str,
    value: Option<Value>,
    param: Option<&str>,
    ignore_missing: bool,
) -> Result<(), RenderError> {
    let Some(value) = value else {
        return Ok(());
    };
    if param.is_some() && value.as_text().is_some_and(str::is_empty) {
        return Ok(());
    }
    let mut guard = bean.lock();
    if ignore_missing && !guard.property_names().contains(&property) {
        trace!(property, "request parameter has no matching bean property");
        return Ok(());
    }
    guard.set_property(property, value)
}

fn parameter_value(ctx: &PageContext, param: &str) -> Option<Value> {
    let values = ctx.request().parameter_values(param);
    match values {
        [] => None,
        [single] => Some(Value::from(single.as_str())),
        many => Some(Value::List(
            many.iter().map(|v| Value::from(v.as_str())).collect(),
        )),
    }
}

/// `property` takes the value of request parameter `param`.
pub fn set_property_from_param(
    ctx: &mut PageContext,
    bean: &SharedBean,
    property: &str,
    param: &str,
) -> Result<(), RenderError> {
    let value = parameter_value(ctx, param);
    introspect_helper(bean, property, value, Some(param), false)
}

/// Copies every request parameter onto the bean property of the same name.
pub fn introspect(ctx: &mut PageContext, bean: &SharedBean) -> Result<(), RenderError> {
    let names: Vec<String> = ctx
        .request()
        .parameter_names()
        .map(str::to_string)
        .collect();
    for name in names {
        let value = parameter_value(ctx, &name);
        introspect_helper(bean, &name, value, Some(&name), true)?;
    }
    Ok(())
}

/// Fragment stored in page scope under `name`, as tag definitions expose
/// their fragment attributes and body.
pub fn page_fragment(ctx: &mut PageContext, name: &str) -> Result<Option<Fragment>, RenderError> {
    Ok(ctx.get_attribute(name)?.as_ref().and_then(Fragment::from_value))
}

// Output and URLs.

pub fn to_output_string(value: &Value) -> String {
    value.to_output()
}

pub fn url_encode(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

/// Appends URL-encoded `name=value` pairs to `target`, joining with `?` for
/// the first pair unless the target already carries a query.
pub fn url_with_params(target: &str, params: &[(&str, String)]) -> String {
    let mut url = target.to_string();
    let mut separator = if target.contains('?') { '&' } else { '?' };
    for (name, value) in params {
        url.push(separator);
        url.push_str(&url_encode(name));
        url.push('=');
        url.push_str(&url_encode(value));
        separator = '&';
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Align {
        Left,
        Right,
    }

    impl FromStr for Align {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "Left" => Ok(Align::Left),
                "Right" => Ok(Align::Right),
                _ => Err(()),
            }
        }
    }

    #[test]
    fn numeric_coercion_treats_empty_as_zero() {
        assert_eq!(coerce_to_i32("").unwrap(), 0);
        assert_eq!(coerce_to_f64(" 1.5 ").unwrap(), 1.5);
        assert!(matches!(coerce_to_u8("-1"), Err(RenderError::Argument(_))));
    }

    #[test]
    fn enum_and_optional_coercions() {
        assert_eq!(coerce_to_enum::<Align>("Right").unwrap(), Align::Right);
        assert!(coerce_to_enum::<Align>("Up").is_err());
        assert_eq!(coerce_to_optional::<i64>("n", "").unwrap(), None);
        assert_eq!(coerce_to_optional::<i64>("n", "7").unwrap(), Some(7));
        assert_eq!(Align::Left, coerce_to_enum::<Align>("Left").unwrap());
    }

    #[derive(Default)]
    struct Upper(String);

    impl PropertyEditor for Upper {
        type Target = String;

        fn set_as_text(&mut self, text: &str) -> Result<(), RenderError> {
            if text.is_empty() {
                return Err(RenderError::argument("empty"));
            }
            self.0 = text.to_uppercase();
            Ok(())
        }

        fn value(self) -> String {
            self.0
        }
    }

    #[test]
    fn editor_failure_names_the_attribute() {
        assert_eq!(convert_with_editor::<Upper>("title", "abc").unwrap(), "ABC");
        let err = convert_with_editor::<Upper>("title", "").unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn params_are_encoded_and_joined() {
        let url = url_with_params(
            "/a.tsr",
            &[("q", "x y".to_string()), ("k&", "1=2".to_string())],
        );
        assert_eq!(url, "/a.tsr?q=x+y&k%26=1%3D2");
        assert_eq!(url_with_params("/a?z=1", &[("b", "2".to_string())]), "/a?z=1&b=2");
    }
}
