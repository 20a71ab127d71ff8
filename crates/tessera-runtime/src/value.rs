use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::bean::SharedBean;
use crate::fragment::Fragment;

/// Implicit objects bound into page scope on first unscoped access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Implicit {
    Out,
    Request,
    Response,
    Session,
    Page,
    Config,
    PageContext,
    Application,
}

impl Implicit {
    pub fn binding_name(self) -> &'static str {
        match self {
            Implicit::Out => "out",
            Implicit::Request => "request",
            Implicit::Response => "response",
            Implicit::Session => "session",
            Implicit::Page => "page",
            Implicit::Config => "config",
            Implicit::PageContext => "pageContext",
            Implicit::Application => "application",
        }
    }
}

/// Dynamically typed attribute value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Bean(SharedBean),
    Object(Arc<dyn Any + Send + Sync>),
    Implicit(Implicit),
}

impl Value {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Borrows the payload of an `Object` value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Value::Object(obj) => obj.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// True when both values point at the same shared allocation.
    pub fn same_object<T: ?Sized>(&self, other: &Arc<T>) -> bool {
        let other = Arc::as_ptr(other) as *const ();
        match self {
            Value::Object(obj) => Arc::as_ptr(obj) as *const () == other,
            Value::Bean(bean) => Arc::as_ptr(bean) as *const () == other,
            _ => false,
        }
    }

    /// Text used when the value is written to template output.
    pub fn to_output(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn member(&self, name: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(name).cloned(),
            Value::Bean(bean) => bean.lock().property(name),
            Value::List(items) => name.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Text(t) => t.eq_ignore_ascii_case("true"),
            _ => true,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Text(t) => write!(f, "Text({t:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Bean(_) => f.write_str("Bean(..)"),
            Value::Object(_) => f.write_str("Object(..)"),
            Value::Implicit(kind) => write!(f, "Implicit({kind:?})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(t) => f.write_str(t),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            Value::Bean(_) => f.write_str("[bean]"),
            Value::Object(_) => f.write_str("[object]"),
            Value::Implicit(kind) => f.write_str(kind.binding_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Bean(a), Value::Bean(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Implicit(a), Value::Implicit(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::Int(n as i64)
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Text(c.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<SharedBean> for Value {
    fn from(bean: SharedBean) -> Self {
        Value::Bean(bean)
    }
}

impl From<Fragment> for Value {
    fn from(fragment: Fragment) -> Self {
        Value::Object(Arc::new(fragment))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Type an expression result is coerced to before it reaches its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Any,
    Text,
    Bool,
    Int,
    Float,
}

/// Conversion from an attribute value into a typed local or setter argument.
///
/// Numbers and booleans parse from text the way expression coercion does.
pub trait FromValue: Sized {
    const EXPECTED: ExpectedType = ExpectedType::Any;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    const EXPECTED: ExpectedType = ExpectedType::Text;

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.to_output())
    }
}

impl FromValue for bool {
    const EXPECTED: ExpectedType = ExpectedType::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(false),
            Value::Bool(b) => Some(*b),
            Value::Text(t) => Some(t.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }
}

impl FromValue for char {
    const EXPECTED: ExpectedType = ExpectedType::Text;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some('\0'),
            Value::Text(t) => Some(t.chars().next().unwrap_or('\0')),
            _ => None,
        }
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Null => Some(0),
        Value::Int(n) => Some(*n),
        Value::Float(x) => Some(*x as i64),
        Value::Bool(_) => None,
        Value::Text(t) if t.trim().is_empty() => Some(0),
        Value::Text(t) => t.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        Value::Text(t) if t.trim().is_empty() => Some(0.0),
        Value::Text(t) => t.trim().parse::<f64>().ok(),
        _ => None,
    }
}

macro_rules! from_value_int {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            const EXPECTED: ExpectedType = ExpectedType::Int;

            fn from_value(value: &Value) -> Option<Self> {
                value_as_i64(value).and_then(|n| <$ty>::try_from(n).ok())
            }
        })*
    };
}

from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    const EXPECTED: ExpectedType = ExpectedType::Float;

    fn from_value(value: &Value) -> Option<Self> {
        value_as_f64(value)
    }
}

impl FromValue for f32 {
    const EXPECTED: ExpectedType = ExpectedType::Float;

    fn from_value(value: &Value) -> Option<Self> {
        value_as_f64(value).map(|x| x as f32)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: ExpectedType = T::EXPECTED;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for SharedBean {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bean(bean) => Some(bean.clone()),
            _ => None,
        }
    }
}

impl FromValue for Fragment {
    fn from_value(value: &Value) -> Option<Self> {
        value.downcast_ref::<Fragment>().cloned()
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Vec::new()),
            Value::List(items) => Some(items.clone()),
            _ => None,
        }
    }
}

/// Reads a scripting variable back out of an attribute lookup.
pub fn sync_value<T: FromValue>(found: Option<Value>) -> Option<T> {
    found.as_ref().and_then(T::from_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_text_coerces_like_expressions() {
        assert_eq!(i32::from_value(&Value::from(" 42 ")), Some(42));
        assert_eq!(i32::from_value(&Value::from("")), Some(0));
        assert_eq!(u8::from_value(&Value::Int(300)), None);
        assert_eq!(f64::from_value(&Value::from("2.5")), Some(2.5));
    }

    #[test]
    fn option_maps_null_to_none() {
        assert_eq!(Option::<i64>::from_value(&Value::Null), Some(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(3)), Some(Some(3)));
    }

    #[test]
    fn output_of_null_is_empty() {
        assert_eq!(Value::Null.to_output(), "");
        assert_eq!(Value::List(vec![1.into(), "a".into()]).to_output(), "[1, a]");
    }
}
