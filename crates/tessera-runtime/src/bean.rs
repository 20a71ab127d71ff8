use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RenderError;
use crate::value::Value;

/// Named-property access used by the bean actions.
///
/// Implementors expose readable properties through [`Bean::property`] and
/// writable ones through [`Bean::set_property`]; request-parameter
/// introspection only touches names listed by [`Bean::property_names`].
pub trait Bean: Any + Send + Sync {
    fn property(&self, name: &str) -> Option<Value>;

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), RenderError> {
        let _ = value;
        Err(RenderError::Property(format!(
            "no setter for property `{name}`"
        )))
    }

    fn property_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type SharedBean = Arc<Mutex<dyn Bean>>;

pub fn shared_bean<B: Bean>(bean: B) -> SharedBean {
    Arc::new(Mutex::new(bean))
}

/// Runs `f` against the concrete bean type behind a shared handle.
pub fn with_bean<B: Bean, R>(
    bean: &SharedBean,
    f: impl FnOnce(&mut B) -> R,
) -> Result<R, RenderError> {
    let mut guard = bean.lock();
    match guard.as_any_mut().downcast_mut::<B>() {
        Some(typed) => Ok(f(typed)),
        None => Err(RenderError::Property(format!(
            "bean is not a {}",
            std::any::type_name::<B>()
        ))),
    }
}

/// How a `useBean` action produces an instance when the scope has none.
#[derive(Clone, Copy)]
pub enum BeanSource {
    Factory(fn() -> SharedBean),
    /// Instantiated at request time through the application's bean registry.
    Named(&'static str),
    /// Only a type was declared, so a missing bean is an error.
    Absent,
}
