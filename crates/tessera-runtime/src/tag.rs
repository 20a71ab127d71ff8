use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::context::{BodyHandle, PageContext};
use crate::error::RenderError;
use crate::fragment::Fragment;
use crate::value::Value;

/// Type-erasure hooks shared by every tag handler.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub type TagRef = Arc<dyn JspTag>;

/// Common base of classic and fragment-lifecycle handlers.
///
/// Handlers are shared behind `Arc` and receive `&self`; state that setters or
/// lifecycle calls change lives behind interior mutability.
pub trait JspTag: AsAny {
    fn parent(&self) -> Option<TagRef>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    SkipBody,
    IncludeBody,
    BufferBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterBody {
    Again,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndResult {
    Continue,
    SkipPage,
}

/// Classic lifecycle: start, optional body, end.
pub trait Tag: JspTag {
    fn set_parent(&self, parent: Option<TagRef>);

    fn do_start_tag(&self, ctx: &mut PageContext) -> Result<StartResult, RenderError> {
        let _ = ctx;
        Ok(StartResult::SkipBody)
    }

    fn do_end_tag(&self, ctx: &mut PageContext) -> Result<EndResult, RenderError> {
        let _ = ctx;
        Ok(EndResult::Continue)
    }

    /// Drops per-use state before the handler is discarded.
    fn release(&self) {}
}

pub trait IterationTag: Tag {
    fn do_after_body(&self, ctx: &mut PageContext) -> Result<AfterBody, RenderError>;
}

/// Classic handler whose body may be captured into a pushed buffer.
pub trait BodyTag: IterationTag {
    fn set_body_content(&self, body: BodyHandle);

    fn do_init_body(&self, ctx: &mut PageContext) -> Result<(), RenderError> {
        let _ = ctx;
        Ok(())
    }
}

/// Structured interposition around the start/body/end sequence.
pub trait TryCatchFinally {
    fn do_catch(&self, err: RenderError) -> Result<(), RenderError>;
    fn do_finally(&self);
}

/// Fragment lifecycle: one `do_tag` call with the body passed as a fragment.
pub trait SimpleTag: JspTag {
    fn set_parent(&self, parent: Option<TagRef>);
    fn set_body(&self, body: Fragment);
    fn do_tag(&self, ctx: &mut PageContext) -> Result<(), RenderError>;
}

pub trait DynamicAttributes {
    fn set_dynamic_attribute(
        &self,
        uri: Option<&str>,
        name: &str,
        value: Value,
    ) -> Result<(), RenderError>;
}

/// Walks the parent chain starting above `from` and returns the nearest
/// handler of type `T`.
pub fn find_ancestor_with<T: JspTag>(from: &dyn JspTag) -> Option<Arc<T>> {
    let mut current = from.parent();
    while let Some(tag) = current {
        let next = tag.parent();
        if let Ok(found) = tag.into_any().downcast::<T>() {
            return Some(found);
        }
        current = next;
    }
    None
}

/// Reusable state for classic handlers: parent link, id and a value map.
#[derive(Default)]
pub struct TagSupport {
    parent: Mutex<Option<TagRef>>,
    id: Mutex<Option<String>>,
    values: Mutex<IndexMap<String, Value>>,
}

impl TagSupport {
    pub fn parent(&self) -> Option<TagRef> {
        self.parent.lock().clone()
    }

    pub fn set_parent(&self, parent: Option<TagRef>) {
        *self.parent.lock() = parent;
    }

    pub fn id(&self) -> Option<String> {
        self.id.lock().clone()
    }

    pub fn set_id(&self, id: String) {
        *self.id.lock() = Some(id);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn set_value(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_string(), value);
    }

    /// Clears everything so a pooled handler starts fresh.
    pub fn release(&self) {
        *self.parent.lock() = None;
        *self.id.lock() = None;
        self.values.lock().clear();
    }
}

/// [`TagSupport`] plus the body buffer handed to a buffering handler.
#[derive(Default)]
pub struct BodyTagSupport {
    pub support: TagSupport,
    body: Mutex<Option<BodyHandle>>,
}

impl BodyTagSupport {
    pub fn body_content(&self) -> Option<BodyHandle> {
        *self.body.lock()
    }

    pub fn set_body_content(&self, body: BodyHandle) {
        *self.body.lock() = Some(body);
    }

    /// Writes the captured body to the writer that enclosed it.
    pub fn write_body_out(&self, ctx: &mut PageContext) -> Result<(), RenderError> {
        if let Some(handle) = self.body_content() {
            let text = ctx.body_text(handle);
            ctx.enclosing_writer(handle).write_str(&text)?;
        }
        Ok(())
    }

    pub fn release(&self) {
        self.support.release();
        *self.body.lock() = None;
    }
}

/// Parent link and body fragment for fragment-lifecycle handlers.
#[derive(Default)]
pub struct SimpleTagSupport {
    parent: Mutex<Option<TagRef>>,
    body: Mutex<Option<Fragment>>,
}

impl SimpleTagSupport {
    pub fn parent(&self) -> Option<TagRef> {
        self.parent.lock().clone()
    }

    pub fn set_parent(&self, parent: Option<TagRef>) {
        *self.parent.lock() = parent;
    }

    pub fn body(&self) -> Option<Fragment> {
        self.body.lock().clone()
    }

    pub fn set_body(&self, body: Fragment) {
        *self.body.lock() = Some(body);
    }
}
