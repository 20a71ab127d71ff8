use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::{PageContext, ScopeMark};
use crate::error::RenderError;
use crate::tag::TagRef;

/// Shared count of bodies pushed inside an interposing tag, so its catch path
/// can pop exactly those.
#[derive(Debug, Clone, Default)]
pub struct PushBodyCount(Arc<AtomicUsize>);

impl PushBodyCount {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrement(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Resets the count, returning what it held.
    pub fn take(&self) -> usize {
        self.0.swap(0, Ordering::AcqRel)
    }
}

/// Generated routine that renders one fragment body.
pub type FragmentBody = fn(&Fragment, &mut PageContext) -> Result<(), RenderError>;

/// Deferred, repeatable tag body.
///
/// A fragment records which generated body to run (`discriminator`), the page
/// scope it was created in, the enclosing handler and the push counter of the
/// nearest interposing tag. The running context is passed at invocation.
#[derive(Clone)]
pub struct Fragment {
    discriminator: u32,
    scope: ScopeMark,
    parent: Option<TagRef>,
    push_count: Option<PushBodyCount>,
    body: FragmentBody,
}

impl Fragment {
    pub fn new(
        discriminator: u32,
        scope: ScopeMark,
        parent: Option<TagRef>,
        push_count: Option<PushBodyCount>,
        body: FragmentBody,
    ) -> Self {
        Self {
            discriminator,
            scope,
            parent,
            push_count,
            body,
        }
    }

    pub fn discriminator(&self) -> u32 {
        self.discriminator
    }

    pub fn parent(&self) -> Option<TagRef> {
        self.parent.clone()
    }

    pub fn push_count(&self) -> Option<PushBodyCount> {
        self.push_count.clone()
    }

    /// Renders the body into the current output.
    pub fn invoke(&self, ctx: &mut PageContext) -> Result<(), RenderError> {
        let body = self.body;
        ctx.run_in_scope(self.scope, |ctx| body(self, ctx))
            .map_err(RenderError::wrap_tag)
    }

    /// Renders the body into a pushed buffer and appends the text to `out`.
    /// The buffer is popped whether or not the body succeeds.
    pub fn invoke_into(&self, ctx: &mut PageContext, out: &mut String) -> Result<(), RenderError> {
        let handle = ctx.push_body();
        let result = self.invoke(ctx);
        out.push_str(&ctx.body_text(handle));
        ctx.pop_body();
        result
    }

    pub fn invoke_to_string(&self, ctx: &mut PageContext) -> Result<String, RenderError> {
        let mut out = String::new();
        self.invoke_into(ctx, &mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("discriminator", &self.discriminator)
            .field("scope", &self.scope)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_count_never_underflows() {
        let count = PushBodyCount::default();
        count.decrement();
        assert_eq!(count.get(), 0);
        count.increment();
        count.increment();
        let shared = count.clone();
        shared.decrement();
        assert_eq!(count.take(), 1);
        assert_eq!(shared.get(), 0);
    }
}
