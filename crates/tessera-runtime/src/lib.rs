#![deny(clippy::unwrap_used)]

mod bean;
mod charset;
mod context;
mod el;
mod error;
mod exchange;
mod fragment;
mod pool;
mod scope;
mod support;
mod tag;
mod value;
mod writer;

pub use bean::{Bean, BeanSource, SharedBean, shared_bean, with_bean};
pub use charset::Charset;
pub use context::{BodyHandle, PageContext, PageSettings, ScopeMark};
pub use el::{ExpressionEvaluator, ScopedEvaluator, coerce};
pub use error::{RenderError, ScopeError};
pub use exchange::{Application, BeanFactory, Exchange, Request, Response, Unit, attrs};
pub use fragment::{Fragment, FragmentBody, PushBodyCount};
pub use pool::{DEFAULT_POOL_CAPACITY, TagHandlerPool, TagPoolRegistry};
pub use scope::{AttributeStore, MemoryStore, Scope, Session};
pub use support::{
    FromAttributeText, PropertyEditor, coerce_to_bool, coerce_to_char, coerce_to_enum,
    coerce_to_f32, coerce_to_f64, coerce_to_i8, coerce_to_i16, coerce_to_i32, coerce_to_i64,
    coerce_to_optional, coerce_to_u8, coerce_to_u16, coerce_to_u32, coerce_to_u64,
    coerce_to_usize, convert_with_editor, find_bean, handle_get_property, handle_set_property,
    introspect, introspect_helper, page_fragment, set_property_from_param, to_output_string,
    url_encode, url_with_params,
};
pub use tag::{
    AfterBody, AsAny, BodyTag, BodyTagSupport, DynamicAttributes, EndResult, IterationTag,
    JspTag, SimpleTag, SimpleTagSupport, StartResult, Tag, TagRef, TagSupport, TryCatchFinally,
    find_ancestor_with,
};
pub use value::{ExpectedType, FromValue, Implicit, Value, sync_value};
pub use writer::{BodyContent, JspWriter, PageWriter};

/// Everything a generated unit refers to by bare name.
pub mod prelude {
    pub use std::sync::{Arc, OnceLock};

    pub use indexmap::IndexMap;
    pub use parking_lot;

    pub use crate::*;
}
