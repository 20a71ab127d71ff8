//! Generation state: an immutable [`Frame`] per emission site and one
//! [`Accumulator`] per compile.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::names::{PoolNames, mangle};
use crate::page::{GeneratorOptions, PageInfo};

/// How code in the current routine stops the rest of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipStyle {
    /// The routine returns `Result<bool, _>` and reports skip as `Ok(true)`.
    Flag,
    /// The routine returns `Result<(), _>` and raises `SkipPage`.
    Raise,
}

/// Where emitted code runs. Cloned and adjusted for nested regions.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    /// Expression yielding the enclosing handler as `Option<TagRef>`.
    pub parent: Option<String>,
    /// Local of type `Option<PushBodyCount>` owned by the nearest
    /// interposing tag, if any.
    pub push_count: Option<String>,
    pub method_nesting: u32,
    pub in_fragment: bool,
    pub skip: SkipStyle,
    /// Literal text may be written from pre-encoded byte constants.
    pub gen_bytes: bool,
    /// Fragment-lifecycle handler whose body an explicit body element sets.
    pub simple_tag_body: Option<String>,
}

impl Frame {
    pub(crate) fn top(skip: SkipStyle, gen_bytes: bool) -> Self {
        Self {
            parent: None,
            push_count: None,
            method_nesting: 0,
            in_fragment: false,
            skip,
            gen_bytes,
            simple_tag_body: None,
        }
    }

    pub(crate) fn parent_expr(&self) -> String {
        self.parent.clone().unwrap_or_else(|| "None".into())
    }

    pub(crate) fn push_count_expr(&self) -> String {
        match &self.push_count {
            Some(var) => format!("{var}.clone()"),
            None => "None".into(),
        }
    }

    pub(crate) fn skip_stmt(&self) -> &'static str {
        match self.skip {
            SkipStyle::Flag => "return Ok(true);",
            SkipStyle::Raise => "return Err(RenderError::SkipPage);",
        }
    }

    /// Body of a handler: the handler becomes the parent, explicit body
    /// elements no longer target an outer fragment handler.
    pub(crate) fn under_handler(&self, handler_var: &str) -> Self {
        Self {
            parent: Some(format!("Some({handler_var}.clone() as TagRef)")),
            simple_tag_body: None,
            ..self.clone()
        }
    }

    pub(crate) fn scripting_allowed(&self, page: &PageInfo) -> bool {
        page.scripting_enabled && !self.in_fragment && self.method_nesting == 0
    }
}

/// Mutable state shared by every emitter during one compile.
pub(crate) struct Accumulator<'a> {
    pub options: &'a GeneratorOptions,
    pub page: &'a PageInfo,
    pub pooling: bool,
    /// Split methods, in the order they were started.
    pub methods: Vec<String>,
    /// Fragment bodies indexed by discriminator.
    pub fragments: Vec<String>,
    /// Literal text constants and their index.
    pub texts: IndexMap<String, usize>,
    pub pools: PoolNames,
    /// Type paths of beans declared by `useBean`, by id.
    pub beans: FxHashMap<String, String>,
    tag_numbers: FxHashMap<String, u32>,
    temp: u32,
}

impl<'a> Accumulator<'a> {
    pub(crate) fn new(options: &'a GeneratorOptions, page: &'a PageInfo) -> Self {
        Self {
            options,
            page,
            pooling: options.pooling_enabled && page.extends.is_none(),
            methods: Vec::new(),
            fragments: Vec::new(),
            texts: IndexMap::new(),
            pools: PoolNames::default(),
            beans: FxHashMap::default(),
            tag_numbers: FxHashMap::default(),
            temp: 0,
        }
    }

    /// `<prefix>_<local>_<n>`, numbered per qualified name from 0.
    pub(crate) fn tag_var_base(&mut self, prefix: &str, local: &str) -> String {
        let key = format!("{prefix}:{local}");
        let n = self.tag_numbers.entry(key).or_insert(0);
        let base = mangle(&format!("{prefix}_{local}_{n}"));
        *n += 1;
        base
    }

    pub(crate) fn temp_var(&mut self, stem: &str) -> String {
        let name = format!("_{stem}_{}", self.temp);
        self.temp += 1;
        name
    }

    /// Index of the constant holding `text`, registering it on first use.
    pub(crate) fn text_constant(&mut self, text: &str) -> usize {
        let next = self.texts.len();
        *self.texts.entry(text.to_string()).or_insert(next)
    }

    pub(crate) fn reserve_method(&mut self) -> usize {
        self.methods.push(String::new());
        self.methods.len() - 1
    }

    pub(crate) fn reserve_fragment(&mut self) -> usize {
        self.fragments.push(String::new());
        self.fragments.len() - 1
    }
}
