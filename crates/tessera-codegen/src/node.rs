//! The validated template tree handed to the generator.
//!
//! Nodes are produced by the template parser and validator and arrive as
//! JSON; the generator only reads them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub position: Position,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            position: Position::default(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// The named-attribute child supplying attribute `name`.
    pub fn named_attribute(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(
            |child| matches!(&child.kind, NodeKind::NamedAttribute { name: n, .. } if n == name),
        )
    }

    /// Children that make up the body proper, without named attributes.
    pub fn body_children(&self) -> impl Iterator<Item = &Node> {
        self.children
            .iter()
            .filter(|child| !matches!(child.kind, NodeKind::NamedAttribute { .. }))
    }

    pub fn has_body_children(&self) -> bool {
        self.body_children().next().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    TemplateText {
        text: String,
    },
    /// Host-language expression whose value is written to the output.
    Expression {
        code: String,
    },
    Scriptlet {
        code: String,
    },
    /// Host-language items placed at module level of the unit.
    Declaration {
        code: String,
    },
    /// Expression-language text between `${` and `}`.
    ElExpression {
        expression: String,
    },
    ExtensionTag(TagNode),
    NamedAttribute {
        name: String,
        /// Element constructors only: leave the attribute out when true.
        #[serde(default)]
        omit: Option<AttrValue>,
    },
    JspBody,
    IncludeAction {
        page: AttrValue,
        #[serde(default)]
        flush: bool,
    },
    ForwardAction {
        page: AttrValue,
    },
    Param {
        name: String,
        value: AttrValue,
    },
    Params,
    Fallback,
    UseBean {
        id: String,
        #[serde(default)]
        scope: ScopeName,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        bean_name: Option<AttrValue>,
        #[serde(default)]
        type_name: Option<String>,
        #[serde(default = "default_true")]
        class_instantiable: bool,
    },
    SetProperty {
        name: String,
        property: String,
        #[serde(default)]
        param: Option<String>,
        #[serde(default)]
        value: Option<AttrValue>,
        /// Typed setter used when the bean's type is known.
        #[serde(default)]
        setter: Option<String>,
    },
    GetProperty {
        name: String,
        property: String,
        #[serde(default)]
        getter: Option<String>,
    },
    PlugIn(PlugIn),
    UninterpretedMarkup {
        qname: String,
        #[serde(default)]
        attributes: Vec<MarkupAttribute>,
    },
    ElementConstructor {
        name: AttrValue,
    },
    /// Invokes a fragment attribute of the enclosing tag definition.
    InvokeFragment {
        fragment: String,
        #[serde(default)]
        var: Option<String>,
        #[serde(default)]
        var_reader: Option<String>,
        #[serde(default)]
        scope: ScopeName,
    },
    /// Invokes the body passed to the enclosing tag definition.
    DoBody {
        #[serde(default)]
        var: Option<String>,
        #[serde(default)]
        var_reader: Option<String>,
        #[serde(default)]
        scope: ScopeName,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::TemplateText { .. } => "template text",
            NodeKind::Expression { .. } => "expression",
            NodeKind::Scriptlet { .. } => "scriptlet",
            NodeKind::Declaration { .. } => "declaration",
            NodeKind::ElExpression { .. } => "EL expression",
            NodeKind::ExtensionTag(_) => "extension tag",
            NodeKind::NamedAttribute { .. } => "named attribute",
            NodeKind::JspBody => "body",
            NodeKind::IncludeAction { .. } => "include action",
            NodeKind::ForwardAction { .. } => "forward action",
            NodeKind::Param { .. } => "param",
            NodeKind::Params => "params",
            NodeKind::Fallback => "fallback",
            NodeKind::UseBean { .. } => "useBean",
            NodeKind::SetProperty { .. } => "setProperty",
            NodeKind::GetProperty { .. } => "getProperty",
            NodeKind::PlugIn(_) => "plugin",
            NodeKind::UninterpretedMarkup { .. } => "markup",
            NodeKind::ElementConstructor { .. } => "element",
            NodeKind::InvokeFragment { .. } => "invoke",
            NodeKind::DoBody { .. } => "doBody",
        }
    }
}

fn default_true() -> bool {
    true
}

/// How an attribute's value is supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Literal(String),
    /// Host-language expression inlined verbatim.
    Runtime(String),
    /// Full expression-language text including the `${...}` delimiters.
    El(String),
    /// Supplied by the `NamedAttribute` child of the same name.
    Named,
}

impl AttrValue {
    pub fn literal(&self) -> Option<&str> {
        match self {
            AttrValue::Literal(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeName {
    #[default]
    Page,
    Request,
    Session,
    Application,
}

impl ScopeName {
    /// Path of the matching runtime scope constant.
    pub fn rust_path(self) -> &'static str {
        match self {
            ScopeName::Page => "Scope::Page",
            ScopeName::Request => "Scope::Request",
            ScopeName::Session => "Scope::Session",
            ScopeName::Application => "Scope::Application",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupAttribute {
    pub name: String,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlugIn {
    /// `bean` or `applet`.
    pub plugin_type: String,
    pub code: String,
    pub codebase: Option<String>,
    pub align: Option<String>,
    pub archive: Option<String>,
    pub height: Option<AttrValue>,
    pub hspace: Option<String>,
    pub jreversion: Option<String>,
    pub name: Option<String>,
    pub vspace: Option<String>,
    pub width: Option<AttrValue>,
    pub nspluginurl: Option<String>,
    pub iepluginurl: Option<String>,
}

/// An extension tag occurrence, already bound to its handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagNode {
    pub prefix: String,
    pub local_name: String,
    #[serde(default)]
    pub binding: Option<TagBinding>,
    #[serde(default)]
    pub attributes: Vec<TagAttribute>,
    #[serde(default)]
    pub variables: Vec<ScriptingVariable>,
    /// Number of enclosing tags with the same qualified name.
    #[serde(default)]
    pub nesting_level: u32,
    #[serde(default)]
    pub has_empty_body: bool,
    #[serde(default)]
    pub child_info: ChildInfo,
}

impl TagNode {
    pub fn qname(&self) -> String {
        format!("{}:{}", self.prefix, self.local_name)
    }

    pub fn attribute(&self, name: &str) -> Option<&TagAttribute> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name && !attr.dynamic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAttribute {
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    pub value: AttrValue,
    /// Not declared by the tag; passed through the dynamic-attribute hook.
    #[serde(default)]
    pub dynamic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarScope {
    AtBegin,
    Nested,
    AtEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptingVariable {
    #[serde(default)]
    pub name: Option<String>,
    /// Takes its name from the literal value of this tag attribute.
    #[serde(default)]
    pub name_from_attribute: Option<String>,
    pub type_name: String,
    pub scope: VarScope,
    #[serde(default = "default_true")]
    pub declare: bool,
}

/// Facts about a tag's body computed by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildInfo {
    /// No scriptlets, expressions or declarations anywhere below.
    pub scriptless: bool,
    /// Some tag below declares scripting variables.
    pub has_scripting_vars: bool,
}

/// Resolved handler metadata for one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagBinding {
    /// Rust path of the handler type.
    pub handler: String,
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub setters: IndexMap<String, SetterInfo>,
    #[serde(default)]
    pub dynamic_attributes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetterInfo {
    pub method: String,
    pub param_type: ParamType,
    /// Rust path of a `PropertyEditor` converting literal text.
    #[serde(default)]
    pub editor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassicKind {
    Plain,
    Iterating,
    Buffered,
}

/// Which lifecycle protocol a handler implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lifecycle {
    Classic,
    ClassicIterating,
    ClassicBuffered,
    ClassicInterposing { inner: ClassicKind },
    Fragment,
}

impl Lifecycle {
    fn classic_kind(self) -> Option<ClassicKind> {
        match self {
            Lifecycle::Classic => Some(ClassicKind::Plain),
            Lifecycle::ClassicIterating => Some(ClassicKind::Iterating),
            Lifecycle::ClassicBuffered => Some(ClassicKind::Buffered),
            Lifecycle::ClassicInterposing { inner } => Some(inner),
            Lifecycle::Fragment => None,
        }
    }

    pub fn is_fragment(self) -> bool {
        self == Lifecycle::Fragment
    }

    /// Buffered handlers iterate too.
    pub fn is_iteration(self) -> bool {
        matches!(
            self.classic_kind(),
            Some(ClassicKind::Iterating | ClassicKind::Buffered)
        )
    }

    pub fn is_body_tag(self) -> bool {
        self.classic_kind() == Some(ClassicKind::Buffered)
    }

    pub fn is_try_catch(self) -> bool {
        matches!(self, Lifecycle::ClassicInterposing { .. })
    }
}

/// Declared type of a setter parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum ParamType {
    Text,
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Optional(Box<ParamType>),
    /// A `FromStr` enum, looked up by exact variant name.
    Enum(String),
    Value,
    Fragment,
    /// Any other type converted through `FromAttributeText`.
    Other(String),
}

impl ParamType {
    pub fn rust_type(&self) -> String {
        match self {
            ParamType::Text => "String".into(),
            ParamType::Bool => "bool".into(),
            ParamType::Char => "char".into(),
            ParamType::I8 => "i8".into(),
            ParamType::I16 => "i16".into(),
            ParamType::I32 => "i32".into(),
            ParamType::I64 => "i64".into(),
            ParamType::U8 => "u8".into(),
            ParamType::U16 => "u16".into(),
            ParamType::U32 => "u32".into(),
            ParamType::U64 => "u64".into(),
            ParamType::Usize => "usize".into(),
            ParamType::F32 => "f32".into(),
            ParamType::F64 => "f64".into(),
            ParamType::Optional(inner) => format!("Option<{}>", inner.rust_type()),
            ParamType::Enum(path) | ParamType::Other(path) => path.clone(),
            ParamType::Value => "Value".into(),
            ParamType::Fragment => "Fragment".into(),
        }
    }

    /// Name of the runtime `coerce_to_*` function for fixed-coercion types.
    pub(crate) fn coercion_fn(&self) -> Option<&'static str> {
        Some(match self {
            ParamType::I8 => "coerce_to_i8",
            ParamType::I16 => "coerce_to_i16",
            ParamType::I32 => "coerce_to_i32",
            ParamType::I64 => "coerce_to_i64",
            ParamType::U8 => "coerce_to_u8",
            ParamType::U16 => "coerce_to_u16",
            ParamType::U32 => "coerce_to_u32",
            ParamType::U64 => "coerce_to_u64",
            ParamType::Usize => "coerce_to_usize",
            ParamType::F32 => "coerce_to_f32",
            ParamType::F64 => "coerce_to_f64",
            _ => return None,
        })
    }
}
