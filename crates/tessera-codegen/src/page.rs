use serde::{Deserialize, Serialize};

use crate::node::{ParamType, VarScope};

const PLUGIN_IE_URL: &str =
    "http://java.sun.com/products/plugin/1.2.2/jinstall-1_2_2-win.cab#Version=1,2,2,0";

/// Page-level metadata collected by the validator from directives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Identifier-safe name of the unit; also the generated type's name stem.
    pub unit_name: String,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub kind: UnitKind,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// `Some(0)` means unbuffered; `None` takes the compiler default.
    #[serde(default)]
    pub buffer_size: Option<usize>,
    #[serde(default = "default_true")]
    pub auto_flush: bool,
    #[serde(default = "default_true")]
    pub session: bool,
    #[serde(default)]
    pub error_page: Option<String>,
    #[serde(default)]
    pub is_error_page: bool,
    #[serde(default = "default_true")]
    pub thread_safe: bool,
    #[serde(default = "default_true")]
    pub scripting_enabled: bool,
    #[serde(default)]
    pub el_ignored: bool,
    #[serde(default)]
    pub deferred_syntax_allowed_as_literal: bool,
    /// Base type named by an extends clause; disables tag pooling.
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    /// Files this unit was built from, for staleness checks.
    #[serde(default)]
    pub dependants: Vec<String>,
    #[serde(default)]
    pub info: Option<String>,
}

impl PageInfo {
    pub fn new(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            source_path: None,
            kind: UnitKind::Page,
            content_type: default_content_type(),
            buffer_size: None,
            auto_flush: true,
            session: true,
            error_page: None,
            is_error_page: false,
            thread_safe: true,
            scripting_enabled: true,
            el_ignored: false,
            deferred_syntax_allowed_as_literal: false,
            extends: None,
            imports: Vec::new(),
            dependants: Vec::new(),
            info: None,
        }
    }

    pub fn is_tag_definition(&self) -> bool {
        matches!(self.kind, UnitKind::TagDefinition(_))
    }
}

fn default_content_type() -> String {
    "text/html".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitKind {
    #[default]
    Page,
    /// A template that defines a fragment-lifecycle tag handler.
    TagDefinition(TagDefinition),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TagDefinition {
    pub attributes: Vec<TagDefAttribute>,
    pub variables: Vec<TagDefVariable>,
    /// Page-scope name of the dynamic-attribute map, when accepted.
    pub dynamic_attributes: Option<String>,
}

impl TagDefinition {
    /// Variables copied back to the caller before a fragment runs.
    pub fn names_synced_before_invoke(&self) -> Vec<&str> {
        self.names_in(&[VarScope::Nested, VarScope::AtBegin])
    }

    /// Variables copied back to the caller when the tag ends.
    pub fn names_synced_at_end(&self) -> Vec<&str> {
        self.names_in(&[VarScope::AtBegin, VarScope::AtEnd])
    }

    fn names_in(&self, scopes: &[VarScope]) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|var| scopes.contains(&var.scope))
            .map(|var| var.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefAttribute {
    pub name: String,
    pub param_type: ParamType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefVariable {
    pub name: String,
    pub scope: VarScope,
}

/// Compiler switches the generator honours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub pooling_enabled: bool,
    pub tag_pool_size: usize,
    /// One output statement per template line.
    pub mapped_file: bool,
    pub gen_string_as_byte_array: bool,
    pub error_on_use_bean_invalid_class_attribute: bool,
    pub x_powered_by: bool,
    /// Drop template text that is only whitespace.
    pub trim_spaces: bool,
    pub default_buffer_size: usize,
    /// Crate name generated units import the runtime from.
    pub runtime_crate: String,
    pub plugin_ie_class_id: String,
    pub plugin_ie_url: String,
    pub plugin_ns_url: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            pooling_enabled: true,
            tag_pool_size: tessera_runtime::DEFAULT_POOL_CAPACITY,
            mapped_file: false,
            gen_string_as_byte_array: true,
            error_on_use_bean_invalid_class_attribute: true,
            x_powered_by: false,
            trim_spaces: false,
            default_buffer_size: 8192,
            runtime_crate: "tessera_runtime".into(),
            plugin_ie_class_id: "clsid:8AD9C840-044E-11D1-B3E9-00805F499D93".into(),
            plugin_ie_url: PLUGIN_IE_URL.into(),
            plugin_ns_url: "http://java.sun.com/products/plugin/".into(),
        }
    }
}
