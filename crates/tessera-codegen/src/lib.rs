#![deny(clippy::unwrap_used)]

//! Turns a validated template tree into the Rust source of one unit.
//!
//! The tree is walked once, depth first; every node appends to the render
//! routine of the unit or, for split tags and fragment bodies, to a routine
//! of its own. Generation is pure: the same tree, page metadata and options
//! always produce the same bytes.

mod actions;
mod attributes;
mod context;
mod error;
mod fragments;
mod names;
mod node;
mod page;
mod tags;
mod text;
mod unit;
mod vars;
mod visit;
mod writer;

use tracing::debug;

pub use error::{CodegenError, Position};
pub use names::{PoolSignature, mangle, unit_type_name};
pub use node::{
    AttrValue, ChildInfo, ClassicKind, Lifecycle, MarkupAttribute, Node, NodeKind, ParamType,
    PlugIn, ScopeName, ScriptingVariable, SetterInfo, TagAttribute, TagBinding, TagNode, VarScope,
};
pub use page::{
    GeneratorOptions, PageInfo, TagDefAttribute, TagDefVariable, TagDefinition, UnitKind,
};
pub use text::{CHUNK_SIZE, PER_CHAR_LIMIT};

/// Generates the source of the unit described by `page` from its tree.
pub fn generate(
    root: &[Node],
    page: &PageInfo,
    options: &GeneratorOptions,
) -> Result<String, CodegenError> {
    let mut acc = context::Accumulator::new(options, page);
    let source = unit::generate_unit(root, page, &mut acc)?;
    debug!(
        unit = %page.unit_name,
        methods = acc.methods.len(),
        fragments = acc.fragments.len(),
        pools = acc.pools.names().count(),
        bytes = source.len(),
        "unit generated"
    );
    Ok(source)
}
