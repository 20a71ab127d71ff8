#![deny(clippy::unwrap_used)]

mod options;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tessera_codegen::{CodegenError, Node, PageInfo, generate};
use tracing::{debug, info};

pub use options::CompilerOptions;

fn trace_timing() -> bool {
    std::env::var("TESSERA_TRACE_TIMING").is_ok_and(|v| v == "1")
}

macro_rules! timing_step {
    ($trace:expr, $label:expr, $block:expr) => {{
        let _t0 = if $trace { Some(Instant::now()) } else { None };
        let result = $block;
        if let Some(t0) = _t0 {
            debug!(
                step = $label,
                ms = t0.elapsed().as_secs_f64() * 1000.0,
                "timing"
            );
        }
        result
    }};
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid tree in {path}: {message}")]
    Tree { path: String, message: String },
    #[error("Codegen error: {0}")]
    Codegen(#[from] CodegenError),
}

/// A validated tree as handed over by the template parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSource {
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSource {
    pub unit_name: String,
    /// File name the unit is persisted under.
    pub file_name: String,
    pub source: String,
}

/// Where a unit was written, and whether the file changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    pub path: PathBuf,
    pub written: bool,
}

/// Decodes a `{ "page_info": ..., "nodes": [...] }` document.
pub fn load_unit(path: &Path) -> Result<UnitSource, DriverError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|err| DriverError::Tree {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// `admin/user-list` is stored as `admin_user_list.rs`.
pub fn unit_file_name(unit_name: &str) -> String {
    let stem: String = unit_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.rs")
}

pub fn compile_unit(
    unit: &UnitSource,
    options: &CompilerOptions,
) -> Result<CompiledSource, DriverError> {
    let trace = trace_timing();
    let generator = options.to_generator_options();
    let source = timing_step!(
        trace,
        "generate",
        generate(&unit.nodes, &unit.page_info, &generator)
    )?;
    Ok(CompiledSource {
        unit_name: unit.page_info.unit_name.clone(),
        file_name: unit_file_name(&unit.page_info.unit_name),
        source,
    })
}

/// Compiles every unit in parallel; results keep the input order.
pub fn compile_all(
    units: &[UnitSource],
    options: &CompilerOptions,
) -> Vec<Result<CompiledSource, DriverError>> {
    units
        .par_iter()
        .map(|unit| compile_unit(unit, options))
        .collect()
}

/// Writes the unit under `output_dir`, leaving the file alone when its
/// content is already current so build tools see no change.
pub fn persist(compiled: &CompiledSource, output_dir: &Path) -> Result<Persisted, DriverError> {
    let path = output_dir.join(&compiled.file_name);
    if let Ok(existing) = fs::read_to_string(&path)
        && existing == compiled.source
    {
        debug!(unit = %compiled.unit_name, path = %path.display(), "unit unchanged");
        return Ok(Persisted {
            path,
            written: false,
        });
    }
    fs::create_dir_all(output_dir)?;
    fs::write(&path, &compiled.source)?;
    info!(unit = %compiled.unit_name, path = %path.display(), "unit written");
    Ok(Persisted {
        path,
        written: true,
    })
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// True when the generated file is missing, or any source it was built
/// from is missing or newer than it.
pub fn is_stale(generated: &Path, sources: &[impl AsRef<Path>]) -> bool {
    let Some(built) = modified(generated) else {
        return true;
    };
    sources.iter().any(|source| match modified(source.as_ref()) {
        Some(changed) => changed > built,
        None => true,
    })
}

/// Outcome of [`compile_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compiled {
    UpToDate(PathBuf),
    Written(Persisted),
}

/// Loads a tree file and regenerates its unit when the tree or any
/// dependant is newer than the generated file. Relative dependants resolve
/// against the tree file's directory.
pub fn compile_file(tree: &Path, options: &CompilerOptions) -> Result<Compiled, DriverError> {
    let trace = trace_timing();
    let unit = timing_step!(trace, "load", load_unit(tree))?;
    let generated = options
        .output_dir
        .join(unit_file_name(&unit.page_info.unit_name));

    let base = tree.parent().unwrap_or_else(|| Path::new("."));
    let mut sources = vec![tree.to_path_buf()];
    sources.extend(unit.page_info.dependants.iter().map(|dep| base.join(dep)));
    if !is_stale(&generated, &sources) {
        debug!(unit = %unit.page_info.unit_name, "unit up to date");
        return Ok(Compiled::UpToDate(generated));
    }

    let compiled = compile_unit(&unit, options)?;
    let persisted = timing_step!(trace, "persist", persist(&compiled, &options.output_dir))?;
    Ok(Compiled::Written(persisted))
}

/// [`compile_file`] over many trees in parallel.
pub fn compile_files(
    trees: &[PathBuf],
    options: &CompilerOptions,
) -> Vec<Result<Compiled, DriverError>> {
    trees
        .par_iter()
        .map(|tree| compile_file(tree, options))
        .collect()
}
