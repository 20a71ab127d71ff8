use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tessera_driver::{
    Compiled, CompilerOptions, DriverError, UnitSource, compile_all, compile_file, compile_unit,
    is_stale, load_unit, persist,
};

const HELLO: &str = r#"{
    "page_info": { "unit_name": "hello", "dependants": ["header.tsr"] },
    "nodes": [
        { "kind": "template_text", "text": "<p>Hello, " },
        { "kind": "el_expression", "expression": "name" },
        { "kind": "template_text", "text": "!</p>" }
    ]
}"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_file(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn touch_later(path: &Path) {
    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

fn options_in(dir: &TempDir) -> CompilerOptions {
    CompilerOptions {
        output_dir: dir.path().join("gen"),
        ..CompilerOptions::default()
    }
}

#[test]
fn loads_compiles_and_persists_a_tree() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("hello.json");
    write_file(&tree, HELLO);

    let unit = load_unit(&tree).unwrap();
    assert_eq!(unit.page_info.unit_name, "hello");
    assert_eq!(unit.nodes.len(), 3);

    let options = options_in(&dir);
    let compiled = compile_unit(&unit, &options).unwrap();
    assert_eq!(compiled.file_name, "hello.rs");
    assert!(compiled.source.contains("pub struct Hello;"));

    let first = persist(&compiled, &options.output_dir).unwrap();
    assert!(first.written);
    assert_eq!(fs::read_to_string(&first.path).unwrap(), compiled.source);
    let second = persist(&compiled, &options.output_dir).unwrap();
    assert!(!second.written);
}

#[test]
fn compile_file_skips_units_that_are_up_to_date() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("hello.json");
    let header = dir.path().join("header.tsr");
    write_file(&tree, HELLO);
    write_file(&header, "<h1>");
    let options = options_in(&dir);

    let generated = match compile_file(&tree, &options).unwrap() {
        Compiled::Written(persisted) => {
            assert!(persisted.written);
            persisted.path
        }
        other => panic!("expected a write, got {other:?}"),
    };
    assert_eq!(
        compile_file(&tree, &options).unwrap(),
        Compiled::UpToDate(generated.clone())
    );

    // A newer dependant forces regeneration; the output itself is unchanged.
    touch_later(&header);
    match compile_file(&tree, &options).unwrap() {
        Compiled::Written(persisted) => {
            assert_eq!(persisted.path, generated);
            assert!(!persisted.written);
        }
        other => panic!("expected a rebuild, got {other:?}"),
    }
}

#[test]
fn missing_dependants_make_a_unit_stale() {
    let dir = TempDir::new().unwrap();
    let generated = dir.path().join("hello.rs");
    let tree = dir.path().join("hello.json");
    write_file(&tree, HELLO);
    write_file(&generated, "");
    touch_later(&generated);

    assert!(!is_stale(&generated, &[&tree]));
    assert!(is_stale(&generated, &[tree.clone(), dir.path().join("gone.tsr")]));
    let later = SystemTime::now() + Duration::from_secs(600);
    fs::File::options()
        .write(true)
        .open(&tree)
        .unwrap()
        .set_modified(later)
        .unwrap();
    assert!(is_stale(&generated, &[&tree]));
}

#[test]
fn compile_all_keeps_input_order_and_reports_each_failure() {
    let good = |name: &str| -> UnitSource {
        let json = format!(r#"{{ "page_info": {{ "unit_name": "{name}" }}, "nodes": [] }}"#);
        serde_json::from_str(&json).unwrap()
    };
    let bad: UnitSource = serde_json::from_str(
        r#"{
            "page_info": { "unit_name": "broken" },
            "nodes": [ { "kind": "extension_tag", "prefix": "c", "local_name": "x" } ]
        }"#,
    )
    .unwrap();
    let units = vec![good("a"), bad, good("c")];
    let results = compile_all(&units, &CompilerOptions::default());
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().unit_name, "a");
    assert!(matches!(results[1], Err(DriverError::Codegen(_))));
    assert_eq!(results[2].as_ref().unwrap().unit_name, "c");
}

#[test]
fn malformed_trees_name_their_file() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("bad.json");
    write_file(&tree, r#"{ "nodes": [] }"#);
    let err = load_unit(&tree).unwrap_err();
    assert!(matches!(err, DriverError::Tree { .. }));
    assert!(err.to_string().contains("bad.json"));
}

#[test]
fn project_options_come_from_tessera_toml() {
    let dir = TempDir::new().unwrap();
    assert_eq!(
        CompilerOptions::for_project(dir.path()).unwrap(),
        CompilerOptions::default()
    );
    write_file(&dir.path().join("tessera.toml"), "tag_pool_size = 9\n");
    assert_eq!(CompilerOptions::for_project(dir.path()).unwrap().tag_pool_size, 9);
    write_file(&dir.path().join("tessera.toml"), "tag_pool_size = [");
    assert!(matches!(
        CompilerOptions::for_project(dir.path()),
        Err(DriverError::Config(_))
    ));
}
