#![allow(dead_code)]

//! Builds generated units into a scratch binary crate and runs it.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const RUNTIME: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../tessera-runtime");
const WORKSPACE_LOCK: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../Cargo.lock");
const TARGET_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../target/unit-fixture");

/// Writes `modules` as `src/<name>.rs` next to `main` and runs the crate.
/// The workspace lock file is reused so the fixture resolves the runtime's
/// dependencies to the versions already built.
pub fn cargo_run_fixture(dir: &Path, modules: &[(&str, &str)], main: &str) -> Output {
    let src = dir.join("src");
    fs::create_dir_all(&src).expect("fixture src dir");
    fs::write(
        dir.join("Cargo.toml"),
        format!(
            "[package]\nname = \"unit-fixture\"\nversion = \"0.1.0\"\nedition = \"2024\"\n\n\
             [dependencies]\ntessera-runtime = {{ path = {RUNTIME:?} }}\n\n[workspace]\n"
        ),
    )
    .expect("fixture manifest");
    if Path::new(WORKSPACE_LOCK).exists() {
        fs::copy(WORKSPACE_LOCK, dir.join("Cargo.lock")).expect("fixture lock file");
    }
    for (name, source) in modules {
        fs::write(src.join(format!("{name}.rs")), source).expect("fixture module");
    }
    fs::write(src.join("main.rs"), main).expect("fixture main");

    Command::new(env!("CARGO"))
        .args(["run", "--quiet"])
        .env("CARGO_TARGET_DIR", TARGET_DIR)
        .current_dir(dir)
        .output()
        .expect("spawn cargo")
}

pub fn assert_cargo_success(output: &Output) {
    assert!(
        output.status.success(),
        "fixture failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
