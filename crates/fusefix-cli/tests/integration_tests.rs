//! Runs of the `fusefix` binary against throwaway projects

use std::path::Path;
use std::process::{Command, Output};

use fusefix_dbt::fetch::{project_schema_file_name, yaml_schema_file_name};
use fusefix_dbt::fixtures;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Project wired to the offline fixture schemas through `fusefix.toml`
fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, &format!("schemas/{}", yaml_schema_file_name(fixtures::VERSION)), fixtures::YAML_SCHEMA);
    write(root, &format!("schemas/{}", project_schema_file_name(fixtures::VERSION)), fixtures::PROJECT_SCHEMA);
    write(
        root,
        "fusefix.toml",
        &format!("[schema]\nversion = \"{}\"\nlocal_dir = \"schemas\"\n", fixtures::VERSION),
    );

    for (path, contents) in files {
        write(root, path, contents);
    }
    dir
}

fn fusefix(args: &[&str], root: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fusefix"))
        .args(args)
        .arg("--path")
        .arg(root)
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

const PROJECT: &str = "name: shop\nflags:\n  require_generic_test_arguments_property: true\n";

#[test]
fn dry_run_json_reports_pending_changes() {
    let dir = project(&[
        ("dbt_project.yml", PROJECT),
        ("models/schema.yml", "models:\n  - name: orders\n    materialized: table\n"),
    ]);
    let original = std::fs::read_to_string(dir.path().join("models/schema.yml")).unwrap();

    let output = fusefix(&["deprecations", "--dry-run", "--json"], dir.path());

    assert_eq!(output.status.code(), Some(1));
    let lines = json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["mode"], "dry_run");
    assert!(lines[0]["file_path"].as_str().unwrap().ends_with("schema.yml"));
    assert!(!lines[0]["refactors"].as_array().unwrap().is_empty());
    assert_eq!(lines[1], serde_json::json!({"mode": "complete"}));

    assert_eq!(std::fs::read_to_string(dir.path().join("models/schema.yml")).unwrap(), original);
}

#[test]
fn clean_project_exits_successfully() {
    let dir = project(&[
        ("dbt_project.yml", PROJECT),
        ("models/schema.yml", "models:\n  - name: orders\n    config:\n      materialized: table\n"),
    ]);

    let output = fusefix(&["deprecations", "--json"], dir.path());

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(json_lines(&output), vec![serde_json::json!({"mode": "complete"})]);
}

#[test]
fn applied_run_rewrites_files() {
    let dir = project(&[
        ("dbt_project.yml", PROJECT),
        ("models/schema.yml", "models:\n  - name: orders\n    materialized: table\n"),
    ]);

    let output = fusefix(&["deprecations"], dir.path());

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Refactored"));
    let written = std::fs::read_to_string(dir.path().join("models/schema.yml")).unwrap();
    assert!(written.contains("config:"));
}

#[test]
fn missing_project_file_fails() {
    let dir = project(&[]);

    let output = fusefix(&["deprecations", "--json"], dir.path());

    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[test]
fn list_duplicates_prints_each_duplicate() {
    let dir = project(&[
        ("dbt_project.yml", "name: shop\n"),
        ("models/schema.yml", "models:\n  - name: a\n    description: x\n    description: y\n"),
    ]);

    let output = fusefix(&["list-duplicates"], dir.path());

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("There are issues in your project YML files"));
    assert!(stdout.contains("schema.yml:4"));
}
