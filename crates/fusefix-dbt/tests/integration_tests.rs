//! Integration tests for project discovery and schema loading

use fusefix_dbt::fetch::{project_schema_file_name, yaml_schema_file_name};
use fusefix_dbt::{
    collect_files, DbtProject, HubIndex, PackageSelection, ResourceKind, SchemaFetcher, Selection,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn discovers_project_and_private_package_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "dbt_project.yml", "name: shop\nmodel-paths: [\"models\"]\n");
    write(root, "models/staging/stg_orders.sql", "select 1");
    write(root, "models/staging/schema.yml", "version: 2\n");
    write(root, "dbt_packages/internal/dbt_project.yml", "name: internal\nmodel-paths: [src]\n");
    write(root, "dbt_packages/internal/src/base.sql", "select 2");

    let project = DbtProject::load(root).unwrap();
    let packages = project.package_roots(PackageSelection::Private, &HubIndex::unavailable());
    assert_eq!(packages, vec![root.join("dbt_packages/internal")]);

    let mut paths = project.resource_paths();
    for package in &packages {
        paths.extend(DbtProject::load(package).unwrap().resource_paths());
    }

    let model_dirs: Vec<_> = paths
        .paths
        .iter()
        .filter(|p| p.kind == ResourceKind::Models)
        .map(|p| p.path.clone())
        .collect();
    assert_eq!(model_dirs, vec![root.join("models"), root.join("dbt_packages/internal/src")]);

    let sql: Vec<_> = model_dirs.iter().flat_map(|d| collect_files(d, &["sql"])).collect();
    assert_eq!(sql.len(), 2);

    let selection = Selection::new(&[root.join("models/staging").display().to_string()]);
    let selected: Vec<_> = sql.iter().filter(|f| selection.matches(f)).collect();
    assert_eq!(selected, vec![&root.join("models/staging/stg_orders.sql")]);
}

#[tokio::test]
async fn specs_from_a_local_schema_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(yaml_schema_file_name("2.0.0")),
        include_str!("../fixtures/fs-schema-dbt-yaml-files-fixture.json"),
    )
    .unwrap();
    std::fs::write(
        dir.path().join(project_schema_file_name("2.0.0")),
        include_str!("../fixtures/fs-schema-dbt-project-fixture.json"),
    )
    .unwrap();

    let mut config = fusefix_core::Config::default();
    config.project_root = dir.path().to_path_buf();
    config.schema.local_dir = Some(".".into());

    let specs = SchemaFetcher::from_config(&config)
        .unwrap()
        .fetch_specs(Some("2.0.0"))
        .await
        .unwrap();

    let models = specs.yaml_spec("models").unwrap();
    assert!(models.is_config_field("materialized"));
    assert!(models.is_property("description"));
    assert!(specs.all_config_fields().contains("severity"));
    assert!(specs.all_project_config_fields_with_plus().contains("+post-hook"));
}
