//! Semantic layer migration
//!
//! Top-level `semantic_models` and `metrics` are merged into the model
//! entries they describe. The rules run in phases over every YAML file:
//!
//! 1. [`merge_semantic_models_with_models`], [`merge_simple_metrics_with_model_metrics`]
//! 2. [`add_new_metrics_for_measures_to_model`]
//! 3. [`merge_complex_metrics_with_model_metrics`]
//! 4. [`delete_top_level_semantic_models`], [`migrate_or_delete_top_level_metrics`]
//!
//! A phase must have seen every file before the next one starts, since a
//! metric in one file can depend on a measure declared in another.

pub mod definitions;
mod merge;

use fusefix_core::{DeprecationRefactor, RuleResult};
use fusefix_yaml::{Document, Mapping, Node, Sequence};
use tracing::debug;

pub use definitions::{MeasureInput, ModelKey, SemanticDefinitions};

use crate::error::RefactorError;
use definitions::mappings;
use merge::{merge_semantic_model, migrate_top_level_metric, ModelMerge};

/// A semantic rule: file content in, result out, sharing the definitions
pub type SemanticRule = fn(&str, &mut SemanticDefinitions) -> Result<RuleResult, RefactorError>;

/// Rule phases, in execution order
pub const PHASES: &[&[SemanticRule]] = &[
    &[merge_semantic_models_with_models, merge_simple_metrics_with_model_metrics],
    &[add_new_metrics_for_measures_to_model],
    &[merge_complex_metrics_with_model_metrics],
    &[delete_top_level_semantic_models, migrate_or_delete_top_level_metrics],
];

fn finish(rule: &'static str, yml: &str, document: &Document, logs: Vec<String>) -> RuleResult {
    if logs.is_empty() && !document.is_modified() {
        return RuleResult::unchanged(rule, yml);
    }
    debug!(rule, changes = logs.len(), "Semantic rule applied");
    let refactors = logs.into_iter().map(DeprecationRefactor::log_only).collect();
    RuleResult::new(rule, yml, document.serialize(), refactors)
}

/// Run `step` on every entry of the file's `models:` list
fn for_each_model(
    rule: &'static str,
    yml: &str,
    definitions: &mut SemanticDefinitions,
    mut step: impl FnMut(&mut Mapping, &mut SemanticDefinitions) -> Vec<String>,
) -> Result<RuleResult, RefactorError> {
    let mut document = Document::parse_lenient(yml)?;
    let mut logs = Vec::new();

    if let Some(models) = document.as_mapping_mut().and_then(|root| root.get_sequence_mut("models")) {
        for model in models.iter_mut().filter_map(Node::as_mapping_mut) {
            logs.extend(step(model, definitions));
        }
    }

    Ok(finish(rule, yml, &document, logs))
}

/// Merge each semantic model into its model entry
///
/// Semantic models whose model has no YAML entry anywhere get a new entry
/// in the file that declares them.
pub fn merge_semantic_models_with_models(
    yml: &str,
    definitions: &mut SemanticDefinitions,
) -> Result<RuleResult, RefactorError> {
    const RULE: &str = "merge_semantic_models_with_models";

    let mut document = Document::parse_lenient(yml)?;
    let Some(root) = document.as_mapping_mut() else {
        return Ok(RuleResult::unchanged(RULE, yml));
    };
    let mut logs = Vec::new();

    if let Some(models) = root.get_sequence_mut("models") {
        for model in models.iter_mut().filter_map(Node::as_mapping_mut) {
            logs.extend(merge_semantic_model(model, definitions));
        }
    }

    let orphans: Vec<ModelKey> = mappings(root.get_sequence("semantic_models"))
        .filter_map(SemanticDefinitions::model_key_for_semantic_model)
        .filter(|key| !definitions.model_key_exists(key))
        .collect();
    for (model_name, _) in orphans {
        let mut model = Mapping::new();
        model.insert("name", Node::string(model_name.as_str()));
        let Some(log) = merge_semantic_model(&mut model, definitions) else {
            continue;
        };
        if let Some(models) = root.get_or_insert_sequence("models") {
            models.push(model.into());
            logs.push(log);
        }
    }

    Ok(finish(RULE, yml, &document, logs))
}

/// Fold each simple metric's measure into it and move it to the measure's model
pub fn merge_simple_metrics_with_model_metrics(
    yml: &str,
    definitions: &mut SemanticDefinitions,
) -> Result<RuleResult, RefactorError> {
    for_each_model("merge_simple_metrics_with_model_metrics", yml, definitions, |model, definitions| {
        let Some(mut merge) = ModelMerge::new(model, definitions) else {
            return Vec::new();
        };
        merge.fold_simple_metrics();
        merge.into_logs()
    })
}

/// Create metrics for measures that were not folded into one
pub fn add_new_metrics_for_measures_to_model(
    yml: &str,
    definitions: &mut SemanticDefinitions,
) -> Result<RuleResult, RefactorError> {
    for_each_model("add_new_metrics_for_measures_to_model", yml, definitions, |model, definitions| {
        let Some(mut merge) = ModelMerge::new(model, definitions) else {
            return Vec::new();
        };
        merge.add_metrics_for_measures();
        merge.into_logs()
    })
}

/// Move derived, ratio, cumulative and conversion metrics to the model holding all their inputs
pub fn merge_complex_metrics_with_model_metrics(
    yml: &str,
    definitions: &mut SemanticDefinitions,
) -> Result<RuleResult, RefactorError> {
    for_each_model("merge_complex_metrics_with_model_metrics", yml, definitions, |model, definitions| {
        let Some(mut merge) = ModelMerge::new(model, definitions) else {
            return Vec::new();
        };
        merge.merge_complex_metrics();
        merge.into_logs()
    })
}

/// Remove top-level semantic models that were merged into a model
pub fn delete_top_level_semantic_models(
    yml: &str,
    definitions: &mut SemanticDefinitions,
) -> Result<RuleResult, RefactorError> {
    const RULE: &str = "delete_top_level_semantic_models";

    let mut document = Document::parse_lenient(yml)?;
    let Some(root) = document.as_mapping_mut() else {
        return Ok(RuleResult::unchanged(RULE, yml));
    };
    let mut logs = Vec::new();

    if let Some(semantic_models) = root.get_sequence_mut("semantic_models") {
        semantic_models.retain(|node| {
            let name = node.as_mapping().and_then(|m| m.get_str("name"));
            match name {
                Some(name) if definitions.is_semantic_model_merged(name) => {
                    logs.push(format!("Deleted top-level semantic model '{}'.", name));
                    false
                }
                _ => true,
            }
        });
        if !logs.is_empty() && semantic_models.is_empty() {
            root.remove("semantic_models");
        }
    }

    Ok(finish(RULE, yml, &document, logs))
}

/// Delete merged top-level metrics and rewrite the rest in the new syntax
///
/// Metrics that stay at the top level are sorted by name.
pub fn migrate_or_delete_top_level_metrics(
    yml: &str,
    definitions: &mut SemanticDefinitions,
) -> Result<RuleResult, RefactorError> {
    const RULE: &str = "migrate_or_delete_top_level_metrics";

    let mut document = Document::parse_lenient(yml)?;
    let Some(root) = document.as_mapping_mut() else {
        return Ok(RuleResult::unchanged(RULE, yml));
    };
    let Some(metrics) = root.get_sequence("metrics") else {
        return Ok(RuleResult::unchanged(RULE, yml));
    };

    let original: Vec<Node> = metrics.iter().cloned().collect();
    let mut sorted = original.clone();
    sorted.sort_by(|a, b| metric_name(a).cmp(&metric_name(b)));

    let mut logs = Vec::new();
    let mut kept = Vec::new();
    for mut node in sorted {
        let Some(metric) = node.as_mapping_mut() else {
            kept.push(node);
            continue;
        };
        let name = metric.get_str("name").unwrap_or_default().to_string();
        if definitions.is_metric_merged(&name) {
            logs.push(format!("Deleted top-level metric '{}'.", name));
            continue;
        }

        let before = metric.clone();
        migrate_top_level_metric(metric, definitions);
        if *metric != before {
            logs.push(format!(
                "Updated top-level metric '{}' to be compatible with new syntax, but left at top-level.",
                name
            ));
        }
        kept.push(node);
    }

    if kept == original {
        return Ok(RuleResult::unchanged(RULE, yml));
    }

    if kept.is_empty() {
        root.remove("metrics");
    } else {
        let mut sequence = Sequence::new();
        for node in kept {
            sequence.push(node);
        }
        root.insert("metrics", sequence.into());
    }

    Ok(finish(RULE, yml, &document, logs))
}

fn metric_name(node: &Node) -> String {
    node.as_mapping()
        .and_then(|m| m.get_str("name"))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PROJECT_YML: &str = "\
models:
  - name: orders
    columns:
      - name: order_id

semantic_models:
  - name: orders
    model: ref('orders')
    entities:
      - name: order_id
        type: primary
    measures:
      - name: order_total
        agg: sum
        expr: amount
      - name: order_count
        agg: count
        expr: 1
      - name: draft_measure
        agg: max

metrics:
  - name: revenue
    type: simple
    type_params:
      measure: order_total
  - name: revenue_per_order
    type: ratio
    type_params:
      numerator: revenue
      denominator: order_count
";

    fn run_all_phases(files: &mut [String], definitions: &mut SemanticDefinitions) -> Vec<Vec<String>> {
        let mut logs = vec![Vec::new(); files.len()];
        for phase in PHASES {
            for (i, file) in files.iter_mut().enumerate() {
                for rule in *phase {
                    let result = rule(file, definitions).unwrap();
                    if result.refactored {
                        logs[i].extend(result.logs().map(str::to_string));
                        *file = result.refactored_content;
                    }
                }
            }
        }
        logs
    }

    #[test]
    fn single_file_migration() {
        let mut definitions = SemanticDefinitions::default();
        definitions.add_yaml(PROJECT_YML).unwrap();
        let mut files = vec![PROJECT_YML.to_string()];

        let logs = run_all_phases(&mut files, &mut definitions);

        let migrated = Document::parse(&files[0]).unwrap().to_json();
        assert_eq!(
            migrated,
            json!({
                "models": [{
                    "name": "orders",
                    "columns": [{"name": "order_id", "entity": {"type": "primary"}}],
                    "semantic_model": {"enabled": true},
                    "metrics": [
                        {"name": "revenue", "type": "simple", "agg": "sum", "expr": "amount"},
                        {"name": "order_count", "agg": "count", "expr": 1, "type": "simple", "hidden": true},
                        {"name": "draft_measure", "agg": "max", "type": "simple", "hidden": true},
                        {"name": "revenue_per_order", "type": "ratio", "numerator": "revenue", "denominator": "order_count"}
                    ]
                }]
            })
        );
        assert!(logs[0].contains(&"Deleted top-level semantic model 'orders'.".to_string()));
        assert!(logs[0].contains(&"Deleted top-level metric 'revenue'.".to_string()));
        assert!(logs[0].contains(
            &"Folded input measure 'order_total' into simple metric 'revenue' and moved 'revenue' to model 'orders'."
                .to_string()
        ));
        assert!(logs[0].contains(&"Added ratio metric 'revenue_per_order' to model 'orders'.".to_string()));
    }

    #[test]
    fn migration_is_idempotent() {
        let mut definitions = SemanticDefinitions::default();
        definitions.add_yaml(PROJECT_YML).unwrap();
        let mut files = vec![PROJECT_YML.to_string()];
        run_all_phases(&mut files, &mut definitions);

        let once = files[0].clone();
        let mut definitions = SemanticDefinitions::default();
        definitions.add_yaml(&once).unwrap();
        let logs = run_all_phases(&mut files, &mut definitions);

        assert_eq!(files[0], once);
        assert!(logs[0].is_empty());
    }

    #[test]
    fn orphan_semantic_model_gets_a_model_entry() {
        let yml = "\
semantic_models:
  - name: customers_sm
    model: ref('customers')
    description: People who buy.
";
        let mut definitions = SemanticDefinitions::default();
        definitions.add_yaml(yml).unwrap();

        let result = merge_semantic_models_with_models(yml, &mut definitions).unwrap();
        assert!(result.refactored);
        assert_eq!(
            Document::parse(&result.refactored_content).unwrap().to_json()["models"],
            json!([{
                "name": "customers",
                "semantic_model": {"enabled": true, "name": "customers"},
                "description": "People who buy."
            }])
        );
        assert_eq!(
            result.logs().collect::<Vec<_>>(),
            vec!["Model 'customers' - Merged with semantic model 'customers_sm'.\n\t* Set model 'description' to semantic model 'description'."]
        );
    }

    #[test]
    fn metrics_on_other_models_stay_top_level() {
        let yml = "\
metrics:
  - name: zeta
    type: derived
    type_params:
      expr: a * 2
      metrics:
        - a
  - name: alpha
    type: simple
    label: Alpha
";
        let mut definitions = SemanticDefinitions::default();
        definitions.add_yaml(yml).unwrap();

        let result = migrate_or_delete_top_level_metrics(yml, &mut definitions).unwrap();
        assert_eq!(
            Document::parse(&result.refactored_content).unwrap().to_json()["metrics"],
            json!([
                {"name": "alpha", "type": "simple", "label": "Alpha"},
                {"name": "zeta", "type": "derived", "expr": "a * 2", "input_metrics": [{"name": "a"}]}
            ])
        );
        assert_eq!(
            result.logs().collect::<Vec<_>>(),
            vec!["Updated top-level metric 'zeta' to be compatible with new syntax, but left at top-level."]
        );
    }
}
