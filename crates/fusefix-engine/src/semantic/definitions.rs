//! Cross-file index of semantic models and metrics

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use fusefix_sql::RefArgs;
use fusefix_yaml::{Document, Mapping, Node};
use tracing::warn;

/// Model name and optional version, as written in `ref()`
pub type ModelKey = (String, Option<String>);

/// Cache key of a metric created for a measure
type ArtificialKey = (String, Option<String>, Option<bool>);

/// Everything the semantic rules need to know across files
///
/// Built once from the project's YAML files before any rule runs, then
/// updated by the rules as models and metrics get merged.
#[derive(Debug, Clone, Default)]
pub struct SemanticDefinitions {
    semantic_models: BTreeMap<ModelKey, Mapping>,
    model_yml_keys: BTreeSet<ModelKey>,

    /// Top-level metrics by name, in file order
    initial_metrics: Vec<(String, Mapping)>,

    merged_semantic_models: BTreeSet<String>,
    semantic_model_to_model: BTreeMap<String, String>,

    merged_metrics: BTreeSet<String>,

    /// Measures folded into some metric
    merged_measures: BTreeSet<String>,

    artificial_metrics: BTreeMap<ArtificialKey, String>,
    artificial_metric_names: BTreeSet<String>,
}

impl SemanticDefinitions {
    /// Index the YAML files of a project
    ///
    /// Files that cannot be read or parsed are skipped.
    pub fn collect(files: &[PathBuf]) -> Self {
        let mut definitions = Self::default();
        for file in files {
            let text = match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping {} for semantic definitions: {}", file.display(), e);
                    continue;
                }
            };
            if let Err(e) = definitions.add_yaml(&text) {
                warn!("Skipping {} for semantic definitions: {}", file.display(), e);
            }
        }
        definitions
    }

    /// Index one file's content
    pub fn add_yaml(&mut self, text: &str) -> Result<(), fusefix_yaml::YamlError> {
        let document = Document::parse_lenient(text)?;
        let Some(root) = document.as_mapping() else {
            return Ok(());
        };

        for semantic_model in mappings(root.get_sequence("semantic_models")) {
            if let Some(key) = Self::model_key_for_semantic_model(semantic_model) {
                self.semantic_models.insert(key, semantic_model.clone());
            }
        }

        for model in mappings(root.get_sequence("models")) {
            let Some(name) = model.get_str("name") else {
                continue;
            };
            let versions: Vec<&Mapping> = mappings(model.get_sequence("versions")).collect();
            if versions.is_empty() {
                self.model_yml_keys.insert((name.to_string(), None));
            } else {
                for version in versions {
                    let v = version.get("v").and_then(Node::as_str).map(str::to_string);
                    self.model_yml_keys.insert((name.to_string(), v));
                }
            }
        }

        for metric in mappings(root.get_sequence("metrics")) {
            let Some(name) = metric.get_str("name") else {
                continue;
            };
            match self.initial_metrics.iter_mut().find(|(n, _)| n == name) {
                Some((_, existing)) => *existing = metric.clone(),
                None => self.initial_metrics.push((name.to_string(), metric.clone())),
            }
        }

        Ok(())
    }

    /// Semantic model built on an unversioned model
    pub fn semantic_model(&self, model_name: &str) -> Option<&Mapping> {
        self.semantic_models.get(&(model_name.to_string(), None))
    }

    /// Model a semantic model points at through its `model: ref(...)`
    pub fn model_key_for_semantic_model(semantic_model: &Mapping) -> Option<ModelKey> {
        let reference = RefArgs::parse(semantic_model.get_str("model")?)?;
        Some((reference.name, reference.version))
    }

    /// Whether some YAML file declares the model
    pub fn model_key_exists(&self, key: &ModelKey) -> bool {
        self.model_yml_keys.contains(key)
    }

    pub(crate) fn metric_count(&self) -> usize {
        self.initial_metrics.len()
    }

    pub(crate) fn metric_at(&self, index: usize) -> &(String, Mapping) {
        &self.initial_metrics[index]
    }

    pub(crate) fn replace_metric_at(&mut self, index: usize, metric: Mapping) {
        self.initial_metrics[index].1 = metric;
    }

    pub(crate) fn metric_index(&self, name: &str) -> Option<usize> {
        self.initial_metrics.iter().position(|(n, _)| n == name)
    }

    pub fn is_initial_metric(&self, name: &str) -> bool {
        self.metric_index(name).is_some()
    }

    pub fn mark_metric_as_merged(&mut self, metric_name: &str, measure_name: Option<&str>) {
        self.merged_metrics.insert(metric_name.to_string());
        if let Some(measure) = measure_name {
            self.merged_measures.insert(measure.to_string());
        }
    }

    pub fn is_metric_merged(&self, metric_name: &str) -> bool {
        self.merged_metrics.contains(metric_name)
    }

    pub fn is_measure_merged(&self, measure_name: &str) -> bool {
        self.merged_measures.contains(measure_name)
    }

    pub fn mark_semantic_model_as_merged(&mut self, semantic_model_name: &str, model_name: &str) {
        self.merged_semantic_models.insert(semantic_model_name.to_string());
        self.semantic_model_to_model
            .insert(semantic_model_name.to_string(), model_name.to_string());
    }

    pub fn is_semantic_model_merged(&self, semantic_model_name: &str) -> bool {
        self.merged_semantic_models.contains(semantic_model_name)
    }

    /// Model a semantic model was merged into
    pub fn model_for_semantic_model(&self, semantic_model_name: &str) -> Option<&str> {
        self.semantic_model_to_model.get(semantic_model_name).map(String::as_str)
    }

    pub fn record_artificial_metric(
        &mut self,
        measure_name: &str,
        fill_nulls_with: Option<&str>,
        join_to_timespine: Option<bool>,
        metric_name: &str,
    ) {
        let key = (
            measure_name.to_string(),
            fill_nulls_with.map(str::to_string),
            join_to_timespine,
        );
        self.artificial_metrics.insert(key, metric_name.to_string());
        self.artificial_metric_names.insert(metric_name.to_string());
    }

    /// Name of the metric already created for a measure input
    pub fn artificial_metric(
        &self,
        measure_name: &str,
        fill_nulls_with: Option<&str>,
        join_to_timespine: Option<bool>,
    ) -> Option<&str> {
        let key = (
            measure_name.to_string(),
            fill_nulls_with.map(str::to_string),
            join_to_timespine,
        );
        self.artificial_metrics.get(&key).map(String::as_str)
    }

    pub fn artificial_metric_name_exists(&self, metric_name: &str) -> bool {
        self.artificial_metric_names.contains(metric_name)
    }
}

/// Mapping items of an optional sequence
pub(crate) fn mappings(sequence: Option<&fusefix_yaml::Sequence>) -> impl Iterator<Item = &Mapping> {
    sequence.into_iter().flat_map(|s| s.iter()).filter_map(Node::as_mapping)
}

/// A measure reference in a metric, either `measure: name` or an object
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureInput {
    pub name: String,
    object_form: bool,
    pub fill_nulls_with: Option<Node>,
    pub join_to_timespine: Option<bool>,
    pub filter: Option<String>,
    pub alias: Option<String>,
}

impl MeasureInput {
    pub fn parse(node: Option<&Node>) -> Option<Self> {
        let node = node.filter(|n| !n.is_null())?;
        if let Some(mapping) = node.as_mapping() {
            return Some(Self {
                name: mapping.get_str("name")?.to_string(),
                object_form: true,
                fill_nulls_with: mapping.get("fill_nulls_with").filter(|n| !n.is_null()).cloned(),
                join_to_timespine: mapping.get("join_to_timespine").and_then(Node::as_bool),
                filter: mapping.get_str("filter").map(str::to_string),
                alias: mapping.get_str("alias").map(str::to_string),
            });
        }
        Some(Self {
            name: node.as_str()?.to_string(),
            object_form: false,
            fill_nulls_with: None,
            join_to_timespine: None,
            filter: None,
            alias: None,
        })
    }

    /// `fill_nulls_with` as text, the form used in cache keys and names
    pub fn fill_nulls_with_text(&self) -> Option<&str> {
        self.fill_nulls_with.as_ref().and_then(Node::as_str)
    }

    /// Reference to the metric replacing this measure
    ///
    /// The object form keeps `filter` and `alias`; the other measure
    /// settings now live on the metric itself.
    pub fn to_metric_input(&self, metric_name: &str) -> Node {
        if !self.object_form {
            return Node::string(metric_name);
        }
        let mut input = Mapping::new();
        input.insert("name", Node::string(metric_name));
        if let Some(filter) = &self.filter {
            input.insert("filter", Node::string(filter.as_str()));
        }
        if let Some(alias) = &self.alias {
            input.insert("alias", Node::string(alias.as_str()));
        }
        input.into()
    }
}

/// Measure of a semantic model by name
pub fn measure<'a>(semantic_model: &'a Mapping, name: &str) -> Option<&'a Mapping> {
    mappings(semantic_model.get_sequence("measures")).find(|m| m.get_str("name") == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEMANTIC_YML: &str = "\
semantic_models:
  - name: orders_sm
    model: ref('orders')
    measures:
      - name: order_total
        agg: sum
  - name: broken
    model: \"{{ something }}\"
models:
  - name: customers
  - name: dim_dates
    versions:
      - v: 1
      - v: 2
metrics:
  - name: revenue
    type: simple
    type_params:
      measure: order_total
";

    #[test]
    fn collects_models_semantic_models_and_metrics() {
        let mut definitions = SemanticDefinitions::default();
        definitions.add_yaml(SEMANTIC_YML).unwrap();

        let orders = definitions.semantic_model("orders").unwrap();
        assert_eq!(orders.get_str("name"), Some("orders_sm"));
        assert!(measure(orders, "order_total").is_some());
        assert!(measure(orders, "missing").is_none());

        assert!(definitions.model_key_exists(&("customers".to_string(), None)));
        assert!(definitions.model_key_exists(&("dim_dates".to_string(), Some("2".to_string()))));
        assert!(!definitions.model_key_exists(&("dim_dates".to_string(), None)));

        assert!(definitions.is_initial_metric("revenue"));
        assert_eq!(definitions.metric_count(), 1);
    }

    #[test]
    fn measure_inputs() {
        let plain = MeasureInput::parse(Some(&Node::string("orders"))).unwrap();
        assert_eq!(plain.name, "orders");
        assert_eq!(plain.to_metric_input("orders_metric"), Node::string("orders_metric"));

        let doc = Document::parse("name: orders\nfill_nulls_with: 0\nalias: o\n").unwrap();
        let object = MeasureInput::parse(Some(doc.root())).unwrap();
        assert_eq!(object.fill_nulls_with_text(), Some("0"));
        assert_eq!(
            object.to_metric_input("m").to_json(),
            serde_json::json!({"name": "m", "alias": "o"})
        );

        assert_eq!(MeasureInput::parse(None), None);
        assert_eq!(MeasureInput::parse(Some(&Node::null())), None);
    }

    #[test]
    fn artificial_metric_cache() {
        let mut definitions = SemanticDefinitions::default();
        definitions.record_artificial_metric("orders", Some("0"), None, "orders_fill_nulls_with_0");

        assert_eq!(
            definitions.artificial_metric("orders", Some("0"), None),
            Some("orders_fill_nulls_with_0")
        );
        assert_eq!(definitions.artificial_metric("orders", None, None), None);
        assert!(definitions.artificial_metric_name_exists("orders_fill_nulls_with_0"));
    }
}
