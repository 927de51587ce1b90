//! Model-level steps of the semantic layer migration
//!
//! Each step edits one entry of a file's `models:` list and returns its log
//! lines. Metric bodies come from [`SemanticDefinitions`], which is updated
//! as metrics get merged so later files and phases see the result.

use std::collections::BTreeSet;

use fusefix_yaml::{Mapping, Node, Sequence};
use serde_json::Value;
use tracing::debug;

use super::definitions::{mappings, measure, MeasureInput, SemanticDefinitions};

/// Characters that make an expression unusable as a column name
const NON_COLUMN_CHARS: &[char] = &[' ', '|', '('];

/// Measure fields copied onto the simple metric that consumes the measure
const FOLDED_MEASURE_FIELDS: &[&str] = &[
    "agg",
    "percentile",
    "use_discrete_percentile",
    "use_approximate_percentile",
    "agg_time_dimension",
];

/// Cumulative settings lifted out of `cumulative_type_params`
const CUMULATIVE_FIELDS: &[&str] = &["window", "grain_to_date", "period_agg"];

/// Truthiness of an optional YAML value
///
/// Missing, null, `false`, zero and empty values are false.
pub(crate) fn truthy(node: Option<&Node>) -> bool {
    match node.map(Node::to_json) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

fn is_truthy(node: &Node) -> bool {
    truthy(Some(node))
}

fn into_mapping(node: Option<Node>) -> Mapping {
    match node {
        Some(Node::Mapping(m)) => m,
        _ => Mapping::new(),
    }
}

fn extend(target: &mut Mapping, source: &Mapping) {
    for (key, value) in source.iter() {
        target.insert(key, value.clone());
    }
}

/// Lift the contents of `type_params` onto the metric
pub(crate) fn flatten_type_params(metric: &mut Mapping) {
    let type_params = into_mapping(metric.remove("type_params"));
    extend(metric, &type_params);
}

/// `metrics: [a, ...]` becomes `input_metrics: [{name: a}, ...]`
pub(crate) fn metrics_to_input_metrics(metric: &mut Mapping) {
    let Some(metrics) = metric.remove("metrics") else {
        return;
    };
    let mut inputs = Sequence::new();
    for input in metrics.as_sequence().into_iter().flat_map(Sequence::iter) {
        match input.as_str() {
            Some(name) => {
                let mut named = Mapping::new();
                named.insert("name", Node::string(name));
                inputs.push(named.into());
            }
            None => inputs.push(input.clone()),
        }
    }
    metric.insert("input_metrics", inputs.into());
}

/// Name of a metric input, written either as a string or with `name:`
fn metric_input_name(input: Option<&Node>) -> Option<String> {
    let input = input?;
    input
        .as_str()
        .or_else(|| input.as_mapping().and_then(|m| m.get_str("name")))
        .map(str::to_string)
}

fn push_metric(model: &mut Mapping, metric: Mapping) {
    match model.get_or_insert_sequence("metrics") {
        Some(metrics) => metrics.push(metric.into()),
        None => debug!("Model 'metrics' is not a list, metric not added"),
    }
}

fn is_column_name(name: &str) -> bool {
    !name.contains(NON_COLUMN_CHARS)
}

fn column_mut<'a>(model: &'a mut Mapping, name: &str) -> Option<&'a mut Mapping> {
    model
        .get_sequence_mut("columns")?
        .iter_mut()
        .filter_map(Node::as_mapping_mut)
        .find(|c| c.get_str("name") == Some(name))
}

fn push_column(model: &mut Mapping, column: Mapping) -> bool {
    match model.get_or_insert_sequence("columns") {
        Some(columns) => {
            columns.push(column.into());
            true
        }
        None => false,
    }
}

fn push_derived(model: &mut Mapping, section: &str, item: Mapping) -> bool {
    match model
        .get_or_insert_mapping("derived_semantics")
        .and_then(|d| d.get_or_insert_sequence(section))
    {
        Some(items) => {
            items.push(item.into());
            true
        }
        None => false,
    }
}

/// Merge the semantic model built on this model into it
///
/// Returns the combined log line, or `None` when nothing was merged.
/// Versioned models are left alone.
pub(crate) fn merge_semantic_model(model: &mut Mapping, definitions: &mut SemanticDefinitions) -> Option<String> {
    if model.contains_key("versions") {
        return None;
    }
    let model_name = model.get_str("name")?.to_string();
    let semantic_model = definitions.semantic_model(&model_name)?.clone();
    let semantic_model_name = semantic_model.get_str("name").unwrap_or_default().to_string();

    let mut block = Mapping::new();
    block.insert("enabled", Node::bool(true));
    if let Some(config) = semantic_model.get("config").filter(|c| is_truthy(c)) {
        block.insert("config", config.clone());
    }
    if semantic_model_name != model_name {
        block.insert("name", Node::string(model_name.as_str()));
    }
    model.insert("semantic_model", block.into());

    let mut details = Vec::new();

    if let Some(description) = semantic_model.get_str("description").filter(|d| !d.is_empty()) {
        match model.get_str("description").filter(|d| !d.is_empty()) {
            Some(existing) => {
                let combined = format!("{} {}", existing, description);
                model.insert("description", Node::string(combined));
                details.push("Appended semantic model 'description' to model 'description'.".to_string());
            }
            None => {
                model.insert("description", Node::string(description));
                details.push("Set model 'description' to semantic model 'description'.".to_string());
            }
        }
    }

    if let Some(agg_time_dimension) = semantic_model
        .get_mapping("defaults")
        .and_then(|d| d.get("agg_time_dimension"))
        .filter(|v| is_truthy(v))
    {
        model.insert("agg_time_dimension", agg_time_dimension.clone());
        details.push("Set model 'agg_time_dimension' to semantic model 'agg_time_dimension'.".to_string());
    }

    for entity in mappings(semantic_model.get_sequence("entities")) {
        details.extend(merge_entity(model, entity));
    }
    for dimension in mappings(semantic_model.get_sequence("dimensions")) {
        details.extend(merge_dimension(model, dimension));
    }

    definitions.mark_semantic_model_as_merged(&semantic_model_name, &model_name);

    let mut log = format!(
        "Model '{}' - Merged with semantic model '{}'.",
        model_name, semantic_model_name
    );
    for detail in details {
        log.push_str(&format!("\n\t* {}", detail));
    }
    Some(log)
}

/// Put an entity on its column, a new column or `derived_semantics`
fn merge_entity(model: &mut Mapping, entity: &Mapping) -> Option<String> {
    let name = entity.get_str("name")?;
    let kind = entity.get_str("type")?;
    let expr = entity.get_str("expr").filter(|e| !e.is_empty());
    let column_name = expr.unwrap_or(name);

    let entity_block = || {
        let mut block = Mapping::new();
        block.insert("type", Node::string(kind));
        if name != column_name {
            block.insert("name", Node::string(name));
        }
        Node::from(block)
    };

    if let Some(column) = column_mut(model, column_name) {
        column.insert("entity", entity_block());
        return Some(format!("Added '{}' entity to column '{}'.", kind, column_name));
    }

    if is_column_name(column_name) {
        let mut column = Mapping::new();
        column.insert("name", Node::string(column_name));
        column.insert("entity", entity_block());
        return push_column(model, column)
            .then(|| format!("Added new column '{}' with '{}' entity.", column_name, kind));
    }

    let mut derived = Mapping::new();
    derived.insert("name", Node::string(name));
    derived.insert("type", Node::string(kind));
    if let Some(expr) = expr {
        derived.insert("expr", Node::string(expr));
    }
    push_derived(model, "entities", derived)
        .then(|| format!("Added 'derived_semantics' to model with '{}' entity.", kind))
}

/// Put a dimension on its column, a new column or `derived_semantics`
fn merge_dimension(model: &mut Mapping, dimension: &Mapping) -> Option<String> {
    let name = dimension.get_str("name")?;
    let kind = dimension.get_str("type")?;
    let expr = dimension.get_str("expr").filter(|e| !e.is_empty());
    let column_name = expr.unwrap_or(name);
    let granularity = dimension
        .get_mapping("type_params")
        .and_then(|tp| tp.get("time_granularity"))
        .filter(|g| is_truthy(g));

    let column_fields = || {
        let mut block = Mapping::new();
        block.insert("type", Node::string(kind));
        if name != column_name {
            block.insert("name", Node::string(name));
        }
        let mut fields = Mapping::new();
        fields.insert("dimension", block.into());
        if let Some(granularity) = granularity {
            fields.insert("granularity", granularity.clone());
        }
        fields
    };

    if let Some(column) = column_mut(model, column_name) {
        extend(column, &column_fields());
        return Some(format!("Added '{}' dimension to column '{}'.", kind, column_name));
    }

    if is_column_name(column_name) {
        let mut column = Mapping::new();
        column.insert("name", Node::string(column_name));
        extend(&mut column, &column_fields());
        return push_column(model, column)
            .then(|| format!("Added new column '{}' with '{}' dimension.", column_name, kind));
    }

    let mut derived = Mapping::new();
    derived.insert("name", Node::string(name));
    derived.insert("type", Node::string(kind));
    if let Some(granularity) = granularity {
        derived.insert("time_granularity", granularity.clone());
    }
    if let Some(expr) = expr {
        derived.insert("expr", Node::string(expr));
    }
    push_derived(model, "dimensions", derived)
        .then(|| format!("Added 'derived_semantics' to model with '{}' dimension.", kind))
}

/// `non_additive_dimension` with the metric-side key names
fn metric_non_additive_dimension(measure_dimension: &Mapping) -> Mapping {
    let mut dimension = Mapping::new();
    for (from, to) in [("name", "name"), ("window_choice", "window_agg"), ("window_groupings", "group_by")] {
        if let Some(value) = measure_dimension.get(from).filter(|v| is_truthy(v)) {
            dimension.insert(to, value.clone());
        }
    }
    dimension
}

/// Name for a metric created from a measure, unique among all metrics
fn artificial_metric_name(
    measure_name: &str,
    fill_nulls_with: Option<&str>,
    join_to_timespine: Option<bool>,
    definitions: &SemanticDefinitions,
) -> String {
    let mut base = measure_name.to_string();
    if let Some(fill) = fill_nulls_with.filter(|f| !f.is_empty()) {
        let suffix = match fill.trim().parse::<i64>() {
            Ok(value) if value < 0 => format!("negative_{}", value.unsigned_abs()),
            Ok(value) => value.to_string(),
            Err(_) => fill.to_string(),
        };
        base.push_str(&format!("_fill_nulls_with_{}", suffix));
    }
    if join_to_timespine == Some(true) {
        base.push_str("_join_to_timespine");
    }

    let mut name = base.clone();
    let mut i = 1;
    while definitions.is_initial_metric(&name) || definitions.artificial_metric_name_exists(&name) {
        name = format!("{}_{}", base, i);
        i += 1;
    }
    name
}

/// Metric work on one model entry
pub(crate) struct ModelMerge<'a> {
    model: &'a mut Mapping,
    model_name: String,
    semantic_model: Mapping,
    definitions: &'a mut SemanticDefinitions,
    logs: Vec<String>,

    /// Metrics being resolved, to stop on cycles
    visiting: BTreeSet<String>,
}

impl<'a> ModelMerge<'a> {
    /// `None` when the model has no name or no semantic model
    pub(crate) fn new(model: &'a mut Mapping, definitions: &'a mut SemanticDefinitions) -> Option<Self> {
        let model_name = model.get_str("name")?.to_string();
        let semantic_model = definitions
            .semantic_model(&model_name)
            .filter(|sm| !sm.is_empty())?
            .clone();
        Some(Self {
            model,
            model_name,
            semantic_model,
            definitions,
            logs: Vec::new(),
            visiting: BTreeSet::new(),
        })
    }

    pub(crate) fn into_logs(self) -> Vec<String> {
        self.logs
    }

    fn measure(&self, name: &str) -> Option<Mapping> {
        measure(&self.semantic_model, name).cloned()
    }

    fn on_model(&self, metric_name: &str) -> bool {
        mappings(self.model.get_sequence("metrics")).any(|m| m.get_str("name") == Some(metric_name))
    }

    /// Fold each simple metric into its measure and move it to this model
    pub(crate) fn fold_simple_metrics(&mut self) {
        for index in 0..self.definitions.metric_count() {
            let (metric_name, metric) = self.definitions.metric_at(index);
            if metric.get_str("type") != Some("simple") {
                continue;
            }
            let Some(input) = MeasureInput::parse(metric.get_mapping("type_params").and_then(|tp| tp.get("measure")))
            else {
                continue;
            };
            let Some(measure) = self.measure(&input.name) else {
                continue;
            };
            let metric_name = metric_name.clone();
            let mut metric = metric.clone();

            for field in FOLDED_MEASURE_FIELDS {
                if let Some(value) = measure.get(field).filter(|v| is_truthy(v)) {
                    metric.insert(*field, value.clone());
                }
            }
            if let Some(dimension) = measure
                .get("non_additive_dimension")
                .filter(|v| is_truthy(v))
                .and_then(Node::as_mapping)
            {
                metric.insert("non_additive_dimension", metric_non_additive_dimension(dimension).into());
            }
            if let Some(expr) = measure.get("expr").filter(|v| is_truthy(v)) {
                metric.insert("expr", expr.clone());
            }
            if let Some(fill) = input.fill_nulls_with.as_ref().filter(|v| is_truthy(v)) {
                metric.insert("fill_nulls_with", fill.clone());
            }
            if input.join_to_timespine == Some(true) {
                metric.insert("join_to_timespine", Node::bool(true));
            }
            if let Some(filter) = input.filter.as_deref().filter(|f| !f.is_empty()) {
                let combined = match metric.get_str("filter").filter(|f| !f.is_empty()) {
                    Some(existing) => format!("({}) AND ({})", existing, filter),
                    None => filter.to_string(),
                };
                metric.insert("filter", Node::string(combined));
            }
            metric.remove("type_params");

            self.definitions.replace_metric_at(index, metric.clone());
            push_metric(self.model, metric);
            self.definitions.mark_metric_as_merged(&metric_name, Some(&input.name));
            self.logs.push(format!(
                "Folded input measure '{}' into simple metric '{}' and moved '{}' to model '{}'.",
                input.name, metric_name, metric_name, self.model_name
            ));
        }
    }

    /// Existing metric for a measure input, or a new one added to this model
    ///
    /// Returns the metric name and whether it was created.
    fn metric_for_measure(
        &mut self,
        measure: &Mapping,
        fill_nulls_with: Option<&Node>,
        join_to_timespine: Option<bool>,
        hidden: bool,
    ) -> Option<(String, bool)> {
        let measure_name = measure.get_str("name")?;
        let fill_text = fill_nulls_with.and_then(Node::as_str);

        if let Some(existing) = self
            .definitions
            .artificial_metric(measure_name, fill_text, join_to_timespine)
        {
            return Some((existing.to_string(), false));
        }

        let name = artificial_metric_name(measure_name, fill_text, join_to_timespine, &*self.definitions);
        let mut metric = measure.clone();
        metric.insert("name", Node::string(name.as_str()));
        metric.insert("type", Node::string("simple"));
        if hidden {
            metric.insert("hidden", Node::bool(true));
        }
        metric.remove("create_metric");
        if let Some(dimension) = metric.get_mapping_mut("non_additive_dimension") {
            for (from, to) in [("window_choice", "window_agg"), ("window_groupings", "group_by")] {
                if let Some(value) = dimension.remove(from).filter(|v| is_truthy(v)) {
                    dimension.insert(to, value);
                }
            }
        }
        if let Some(fill) = fill_nulls_with {
            metric.insert("fill_nulls_with", fill.clone());
        }
        if join_to_timespine == Some(true) {
            metric.insert("join_to_timespine", Node::bool(true));
        }

        self.definitions
            .record_artificial_metric(measure_name, fill_text, join_to_timespine, &name);
        push_metric(self.model, metric);
        Some((name, true))
    }

    /// Give measures that no metric consumes a metric of their own
    ///
    /// `create_metric: true` measures get a visible metric, the others a
    /// hidden one.
    pub(crate) fn add_metrics_for_measures(&mut self) {
        let measures: Vec<Mapping> = mappings(self.semantic_model.get_sequence("measures")).cloned().collect();
        for measure in measures {
            let Some(measure_name) = measure.get_str("name") else {
                continue;
            };
            if self.definitions.is_initial_metric(measure_name)
                || self.definitions.artificial_metric_name_exists(measure_name)
            {
                continue;
            }
            let hidden = if truthy(measure.get("create_metric")) {
                false
            } else if self.definitions.is_measure_merged(measure_name) {
                continue;
            } else {
                true
            };

            if let Some((metric_name, true)) = self.metric_for_measure(&measure, None, None, hidden) {
                self.logs.push(format!(
                    "Added simple metric '{}' to model '{}'.",
                    metric_name, self.model_name
                ));
            }
        }
    }

    /// Move every top-level metric whose inputs all live on this model
    pub(crate) fn merge_complex_metrics(&mut self) {
        for index in 0..self.definitions.metric_count() {
            let name = &self.definitions.metric_at(index).0;
            if self.definitions.is_metric_merged(name) {
                continue;
            }
            self.merge_top_level(index);
        }
    }

    fn metric_known(&self, name: &str) -> bool {
        self.on_model(name) || self.definitions.is_initial_metric(name)
    }

    /// Whether the named metric is, or could be put, on this model
    ///
    /// `None` when no metric by that name exists.
    fn merge_named(&mut self, name: &str) -> Option<bool> {
        if self.on_model(name) {
            return Some(true);
        }
        let index = self.definitions.metric_index(name)?;
        Some(self.merge_top_level(index))
    }

    fn merge_top_level(&mut self, index: usize) -> bool {
        let (name, mut metric) = self.definitions.metric_at(index).clone();
        let kind = metric.get_str("type").unwrap_or_default().to_string();
        if kind == "simple" || self.definitions.is_metric_merged(&name) {
            return self.on_model(&name);
        }
        if !self.visiting.insert(name.clone()) {
            return false;
        }

        let moved = match kind.as_str() {
            "cumulative" => self.merge_cumulative(&name, &mut metric),
            "conversion" => self.merge_conversion(&name, &mut metric),
            "derived" => self.merge_derived(&name, &mut metric),
            "ratio" => self.merge_ratio(&name, &mut metric),
            other => {
                debug!(metric = %name, kind = other, "Unknown metric type, left at top level");
                false
            }
        };

        self.visiting.remove(&name);
        self.definitions.replace_metric_at(index, metric);
        moved
    }

    fn finish_merge(&mut self, name: &str, kind: &str, metric: &Mapping) {
        push_metric(self.model, metric.clone());
        self.definitions.mark_metric_as_merged(name, None);
        self.logs.push(format!(
            "Added {} metric '{}' to model '{}'.",
            kind, name, self.model_name
        ));
    }

    fn merge_cumulative(&mut self, name: &str, metric: &mut Mapping) -> bool {
        let Some(input) = MeasureInput::parse(metric.get_mapping("type_params").and_then(|tp| tp.get("measure")))
        else {
            return false;
        };
        let Some(measure) = self.measure(&input.name) else {
            return false;
        };
        let Some((input_metric, created)) =
            self.metric_for_measure(&measure, input.fill_nulls_with.as_ref(), input.join_to_timespine, true)
        else {
            return false;
        };
        if created {
            self.logs.push(format!(
                "Added hidden simple metric '{}' to model '{}' as input for cumulative metric '{}'.",
                input_metric, self.model_name, name
            ));
        }

        let mut type_params = into_mapping(metric.remove("type_params"));
        let cumulative = into_mapping(type_params.remove("cumulative_type_params"));
        for field in CUMULATIVE_FIELDS {
            if let Some(value) = cumulative.get(field).filter(|v| is_truthy(v)) {
                metric.insert(*field, value.clone());
            }
        }
        metric.insert("input_metric", input.to_metric_input(&input_metric));

        self.finish_merge(name, "cumulative", metric);
        true
    }

    fn merge_conversion(&mut self, name: &str, metric: &mut Mapping) -> bool {
        let mut conversion = metric
            .get_mapping("type_params")
            .and_then(|tp| tp.get_mapping("conversion_type_params"))
            .cloned()
            .unwrap_or_default();

        let mut found = 0;
        for (measure_key, metric_key) in [("base_measure", "base_metric"), ("conversion_measure", "conversion_metric")] {
            let Some(input) = MeasureInput::parse(conversion.get(measure_key)) else {
                continue;
            };
            let Some(measure) = self.measure(&input.name) else {
                continue;
            };
            let Some((input_metric, created)) =
                self.metric_for_measure(&measure, input.fill_nulls_with.as_ref(), input.join_to_timespine, true)
            else {
                continue;
            };
            if created {
                self.logs.push(format!(
                    "Added hidden simple metric '{}' to model '{}' as {} input for conversion metric '{}'.",
                    input_metric, self.model_name, metric_key, name
                ));
            }
            metric.insert(metric_key, input.to_metric_input(&input_metric));
            conversion.remove(measure_key);
            found += 1;
        }

        if let Some(type_params) = metric.get_mapping_mut("type_params") {
            if type_params.contains_key("conversion_type_params") {
                type_params.insert("conversion_type_params", conversion.clone().into());
            }
        }

        if found < 2 {
            return false;
        }

        let mut type_params = into_mapping(metric.remove("type_params"));
        type_params.remove("conversion_type_params");
        extend(metric, &conversion);
        extend(metric, &type_params);

        self.finish_merge(name, "conversion", metric);
        true
    }

    fn merge_derived(&mut self, name: &str, metric: &mut Mapping) -> bool {
        let inputs: Vec<String> = metric
            .get_mapping("type_params")
            .and_then(|tp| tp.get_sequence("metrics"))
            .into_iter()
            .flat_map(Sequence::iter)
            .filter_map(|input| metric_input_name(Some(input)))
            .collect();

        for input in &inputs {
            if self.merge_named(input) != Some(true) {
                return false;
            }
        }

        flatten_type_params(metric);
        metrics_to_input_metrics(metric);
        self.finish_merge(name, "derived", metric);
        true
    }

    fn merge_ratio(&mut self, name: &str, metric: &mut Mapping) -> bool {
        let type_params = metric.get_mapping("type_params");
        let (Some(numerator), Some(denominator)) = (
            metric_input_name(type_params.and_then(|tp| tp.get("numerator"))),
            metric_input_name(type_params.and_then(|tp| tp.get("denominator"))),
        ) else {
            return false;
        };
        if !self.metric_known(&numerator) || !self.metric_known(&denominator) {
            return false;
        }

        let numerator_on_model = self.merge_named(&numerator) == Some(true);
        let denominator_on_model = self.merge_named(&denominator) == Some(true);
        if !(numerator_on_model && denominator_on_model) {
            return false;
        }

        flatten_type_params(metric);
        self.finish_merge(name, "ratio", metric);
        true
    }
}

/// Rewrite a metric that stays at the top level into the new syntax
///
/// Conversion measures are replaced by the metrics created for them;
/// a measure without such a metric is dropped.
pub(crate) fn migrate_top_level_metric(metric: &mut Mapping, definitions: &SemanticDefinitions) {
    if metric.get_str("type") != Some("conversion") {
        flatten_type_params(metric);
        metrics_to_input_metrics(metric);
        return;
    }

    let mut type_params = into_mapping(metric.remove("type_params"));
    let mut conversion = into_mapping(type_params.remove("conversion_type_params"));
    for (measure_key, metric_key) in [("base_measure", "base_metric"), ("conversion_measure", "conversion_metric")] {
        let removed = conversion.remove(measure_key);
        let Some(input) = MeasureInput::parse(removed.as_ref()) else {
            continue;
        };
        if let Some(input_metric) =
            definitions.artificial_metric(&input.name, input.fill_nulls_with_text(), input.join_to_timespine)
        {
            metric.insert(metric_key, input.to_metric_input(input_metric));
        }
    }
    extend(metric, &conversion);
    extend(metric, &type_params);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusefix_yaml::Document;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(yaml: &str) -> Mapping {
        Document::parse(yaml).unwrap().as_mapping().unwrap().clone()
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&Node::null())));
        assert!(!truthy(Some(&Node::bool(false))));
        assert!(!truthy(Some(&Node::string(""))));
        assert!(!truthy(Some(&Node::sequence())));
        assert!(truthy(Some(&Node::string("sum"))));
        assert!(!truthy(mapping("v: 0\n").get("v")));
    }

    #[test]
    fn artificial_names_avoid_existing_metrics() {
        let mut definitions = SemanticDefinitions::default();
        definitions
            .add_yaml("metrics:\n  - name: orders_fill_nulls_with_negative_1\n    type: simple\n")
            .unwrap();

        assert_eq!(artificial_metric_name("orders", None, None, &definitions), "orders");
        assert_eq!(
            artificial_metric_name("orders", Some("-1"), None, &definitions),
            "orders_fill_nulls_with_negative_1_1"
        );
        assert_eq!(
            artificial_metric_name("orders", Some("zero"), Some(true), &definitions),
            "orders_fill_nulls_with_zero_join_to_timespine"
        );
    }

    #[test]
    fn derived_inputs_are_flattened() {
        let mut metric = mapping("name: d\ntype: derived\ntype_params:\n  expr: a + b\n  metrics:\n    - a\n    - name: b\n      alias: bb\n");
        flatten_type_params(&mut metric);
        metrics_to_input_metrics(&mut metric);

        assert_eq!(
            metric.to_json(),
            json!({
                "name": "d",
                "type": "derived",
                "expr": "a + b",
                "input_metrics": [{"name": "a"}, {"name": "b", "alias": "bb"}]
            })
        );
    }

    #[test]
    fn entities_and_dimensions_find_their_columns() {
        let mut definitions = SemanticDefinitions::default();
        definitions
            .add_yaml(
                "\
semantic_models:
  - name: orders
    model: ref('orders')
    description: Order facts.
    defaults:
      agg_time_dimension: ordered_at
    entities:
      - name: order
        type: primary
        expr: order_id
      - name: customer
        type: foreign
        expr: \"coalesce(customer_id, 0)\"
    dimensions:
      - name: ordered_at
        type: time
        type_params:
          time_granularity: day
",
            )
            .unwrap();

        let mut model = mapping("name: orders\ncolumns:\n  - name: order_id\n");
        let log = merge_semantic_model(&mut model, &mut definitions).unwrap();

        assert!(log.starts_with("Model 'orders' - Merged with semantic model 'orders'."));
        assert!(log.contains("\n\t* Added 'primary' entity to column 'order_id'."));
        assert!(log.contains("\n\t* Added new column 'ordered_at' with 'time' dimension."));
        assert_eq!(
            model.to_json(),
            json!({
                "name": "orders",
                "columns": [
                    {"name": "order_id", "entity": {"type": "primary", "name": "order"}},
                    {"name": "ordered_at", "dimension": {"type": "time"}, "granularity": "day"}
                ],
                "semantic_model": {"enabled": true},
                "description": "Order facts.",
                "agg_time_dimension": "ordered_at",
                "derived_semantics": {
                    "entities": [{"name": "customer", "type": "foreign", "expr": "coalesce(customer_id, 0)"}]
                }
            })
        );
        assert!(definitions.is_semantic_model_merged("orders"));
        assert_eq!(definitions.model_for_semantic_model("orders"), Some("orders"));
    }

    #[test]
    fn conversion_metric_without_local_measures_is_migrated_in_place() {
        let mut definitions = SemanticDefinitions::default();
        definitions.record_artificial_metric("visits", None, None, "visits");

        let mut metric = mapping(
            "\
name: conv
type: conversion
type_params:
  conversion_type_params:
    base_measure: visits
    conversion_measure: buys
    entity: user
",
        );
        migrate_top_level_metric(&mut metric, &definitions);

        assert_eq!(
            metric.to_json(),
            json!({"name": "conv", "type": "conversion", "base_metric": "visits", "entity": "user"})
        );
    }
}
