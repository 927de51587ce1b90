//! Config call evaluation
//!
//! Renders a `{{ config(...) }}` call with a capturing `config()` to learn
//! which keys Jinja itself would see.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use minijinja::value::{Kwargs, Rest, ValueKind};
use minijinja::{context, Environment, UndefinedBehavior, Value};
use tracing::debug;

use crate::functions;

/// Error during config rendering
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Jinja render error: {0}")]
    Jinja(String),

    #[error("config() was not called")]
    NotCalled,
}

/// Evaluates config calls in isolation
pub struct ConfigRenderer {
    env: Environment<'static>,
    captured: Arc<Mutex<Option<Vec<String>>>>,
}

impl ConfigRenderer {
    pub fn new() -> Self {
        let captured: Arc<Mutex<Option<Vec<String>>>> = Arc::new(Mutex::new(None));
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);

        env.add_function("ref", functions::ref_function);
        env.add_function("source", functions::source_function);
        env.add_function("var", functions::var_function);
        env.add_function("env_var", functions::env_var_function);

        let sink = Arc::clone(&captured);
        env.add_function("config", move |args: Rest<Value>, kwargs: Kwargs| -> Value {
            let mut keys = Vec::new();
            for arg in args.iter().filter(|a| a.kind() == ValueKind::Map) {
                if let Ok(iter) = arg.try_iter() {
                    keys.extend(iter.filter_map(|k| k.as_str().map(str::to_string)));
                }
            }
            for key in kwargs.args() {
                let _ = kwargs.get::<Value>(key);
                keys.push(key.to_string());
            }
            if let Ok(mut slot) = sink.lock() {
                slot.get_or_insert_with(Vec::new).extend(keys);
            }
            Value::from("")
        });

        Self { env, captured }
    }

    /// Keys passed to `config()` when the call is rendered
    pub fn config_keys(&self, call_source: &str) -> Result<BTreeSet<String>, RenderError> {
        if let Ok(mut slot) = self.captured.lock() {
            *slot = None;
        }

        self.env
            .render_str(call_source, context! {})
            .map_err(|e| RenderError::Jinja(e.to_string()))?;

        let keys = self
            .captured
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(RenderError::NotCalled)?;
        Ok(keys.into_iter().collect())
    }

    /// Warning when rendering sees keys that static extraction missed
    ///
    /// A call that cannot be rendered is not compared.
    pub fn cross_check<'a>(
        &self,
        call_source: &str,
        static_keys: impl IntoIterator<Item = &'a str>,
    ) -> Option<String> {
        let rendered = match self.config_keys(call_source) {
            Ok(keys) => keys,
            Err(e) => {
                debug!("Skipping config cross-check: {}", e);
                return None;
            }
        };
        let extracted: BTreeSet<String> = static_keys.into_iter().map(str::to_string).collect();

        let missing: Vec<&str> = rendered.difference(&extracted).map(String::as_str).collect();
        if missing.is_empty() {
            return None;
        }

        Some(format!(
            "Config keys {:?} could not be read from the source of the config call and were left untouched.",
            missing
        ))
    }
}

impl Default for ConfigRenderer {
    fn default() -> Self {
        Self::new()
    }
}
