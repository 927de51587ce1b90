//! Jinja evaluation of dbt config calls
//!
//! This crate handles:
//! - Providing stand-in dbt functions (ref, source, var, env_var)
//! - Rendering `{{ config(...) }}` calls to capture the keys they pass
//! - Cross-checking rendered keys against statically extracted ones

pub mod functions;
pub mod renderer;

pub use functions::{env_var_function, ref_function, source_function, var_function};
pub use renderer::{ConfigRenderer, RenderError};
