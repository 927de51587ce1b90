//! Source-level rewrites of dbt SQL files
//!
//! This crate handles:
//! - Locating `{{ config(...) }}` calls and extracting their arguments statically
//! - Rendering rewritten config calls
//! - Rewriting `config.get` / `config.require` for custom configs
//! - Removing unmatched `{% endmacro %}` / `{% endif %}` tags
//! - Static parsing of `ref(...)` expressions

pub mod accessor;
pub mod config_macro;
pub mod error;
pub mod literal;
pub mod refs;
pub mod tags;

pub use accessor::{rewrite_config_access, AccessReplacement, ConfigAccessRewrite};
pub use config_macro::{
    parse_meta_literal, render_config_call, ArgumentForm, ConfigArgument, ConfigCall,
    ConfigCallExtractor, ConfigValue,
};
pub use error::SqlError;
pub use literal::Literal;
pub use refs::RefArgs;
pub use tags::{remove_unmatched_endings, BlockEnd, RemovedTag, UnmatchedEndings};
