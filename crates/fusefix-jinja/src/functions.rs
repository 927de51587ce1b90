//! dbt Jinja functions
//!
//! Stand-ins good enough to evaluate a config call without a project.

use minijinja::{Error, ErrorKind, Value};

/// ref() function
///
/// Usage in Jinja: {{ ref('model_name') }} or {{ ref('package', 'model_name') }}
/// Returns: model_name
pub fn ref_function(model_or_package: Value, model_name: Option<Value>) -> Result<Value, Error> {
    let model = model_name.unwrap_or(model_or_package);
    let model_str = model.as_str().ok_or_else(|| {
        Error::new(ErrorKind::InvalidOperation, "ref() model name must be a string")
    })?;

    Ok(Value::from(model_str))
}

/// source() function
///
/// Usage in Jinja: {{ source('source_name', 'table_name') }}
/// Returns: source_name.table_name
pub fn source_function(source_name: Value, table_name: Value) -> Result<Value, Error> {
    match (source_name.as_str(), table_name.as_str()) {
        (Some(source), Some(table)) => Ok(Value::from(format!("{}.{}", source, table))),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            "source() arguments must be strings",
        )),
    }
}

/// var() function
///
/// No project variables are known, so this is the default when one is
/// given and undefined otherwise.
pub fn var_function(_name: Value, default: Option<Value>) -> Value {
    default.unwrap_or(Value::UNDEFINED)
}

/// env_var() function
///
/// The environment is never read: the default when given, else an empty string.
pub fn env_var_function(_name: Value, default: Option<Value>) -> Value {
    default.unwrap_or_else(|| Value::from(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_single_arg() {
        let result = ref_function(Value::from("orders"), None).unwrap();
        assert_eq!(result.as_str().unwrap(), "orders");
    }

    #[test]
    fn test_ref_two_args() {
        let result = ref_function(Value::from("finance"), Some(Value::from("orders"))).unwrap();
        assert_eq!(result.as_str().unwrap(), "orders");
    }

    #[test]
    fn test_source() {
        let result = source_function(Value::from("raw"), Value::from("customers")).unwrap();
        assert_eq!(result.as_str().unwrap(), "raw.customers");
        assert!(source_function(Value::from(1), Value::from("x")).is_err());
    }

    #[test]
    fn test_var_and_env_var_defaults() {
        assert!(var_function(Value::from("start"), None).is_undefined());
        assert_eq!(var_function(Value::from("start"), Some(Value::from(3))), Value::from(3));
        assert_eq!(env_var_function(Value::from("HOME"), None).as_str(), Some(""));
    }
}
