//! JSON Schema validation.
//!
//! Validates workflow event input and MCP tool input against draft-07 style
//! schemas.

use serde_json::Value;

use crate::error::{Result, WorkflowError};

/// Validate `instance` against `schema`. A malformed schema is reported the
/// same way as a failing instance.
pub fn validate(schema: &Value, instance: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| WorkflowError::schema(format!("invalid schema: {e}")))?;
    validator
        .validate(instance)
        .map_err(|e| WorkflowError::schema(e.to_string()))
}

/// Whether `instance` satisfies `schema`; malformed schemas never match.
pub fn is_valid(schema: &Value, instance: &Value) -> bool {
    validate(schema, instance).is_ok()
}
