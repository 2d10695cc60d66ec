//! JSON Schema for the structured grading reply.
//!
//! The same schema is sent to the model as the tool definition and used to
//! check whatever comes back.

use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use thiserror::Error;

/// Tool name the model is asked to call.
pub const GRADING_TOOL_NAME: &str = "GradingResult";

/// Tool description sent alongside the schema.
pub const GRADING_TOOL_DESCRIPTION: &str = "Schema for prompt grading results";

/// Embedded grading schema (loaded at compile time).
const GRADING_SCHEMA_JSON: &str = include_str!("../../../../schema/grading_result.schema.json");

static SCHEMA_VALUE: OnceLock<Result<JsonValue, String>> = OnceLock::new();

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

/// The grading schema as JSON, suitable for a tool/function definition.
pub fn grading_schema() -> Result<&'static JsonValue, SchemaError> {
    SCHEMA_VALUE
        .get_or_init(|| {
            serde_json::from_str(GRADING_SCHEMA_JSON)
                .map_err(|e| format!("Invalid schema JSON: {}", e))
        })
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value = grading_schema().map_err(|e| e.to_string())?;
        jsonschema::options()
            .build(schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a reply payload against the grading schema.
///
/// Returns every violation found, not just the first.
pub fn validate_grading_schema(payload: &JsonValue) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> JsonValue {
        json!({
            "ambiguity_score": 3,
            "contradictions_score": 1,
            "context_score": 7,
            "grammar_score": 2,
            "ambiguity_explanation": "a",
            "contradictions_explanation": "b",
            "context_explanation": "c",
            "grammar_explanation": "d",
            "overall_assessment": "e"
        })
    }

    #[test]
    fn test_schema_lists_all_fields_as_required() {
        let schema = grading_schema().unwrap();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 9);
        assert!(required.contains(&json!("grammar_score")));
        assert!(required.contains(&json!("overall_assessment")));
    }

    #[test]
    fn test_valid_payload_passes() {
        assert!(validate_grading_schema(&valid_payload()).is_ok());
    }

    #[test]
    fn test_missing_field_fails() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("grammar_score");
        let errors = validate_grading_schema(&payload).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("grammar_score")));
    }

    #[test]
    fn test_out_of_range_fails() {
        let mut payload = valid_payload();
        payload["context_score"] = json!(11);
        assert!(validate_grading_schema(&payload).is_err());

        payload["context_score"] = json!(0);
        assert!(validate_grading_schema(&payload).is_err());
    }

    #[test]
    fn test_wrong_types_fail() {
        let mut payload = valid_payload();
        payload["ambiguity_score"] = json!("3");
        assert!(validate_grading_schema(&payload).is_err());

        let mut payload = valid_payload();
        payload["ambiguity_explanation"] = json!(42);
        assert!(validate_grading_schema(&payload).is_err());
    }

    #[test]
    fn test_collects_every_violation() {
        let payload = json!({ "ambiguity_score": 20 });
        let errors = validate_grading_schema(&payload).unwrap_err();
        assert!(errors.len() >= 2);
    }
}
