//! Parsing model replies into validated grading payloads.
//!
//! A reply is either a tool call carrying JSON arguments, or free text.
//! Anything that does not validate against the grading schema is a
//! [`MalformedResponse`]. Scores are never clamped or defaulted.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use super::schema::{validate_grading_schema, GRADING_TOOL_NAME};
use crate::types::{Dimension, DimensionScores, RubricScore, Score, ScoreError};

lazy_static! {
    static ref FENCED_JSON: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced JSON regex");
}

/// The model produced a reply that cannot be used as a grading.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedResponse {
    #[error("model did not return a structured grading")]
    NoStructuredOutput,

    #[error("model called unexpected tool '{name}' (expected '{expected}')", expected = GRADING_TOOL_NAME)]
    UnexpectedTool { name: String },

    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("reply does not match the grading schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("invalid {field}: {source}")]
    InvalidScore {
        field: &'static str,
        #[source]
        source: ScoreError,
    },
}

/// A raw reply from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// Structured tool/function call with JSON-encoded arguments
    ToolCall { name: String, arguments: String },

    /// Free text
    Text(String),
}

/// A reply that passed validation: four scores and the assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingPayload {
    pub scores: DimensionScores,
    pub overall_assessment: String,
}

/// Wire shape of the structured reply. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct RawGrading {
    ambiguity_score: i64,
    contradictions_score: i64,
    context_score: i64,
    grammar_score: i64,
    ambiguity_explanation: String,
    contradictions_explanation: String,
    context_explanation: String,
    grammar_explanation: String,
    overall_assessment: String,
}

impl RawGrading {
    fn into_payload(self) -> Result<GradingPayload, MalformedResponse> {
        let score = |dimension: Dimension, value: i64| {
            Score::new(value).map_err(|source| MalformedResponse::InvalidScore {
                field: dimension.score_field(),
                source,
            })
        };

        Ok(GradingPayload {
            scores: DimensionScores {
                ambiguity: RubricScore::new(
                    score(Dimension::Ambiguity, self.ambiguity_score)?,
                    self.ambiguity_explanation,
                ),
                contradictions: RubricScore::new(
                    score(Dimension::Contradictions, self.contradictions_score)?,
                    self.contradictions_explanation,
                ),
                context: RubricScore::new(
                    score(Dimension::Context, self.context_score)?,
                    self.context_explanation,
                ),
                grammar: RubricScore::new(
                    score(Dimension::Grammar, self.grammar_score)?,
                    self.grammar_explanation,
                ),
            },
            overall_assessment: self.overall_assessment,
        })
    }
}

/// Parse any model reply.
pub fn parse_reply(reply: &ModelReply) -> Result<GradingPayload, MalformedResponse> {
    match reply {
        ModelReply::ToolCall { name, arguments } => {
            if name != GRADING_TOOL_NAME {
                return Err(MalformedResponse::UnexpectedTool { name: name.clone() });
            }
            let value: JsonValue = serde_json::from_str(arguments)
                .map_err(|e| MalformedResponse::InvalidJson(e.to_string()))?;
            parse_payload(&value)
        }
        ModelReply::Text(text) => {
            let value = extract_json_object(text).ok_or(MalformedResponse::NoStructuredOutput)?;
            parse_payload(&value)
        }
    }
}

/// Validate a structured payload and convert it to typed scores.
pub fn parse_payload(value: &JsonValue) -> Result<GradingPayload, MalformedResponse> {
    validate_grading_schema(value).map_err(MalformedResponse::SchemaViolation)?;

    // The schema accepts integral floats such as 3.0; strict i64 decoding
    // rejects them here.
    let raw: RawGrading = serde_json::from_value(value.clone())
        .map_err(|e| MalformedResponse::SchemaViolation(vec![e.to_string()]))?;

    raw.into_payload()
}

/// Pull a JSON object out of free text.
///
/// Accepts text that is entirely a JSON object, or contains one inside a
/// fenced code block. Returns `None` otherwise.
fn extract_json_object(text: &str) -> Option<JsonValue> {
    let trimmed = text.trim();

    if let Ok(value @ JsonValue::Object(_)) = serde_json::from_str::<JsonValue>(trimmed) {
        return Some(value);
    }

    let caps = FENCED_JSON.captures(trimmed)?;
    let block = caps.get(1)?.as_str();
    debug!(block_len = block.len(), "Found fenced JSON block in text reply");

    match serde_json::from_str::<JsonValue>(block) {
        Ok(value @ JsonValue::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_json() -> JsonValue {
        json!({
            "ambiguity_score": 3,
            "contradictions_score": 1,
            "context_score": 7,
            "grammar_score": 2,
            "ambiguity_explanation": "The genre, length and audience are unspecified.",
            "contradictions_explanation": "None.",
            "context_explanation": "No background is given about tone or purpose.",
            "grammar_explanation": "Fine, though it lacks a period.",
            "overall_assessment": "Clear but underspecified."
        })
    }

    fn tool_call(value: &JsonValue) -> ModelReply {
        ModelReply::ToolCall {
            name: GRADING_TOOL_NAME.to_string(),
            arguments: value.to_string(),
        }
    }

    #[test]
    fn test_parse_valid_tool_call() {
        let payload = parse_reply(&tool_call(&payload_json())).unwrap();

        assert_eq!(payload.scores.ambiguity.score.get(), 3);
        assert_eq!(payload.scores.contradictions.score.get(), 1);
        assert_eq!(payload.scores.context.score.get(), 7);
        assert_eq!(payload.scores.grammar.score.get(), 2);
        assert_eq!(payload.overall_assessment, "Clear but underspecified.");
    }

    #[test]
    fn test_text_fields_round_trip_exactly() {
        let mut value = payload_json();
        let odd = "  Leading space, unicode \u{2014} \"quotes\", <tags> & newlines\n\tend  ";
        value["grammar_explanation"] = json!(odd);
        value["overall_assessment"] = json!(odd);

        let payload = parse_payload(&value).unwrap();
        assert_eq!(payload.scores.grammar.explanation, odd);
        assert_eq!(payload.overall_assessment, odd);
    }

    #[test]
    fn test_missing_grammar_rejected() {
        let mut value = payload_json();
        value.as_object_mut().unwrap().remove("grammar_score");

        let result = parse_payload(&value);
        assert!(matches!(result, Err(MalformedResponse::SchemaViolation(_))));
    }

    #[test]
    fn test_missing_explanation_rejected() {
        let mut value = payload_json();
        value.as_object_mut().unwrap().remove("context_explanation");
        assert!(parse_payload(&value).is_err());
    }

    #[test]
    fn test_out_of_range_rejected_not_clamped() {
        for bad in [0, 11, -1, 100] {
            let mut value = payload_json();
            value["ambiguity_score"] = json!(bad);
            assert!(parse_payload(&value).is_err(), "accepted score {}", bad);
        }
    }

    #[test]
    fn test_non_integer_rejected() {
        for bad in [json!(3.5), json!(3.0), json!("3"), json!(null), json!(true)] {
            let mut value = payload_json();
            value["contradictions_score"] = bad.clone();
            assert!(parse_payload(&value).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_extra_fields_ignored() {
        let mut value = payload_json();
        value["confidence"] = json!(0.9);
        assert!(parse_payload(&value).is_ok());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(parse_payload(&json!([1, 2, 3])).is_err());
        assert!(parse_payload(&json!("grading")).is_err());
    }

    #[test]
    fn test_invalid_arguments_json() {
        let reply = ModelReply::ToolCall {
            name: GRADING_TOOL_NAME.to_string(),
            arguments: "{not json".to_string(),
        };
        assert!(matches!(
            parse_reply(&reply),
            Err(MalformedResponse::InvalidJson(_))
        ));
    }

    #[test]
    fn test_unexpected_tool() {
        let reply = ModelReply::ToolCall {
            name: "ImprovePrompt".to_string(),
            arguments: payload_json().to_string(),
        };
        assert!(matches!(
            parse_reply(&reply),
            Err(MalformedResponse::UnexpectedTool { .. })
        ));
    }

    #[test]
    fn test_plain_text_is_declined() {
        let reply = ModelReply::Text("I'd rather not grade this prompt.".to_string());
        assert_eq!(parse_reply(&reply), Err(MalformedResponse::NoStructuredOutput));
    }

    #[test]
    fn test_text_json_object_accepted() {
        let reply = ModelReply::Text(payload_json().to_string());
        assert!(parse_reply(&reply).is_ok());
    }

    #[test]
    fn test_fenced_json_accepted() {
        let text = format!(
            "Here is the grading:\n```json\n{}\n```\nHope that helps.",
            serde_json::to_string_pretty(&payload_json()).unwrap()
        );
        let payload = parse_reply(&ModelReply::Text(text)).unwrap();
        assert_eq!(payload.scores.context.score.get(), 7);
    }

    #[test]
    fn test_fenced_invalid_payload_is_schema_error() {
        let text = "```json\n{\"ambiguity_score\": 3}\n```";
        assert!(matches!(
            parse_reply(&ModelReply::Text(text.to_string())),
            Err(MalformedResponse::SchemaViolation(_))
        ));
    }
}
