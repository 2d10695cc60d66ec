//! # promptos-core
//!
//! Deterministic building blocks for prompt grading.
//!
//! The grading itself is done by a language model. This crate owns
//! everything around that call that can be checked locally:
//! - The rubric text and the message built from it
//! - The schema the model must answer with, and the parser that enforces it
//! - The aggregation of four sub-scores into one overall score
//!
//! ## Key Guarantees
//!
//! 1. **No network**: Nothing here talks to a model
//! 2. **No clamping**: Out-of-range scores are errors, never adjusted
//! 3. **Exhaustive**: A result always carries all four dimensions
//!
//! ## Example
//!
//! ```rust,ignore
//! use promptos_core::{grade_reply, ModelReply};
//!
//! let reply = ModelReply::ToolCall { name: "GradingResult".into(), arguments };
//! let result = grade_reply("Write a story about a cat", &reply)?;
//! println!("overall {}/10", result.overall_score);
//! ```

pub mod aggregate;
pub mod response;
pub mod rubric;
pub mod types;

// Re-export main types at crate root
pub use aggregate::{aggregate, aggregate_scores};
pub use response::{
    grading_schema, parse_payload, parse_reply, GradingPayload, MalformedResponse, ModelReply,
    GRADING_TOOL_DESCRIPTION, GRADING_TOOL_NAME,
};
pub use rubric::{
    GradingRequest, RubricTemplate, TemplateError, TemplateSource, DEFAULT_RUBRIC, PROMPT_SEPARATOR,
};
pub use types::{Dimension, DimensionScores, GradingResult, RubricScore, Score, ScoreError};

/// Validate a model reply and compose the grading for `prompt`.
///
/// This is the local half of a grading: everything after the model call.
pub fn grade_reply(prompt: &str, reply: &ModelReply) -> Result<GradingResult, MalformedResponse> {
    let payload = parse_reply(reply)?;
    Ok(GradingResult::from_payload(prompt, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_reply_end_to_end() {
        let arguments = serde_json::json!({
            "ambiguity_score": 3,
            "contradictions_score": 1,
            "context_score": 7,
            "grammar_score": 2,
            "ambiguity_explanation": "Open-ended.",
            "contradictions_explanation": "None.",
            "context_explanation": "Little context.",
            "grammar_explanation": "Fine.",
            "overall_assessment": "Simple prompt."
        })
        .to_string();
        let reply = ModelReply::ToolCall {
            name: GRADING_TOOL_NAME.to_string(),
            arguments,
        };

        let result = grade_reply("Write a story about a cat", &reply).unwrap();

        // floor((8 + 10 + 4 + 9) / 4)
        assert_eq!(result.overall_score.get(), 7);
        assert_eq!(result.original_prompt, "Write a story about a cat");
        assert_eq!(result.overall_assessment, "Simple prompt.");
    }

    #[test]
    fn test_grade_reply_missing_dimension() {
        let reply = ModelReply::ToolCall {
            name: GRADING_TOOL_NAME.to_string(),
            arguments: r#"{"ambiguity_score": 3, "contradictions_score": 1, "context_score": 7,
                "ambiguity_explanation": "a", "contradictions_explanation": "b",
                "context_explanation": "c", "grammar_explanation": "d",
                "overall_assessment": "e"}"#
                .to_string(),
        };

        assert!(matches!(
            grade_reply("Write a story about a cat", &reply),
            Err(MalformedResponse::SchemaViolation(_))
        ));
    }
}
