//! Structured-output contract for grading replies.
//!
//! The schema is what the model is asked to produce; the parser checks that
//! it did.

mod parser;
mod schema;

pub use parser::{parse_payload, parse_reply, GradingPayload, MalformedResponse, ModelReply};
pub use schema::{
    grading_schema, validate_grading_schema, SchemaError, GRADING_TOOL_DESCRIPTION,
    GRADING_TOOL_NAME,
};
