//! Rubric template loading and grading request construction.
//!
//! The message sent to the model is the rubric text, a fixed separator, and
//! then the user prompt. The user prompt is passed through verbatim: it is
//! not escaped or filtered, so instructions embedded in it reach the model
//! unchanged. Callers that grade untrusted prompts should treat the model
//! reply accordingly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Built-in rubric (compiled in).
pub const DEFAULT_RUBRIC: &str = include_str!("../../../prompts/prompt_grader.txt");

/// Separator between the rubric and the prompt under evaluation.
pub const PROMPT_SEPARATOR: &str = "\n\nPrompt to grade: ";

/// Errors loading a rubric template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("rubric template not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read rubric template {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rubric template is empty: {}", path.display())]
    Empty { path: PathBuf },
}

/// Where the rubric text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemplateSource {
    /// The rubric compiled into the binary
    #[default]
    Builtin,

    /// A plain-text file, read on every load
    File(PathBuf),
}

/// Loaded rubric instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubricTemplate {
    text: String,
}

impl RubricTemplate {
    /// The compiled-in rubric.
    pub fn builtin() -> Self {
        Self {
            text: DEFAULT_RUBRIC.trim().to_string(),
        }
    }

    /// Load from a source.
    pub fn load(source: &TemplateSource) -> Result<Self, TemplateError> {
        match source {
            TemplateSource::Builtin => Ok(Self::builtin()),
            TemplateSource::File(path) => Self::from_file(path),
        }
    }

    /// Read a rubric file. Surrounding whitespace is trimmed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                TemplateError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                TemplateError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let text = contents.trim();
        if text.is_empty() {
            return Err(TemplateError::Empty {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            text: text.to_string(),
        })
    }

    /// The rubric text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Build the full message for a prompt.
    pub fn build_message(&self, prompt: &str) -> String {
        let mut message =
            String::with_capacity(self.text.len() + PROMPT_SEPARATOR.len() + prompt.len());
        message.push_str(&self.text);
        message.push_str(PROMPT_SEPARATOR);
        message.push_str(prompt);
        message
    }
}

/// Everything needed for one grading call. Built per call and dropped after.
#[derive(Debug, Clone)]
pub struct GradingRequest {
    pub prompt: String,
    pub model: String,
    pub rubric: RubricTemplate,
}

impl GradingRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, rubric: RubricTemplate) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            rubric,
        }
    }

    /// The message text sent to the model.
    pub fn message(&self) -> String {
        self.rubric.build_message(&self.prompt)
    }
}
