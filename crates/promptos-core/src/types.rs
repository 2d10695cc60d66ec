//! Core types for prompt grading.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::response::GradingPayload;

/// Errors for values that cannot be a rubric score.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("score {value} is outside the range {min}-{max}", min = Score::MIN, max = Score::MAX)]
    OutOfRange { value: i64 },
}

/// An integer rubric score in `1..=10`.
///
/// The range is checked on construction, so a `Score` held anywhere in the
/// crate is always valid. Out-of-range input is rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Validate a raw integer as a score.
    pub fn new(value: i64) -> Result<Self, ScoreError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreError::OutOfRange { value })
        }
    }

    /// Caller guarantees `value` is in range.
    pub(crate) const fn from_valid(value: u8) -> Self {
        Self(value)
    }

    /// The underlying integer.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Flip the scale direction: 10 becomes 1 and 1 becomes 10.
    pub fn inverted(self) -> Self {
        Self(Self::MAX + Self::MIN - self.0)
    }
}

impl TryFrom<i64> for Score {
    type Error = ScoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four graded dimensions.
///
/// Every dimension is scored so that 10 is the worst outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Ambiguity,
    Contradictions,
    Context,
    Grammar,
}

impl Dimension {
    /// All dimensions in rubric order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Ambiguity,
        Dimension::Contradictions,
        Dimension::Context,
        Dimension::Grammar,
    ];

    /// Key used in serialized results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Ambiguity => "ambiguity",
            Dimension::Contradictions => "contradictions",
            Dimension::Context => "context",
            Dimension::Grammar => "grammar",
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Ambiguity => "Ambiguity",
            Dimension::Contradictions => "Contradictions",
            Dimension::Context => "Context",
            Dimension::Grammar => "Grammar",
        }
    }

    /// What a 10 means for this dimension.
    pub fn worst_case(&self) -> &'static str {
        match self {
            Dimension::Ambiguity => "10 is high ambiguity",
            Dimension::Contradictions => "10 is high contradictions",
            Dimension::Context => "10 is no context",
            Dimension::Grammar => "10 is severe grammar issues",
        }
    }

    /// Name of the score field in the structured model reply.
    pub fn score_field(&self) -> &'static str {
        match self {
            Dimension::Ambiguity => "ambiguity_score",
            Dimension::Contradictions => "contradictions_score",
            Dimension::Context => "context_score",
            Dimension::Grammar => "grammar_score",
        }
    }

    /// Name of the explanation field in the structured model reply.
    pub fn explanation_field(&self) -> &'static str {
        match self {
            Dimension::Ambiguity => "ambiguity_explanation",
            Dimension::Contradictions => "contradictions_explanation",
            Dimension::Context => "context_explanation",
            Dimension::Grammar => "grammar_explanation",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score and explanation for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricScore {
    pub score: Score,
    pub explanation: String,
}

impl RubricScore {
    pub fn new(score: Score, explanation: impl Into<String>) -> Self {
        Self {
            score,
            explanation: explanation.into(),
        }
    }
}

/// One [`RubricScore`] per dimension.
///
/// The struct has exactly one field per [`Dimension`], so a set of scores
/// missing a dimension cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub ambiguity: RubricScore,
    pub contradictions: RubricScore,
    pub context: RubricScore,
    pub grammar: RubricScore,
}

impl DimensionScores {
    /// Get the score for a dimension.
    pub fn get(&self, dimension: Dimension) -> &RubricScore {
        match dimension {
            Dimension::Ambiguity => &self.ambiguity,
            Dimension::Contradictions => &self.contradictions,
            Dimension::Context => &self.context,
            Dimension::Grammar => &self.grammar,
        }
    }

    /// Iterate in rubric order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &RubricScore)> + '_ {
        Dimension::ALL.into_iter().map(move |d| (d, self.get(d)))
    }

    /// Overall quality score (higher is better).
    pub fn overall(&self) -> Score {
        crate::aggregate::aggregate_scores([
            self.ambiguity.score,
            self.contradictions.score,
            self.context.score,
            self.grammar.score,
        ])
    }
}

/// A validated grading of one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingResult {
    /// The prompt exactly as submitted
    pub original_prompt: String,

    /// Per-dimension scores (10 is worst)
    pub scores: DimensionScores,

    /// Aggregate quality (10 is best)
    pub overall_score: Score,

    /// The model's summary of the prompt
    pub overall_assessment: String,
}

impl GradingResult {
    /// Compose a result, computing the overall score from the sub-scores.
    pub fn new(
        original_prompt: impl Into<String>,
        scores: DimensionScores,
        overall_assessment: impl Into<String>,
    ) -> Self {
        let overall_score = scores.overall();
        Self {
            original_prompt: original_prompt.into(),
            scores,
            overall_score,
            overall_assessment: overall_assessment.into(),
        }
    }

    /// Compose a result from a validated reply payload.
    pub fn from_payload(original_prompt: impl Into<String>, payload: GradingPayload) -> Self {
        Self::new(original_prompt, payload.scores, payload.overall_assessment)
    }
}
