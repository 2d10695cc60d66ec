//! Score aggregation: four sub-scores into one overall quality score.
//!
//! Sub-scores run "10 is worst". The overall score runs "10 is best", so each
//! sub-score is inverted (`11 - score`) before the four are averaged with
//! floor division:
//!
//! ```text
//! overall = ((11 - a) + (11 - b) + (11 - c) + (11 - d)) / 4
//! ```
//!
//! There is no fallback value. Out-of-range input is a [`ScoreError`].

use crate::types::{Score, ScoreError};

/// Aggregate four raw sub-scores.
///
/// # Errors
///
/// Returns [`ScoreError::OutOfRange`] for the first input outside `1..=10`.
pub fn aggregate(
    ambiguity: i64,
    contradictions: i64,
    context: i64,
    grammar: i64,
) -> Result<Score, ScoreError> {
    Ok(aggregate_scores([
        Score::new(ambiguity)?,
        Score::new(contradictions)?,
        Score::new(context)?,
        Score::new(grammar)?,
    ]))
}

/// Aggregate already-validated sub-scores. Infallible.
pub fn aggregate_scores(scores: [Score; 4]) -> Score {
    let total: u32 = scores
        .iter()
        .map(|s| u32::from(s.inverted().get()))
        .sum();

    // Four values in 1..=10 sum to 4..=40, so the quotient stays in 1..=10.
    Score::from_valid((total / scores.len() as u32) as u8)
}
