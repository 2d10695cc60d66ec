//! Human-readable rendering of gradings and history.

use std::fmt::Write;
use std::time::Duration;

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};

use promptos_core::{GradingResult, Score};
use promptos_runtime::HistoryEntry;

const RULE_WIDTH: usize = 50;
const PROMPT_PREVIEW_CHARS: usize = 60;

/// A stderr spinner shown while a model call runs.
///
/// indicatif draws nothing when stderr is not a terminal, so piped output
/// stays clean. `visible: false` gives a spinner that never draws.
pub fn progress(message: &'static str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Sub-scores: 10 is worst.
fn severity(score: Score) -> ColoredString {
    let text = format!("{}/10", score);
    match score.get() {
        1..=3 => text.green(),
        4..=6 => text.yellow(),
        _ => text.red(),
    }
}

/// Overall score: 10 is best.
fn quality(score: Score) -> ColoredString {
    let text = format!("{}/10", score);
    match score.get() {
        8..=10 => text.green().bold(),
        5..=7 => text.yellow().bold(),
        _ => text.red().bold(),
    }
}

pub fn render_result(result: &GradingResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{}", "PROMPT GRADING".bold());
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Original prompt: {}", result.original_prompt);
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", "SCORES (1-10 scale):".bold());
    for (dimension, rubric) in result.scores.iter() {
        let _ = writeln!(
            out,
            "  {} ({}): {}",
            dimension.label(),
            dimension.worst_case(),
            severity(rubric.score)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", "EXPLANATIONS:".bold());
    for (dimension, rubric) in result.scores.iter() {
        let _ = writeln!(out, "  {}: {}", dimension.label(), rubric.explanation);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", "OVERALL ASSESSMENT:".bold());
    let _ = writeln!(out, "  {}", result.overall_assessment);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{} {} (10 is best)",
        "OVERALL SCORE:".bold(),
        quality(result.overall_score)
    );
    out
}

/// One line per entry, newest first as given.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No graded prompts yet.\n".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {}  {:<12}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            quality(entry.result.overall_score),
            entry.model,
            preview(&entry.result.original_prompt)
        );
    }
    out
}

/// Single-line, length-limited view of a prompt.
fn preview(prompt: &str) -> String {
    let flat = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PROMPT_PREVIEW_CHARS {
        let cut: String = flat.chars().take(PROMPT_PREVIEW_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
