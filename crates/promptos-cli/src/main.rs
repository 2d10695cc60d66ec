//! `promptos`: grade prompts from the command line or a browser form.

mod app;
mod report;
mod serve;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use promptos_runtime::{GradeError, GraderSettings, HistoryEntry};

use crate::app::App;

const GRADING_MESSAGE: &str = "Grading prompt...";

#[derive(Parser, Debug)]
#[command(
    name = "promptos",
    about = "Grade prompts for ambiguity, contradictions, context and grammar",
    version,
    after_help = "Examples:\n  promptos grade \"Write a story about a cat\"\n  promptos grade \"Write a story about a cat\" --model gpt-4o --json\n  promptos serve --addr 127.0.0.1:8501"
)]
struct Cli {
    /// Settings file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grade a single prompt
    Grade {
        /// The prompt to grade
        prompt: String,

        #[command(flatten)]
        grader: GraderArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recently graded prompts
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// History file (overrides the settings file)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Serve the interactive grading form
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8501")]
        addr: SocketAddr,

        #[command(flatten)]
        grader: GraderArgs,
    },
}

/// Flags that override the settings file.
#[derive(Args, Debug, Default)]
struct GraderArgs {
    /// Model to use (default: provider's default)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider: openai or anthropic
    #[arg(short, long)]
    provider: Option<String>,

    /// Per-attempt timeout, e.g. 30s or 2m
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Rubric file replacing the built-in rubric
    #[arg(long)]
    template: Option<PathBuf>,

    /// Do not append to the history file
    #[arg(long)]
    no_history: bool,
}

impl GraderArgs {
    fn apply(self, settings: &mut GraderSettings) {
        if let Some(model) = self.model {
            settings.model = Some(model);
        }
        if let Some(provider) = self.provider {
            settings.provider = provider;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = timeout;
        }
        if let Some(template) = self.template {
            settings.template = Some(template);
        }
        if self.no_history {
            settings.history_file = None;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,promptos=debug,promptos_core=debug,promptos_runtime=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = GraderSettings::load(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(path) => format!("Failed to load settings from {}", path.display()),
            None => "Failed to load default settings".to_string(),
        }
    })?;

    match cli.command {
        Command::Grade {
            prompt,
            grader,
            json,
        } => {
            grader.apply(&mut settings);
            grade(settings, &prompt, json, cli.verbose).await
        }
        Command::History { limit, file } => {
            if let Some(file) = file {
                settings.history_file = Some(file);
            }
            history(&settings, limit)
        }
        Command::Serve { addr, grader } => {
            grader.apply(&mut settings);
            let app = App::from_settings(settings)?;
            serve::run(app, addr).await
        }
    }
}

async fn grade(settings: GraderSettings, prompt: &str, json: bool, verbose: bool) -> Result<()> {
    if prompt.trim().is_empty() {
        anyhow::bail!("Please provide a prompt to grade");
    }

    let app = App::from_settings(settings)?;

    // Debug logs share stderr with the spinner, so verbose runs get a plain line
    if verbose {
        eprintln!("{}", GRADING_MESSAGE);
    }
    let spinner = report::progress(GRADING_MESSAGE, !json && !verbose);
    let outcome = app.grader.grade_prompt(prompt, &app.model).await;
    spinner.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            print_hint(&app, &e);
            return Err(e.into());
        }
    };

    app.record(HistoryEntry::now(app.grader.provider_name(), &app.model, result.clone()));

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", report::render_result(&result));
    }
    Ok(())
}

fn print_hint(app: &App, error: &GradeError) {
    let hint = match error {
        GradeError::Configuration(_) => Some(format!(
            "Make sure to set your {} environment variable",
            app.factory.credential_env()
        )),
        other => other.hint().map(str::to_string),
    };
    if let Some(hint) = hint {
        eprintln!("{} {}", "hint:".yellow().bold(), hint);
    }
}

fn history(settings: &GraderSettings, limit: usize) -> Result<()> {
    let Some(log) = app::history_log(settings) else {
        println!("No history file configured (set history_file in the settings file).");
        return Ok(());
    };

    let entries = log
        .recent(limit)
        .with_context(|| format!("Failed to read history from {}", log.path().display()))?;

    print!("{}", report::render_history(&entries));
    Ok(())
}
