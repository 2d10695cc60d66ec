//! Interactive grading form.
//!
//! ## Endpoints
//!
//! - `GET /` - Empty form with a fresh session id
//! - `POST /grade` - Form submission; renders the grading or an error
//! - `POST /api/grade` - JSON in, `GradingResult` JSON out
//!
//! Each rendered form carries a `session_id`. While a grading for that id
//! is running, another submission with the same id gets `409 Conflict`.

use std::collections::HashSet;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use colored::Colorize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use promptos_core::GradingResult;
use promptos_runtime::{
    ApiCredential, CredentialSource, GradeError, HistoryEntry, PromptGrader, PromptLog,
    ProviderFactory,
};

use crate::app::App;

const EXAMPLE_PROMPTS: [&str; 3] = [
    "Write a story about a cat",
    "Create a Python function that sorts a list",
    "Write an essay about climate change in exactly 500 words, but make it 1000 words",
];

#[derive(Clone)]
pub struct AppState {
    pub grader: PromptGrader,
    pub factory: Arc<dyn ProviderFactory>,
    pub model: String,
    pub history: Option<PromptLog>,
    pub in_flight: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    pub fn new(app: App) -> Self {
        Self {
            grader: app.grader,
            factory: app.factory,
            model: app.model,
            history: app.history,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn record(&self, result: &GradingResult) {
        if let Some(log) = &self.history {
            let entry = HistoryEntry::now(self.grader.provider_name(), &self.model, result.clone());
            if let Err(e) = log.append(&entry) {
                warn!(error = %e, "Failed to record history entry");
            }
        }
    }
}

/// Marks a session as busy until dropped.
///
/// Dropping the handler future (client gone) releases the session too.
struct InFlight {
    sessions: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl InFlight {
    fn acquire(sessions: &Arc<Mutex<HashSet<String>>>, session_id: &str) -> Option<Self> {
        if sessions.lock().insert(session_id.to_string()) {
            Some(Self {
                sessions: Arc::clone(sessions),
                session_id: session_id.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.session_id);
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/grade", post(grade_form))
        .route("/api/grade", post(grade_api))
        .with_state(state)
}

pub async fn run(app: App, addr: SocketAddr) -> Result<()> {
    let state = AppState::new(app);
    if !state.grader.has_credential() {
        warn!(
            env = state.factory.credential_env(),
            "No API key in environment; the form will ask for one"
        );
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    eprintln!();
    eprintln!(
        "  {} {}",
        "->".bright_green(),
        format!("Open http://{}", addr).bold()
    );
    eprintln!("  {} Press {} to stop", "->".dimmed(), "Ctrl+C".bold());
    eprintln!();

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    eprintln!("\nShutting down...");
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GradeForm {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiGradeRequest {
    pub prompt: String,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&PageView {
        session_id: Uuid::new_v4().to_string(),
        needs_key: !state.grader.has_credential(),
        key_env: state.factory.credential_env(),
        prompt: "",
        message: None,
        result: None,
    }))
}

async fn grade_form(State(state): State<AppState>, Form(form): Form<GradeForm>) -> Response {
    let session_id = if form.session_id.trim().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        form.session_id.trim().to_string()
    };

    let view = |message: Option<String>, result: Option<&GradingResult>| -> String {
        render_page(&PageView {
            session_id: session_id.clone(),
            needs_key: !state.grader.has_credential(),
            key_env: state.factory.credential_env(),
            prompt: &form.prompt,
            message,
            result,
        })
    };

    if form.prompt.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(view(Some("Please enter a prompt to grade.".to_string()), None)),
        )
            .into_response();
    }

    let grader = if form.api_key.trim().is_empty() {
        state.grader.clone()
    } else if !state.factory.check_key_format(&form.api_key) {
        return (
            StatusCode::BAD_REQUEST,
            Html(view(
                Some(format!(
                    "Please enter a valid {}.",
                    state.factory.credential_name()
                )),
                None,
            )),
        )
            .into_response();
    } else {
        match ApiCredential::non_blank(
            form.api_key.as_str(),
            CredentialSource::Form,
            state.factory.credential_name(),
        ) {
            Some(credential) => state.grader.with_credential(credential),
            None => state.grader.clone(),
        }
    };

    let Some(_guard) = InFlight::acquire(&state.in_flight, &session_id) else {
        return (
            StatusCode::CONFLICT,
            Html(view(
                Some("A grading for this page is already in progress.".to_string()),
                None,
            )),
        )
            .into_response();
    };

    match grader.grade_prompt(&form.prompt, &state.model).await {
        Ok(result) => {
            info!(session = %session_id, overall = result.overall_score.get(), "Form grading complete");
            state.record(&result);
            Html(view(None, Some(&result))).into_response()
        }
        Err(e) => {
            let message = match (&e, e.hint()) {
                (GradeError::Configuration(_), _) => format!(
                    "{}. Enter a key above or set {}.",
                    e,
                    state.factory.credential_env()
                ),
                (_, Some(hint)) => format!("{} ({})", e, hint),
                (_, None) => e.to_string(),
            };
            (status_for(&e), Html(view(Some(message), None))).into_response()
        }
    }
}

async fn grade_api(State(state): State<AppState>, Json(request): Json<ApiGradeRequest>) -> Response {
    if request.prompt.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError {
                error: "validation",
                message: "prompt must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    let model = request.model.as_deref().unwrap_or(&state.model);
    match state.grader.grade_prompt(&request.prompt, model).await {
        Ok(result) => {
            state.record(&result);
            Json(result).into_response()
        }
        Err(e) => (
            status_for(&e),
            Json(ApiError {
                error: error_kind(&e),
                message: e.to_string(),
            }),
        )
            .into_response(),
    }
}

fn status_for(error: &GradeError) -> StatusCode {
    match error {
        GradeError::Configuration(_) => StatusCode::BAD_REQUEST,
        GradeError::TemplateMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GradeError::ModelInvocation(_) | GradeError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_kind(error: &GradeError) -> &'static str {
    match error {
        GradeError::Configuration(_) => "configuration",
        GradeError::TemplateMissing(_) => "template_missing",
        GradeError::ModelInvocation(_) => "model_invocation",
        GradeError::MalformedResponse(_) => "malformed_response",
    }
}

// ============================================================================
// Rendering
// ============================================================================

struct PageView<'a> {
    session_id: String,
    needs_key: bool,
    key_env: &'static str,
    prompt: &'a str,
    message: Option<String>,
    result: Option<&'a GradingResult>,
}

/// Escape text for HTML element content and quoted attributes.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:860px;margin:2rem auto;padding:0 1rem;color:#1f2937}\
textarea{width:100%;font:inherit}\
.card{border:1px solid #e5e7eb;border-radius:8px;padding:1rem;margin:.5rem 0}\
.error{background:#fffbeb;border-color:#fcd34d}\
.scores{display:grid;grid-template-columns:repeat(5,1fr);gap:.5rem;text-align:center}\
.score{font-size:1.5rem;font-weight:600}\
.example{margin:0 .5rem .5rem 0;cursor:pointer}";

fn render_page(view: &PageView<'_>) -> String {
    let mut body = String::new();

    let _ = write!(body, "<h1>PromptOS Grading Engine</h1>");

    if let Some(message) = &view.message {
        let _ = write!(
            body,
            "<div class=\"card error\" role=\"alert\">{}</div>",
            escape_html(message)
        );
    }

    let _ = write!(
        body,
        "<form method=\"post\" action=\"/grade\">\
         <input type=\"hidden\" name=\"session_id\" value=\"{session}\">",
        session = escape_html(&view.session_id)
    );
    if view.needs_key {
        let _ = write!(
            body,
            "<p><label>API key (or set <code>{env}</code>)<br>\
             <input type=\"password\" name=\"api_key\" placeholder=\"sk-...\" autocomplete=\"off\"></label></p>",
            env = escape_html(view.key_env)
        );
    }
    let _ = write!(
        body,
        "<p><label>Prompt to grade<br>\
         <textarea id=\"prompt\" name=\"prompt\" rows=\"8\" placeholder=\"Enter your prompt here\">{prompt}</textarea></label></p>\
         <p><button type=\"submit\">Grade Prompt</button></p></form>",
        prompt = escape_html(view.prompt)
    );

    // Clicking an example copies it into the prompt box
    let _ = write!(body, "<p>Examples:</p><p>");
    for example in EXAMPLE_PROMPTS {
        let _ = write!(
            body,
            "<button type=\"button\" class=\"example\" data-prompt=\"{text}\" \
             onclick=\"document.getElementById('prompt').value=this.dataset.prompt\">{text}</button>",
            text = escape_html(example)
        );
    }
    let _ = write!(body, "</p>");

    if let Some(result) = view.result {
        render_result(&mut body, result);
    }

    format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>PromptOS</title><style>{}</style></head><body>{}</body></html>",
        PAGE_STYLE, body
    )
}

fn render_result(body: &mut String, result: &GradingResult) {
    let _ = write!(body, "<h2>Scores</h2><div class=\"scores\">");
    for (dimension, rubric) in result.scores.iter() {
        let _ = write!(
            body,
            "<div class=\"card\"><div>{}</div><div class=\"score\">{}/10</div></div>",
            dimension.label(),
            rubric.score
        );
    }
    let _ = write!(
        body,
        "<div class=\"card\"><div>Overall</div><div class=\"score\" id=\"overall\">{}/10</div></div></div>",
        result.overall_score
    );
    let _ = write!(body, "<p><small>Lower is better for each dimension; higher is better overall.</small></p>");

    let _ = write!(
        body,
        "<h2>Overall Assessment</h2><div class=\"card\">{}</div><h2>Detailed Analysis</h2>",
        escape_html(&result.overall_assessment)
    );
    for (dimension, rubric) in result.scores.iter() {
        let _ = write!(
            body,
            "<div class=\"card\"><strong>{} ({}): {}/10</strong><br>{}</div>",
            dimension.label(),
            dimension.worst_case(),
            rubric.score,
            escape_html(&rubric.explanation)
        );
    }

    let _ = write!(
        body,
        "<h2>Original Prompt</h2><pre class=\"card\">{}</pre>",
        escape_html(&result.original_prompt)
    );
}
