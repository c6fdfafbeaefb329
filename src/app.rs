use axum::{
    Form, Router,
    extract::{FromRef, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use handlebars::Handlebars;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::answer::{Answer, AnswerService};
use crate::config::{Secrets, ServerConfig};
use crate::csrf;
use crate::dataset::Dataset;
use crate::logging;
use crate::stats::{self, DashboardStats};

const INDEX_TEMPLATE: &str = "index";

/// Everything a request needs, built once at startup and never mutated
pub struct AppContext {
    dataset: Dataset,
    answers: AnswerService,
    templates: Handlebars<'static>,
}

/// Router state: the shared context plus the cookie signing key
#[derive(Clone)]
pub struct AppState {
    ctx: Arc<AppContext>,
    key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.key.clone()
    }
}

impl AppState {
    /// Build the state from a loaded dataset and answer service
    ///
    /// # Errors
    /// * Returns an error if the page template does not compile
    pub fn new(
        dataset: Dataset,
        answers: AnswerService,
        cookie_secret: &str,
    ) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string(INDEX_TEMPLATE, include_str!("./static/index.hbs"))?;

        Ok(AppState {
            ctx: Arc::new(AppContext {
                dataset,
                answers,
                templates,
            }),
            key: csrf::signing_key(cookie_secret),
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.ctx.dataset
    }

    fn render(&self, page: &Page) -> Result<Html<String>, StatusCode> {
        self.ctx
            .templates
            .render(INDEX_TEMPLATE, page)
            .map(Html)
            .map_err(|e| {
                error!("Failed to render page: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            })
    }
}

/// Form posted by the page
#[derive(Debug, Default, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// Values handed to the template
#[derive(Serialize)]
struct Page<'a> {
    csrf_token: &'a str,
    question: &'a str,
    answer: Option<&'a str>,
    notice: Option<&'a str>,
    stats: Option<DashboardStats>,
    stats_error: Option<String>,
    full_data: &'a str,
    generated_at: String,
}

impl<'a> Page<'a> {
    fn new(state: &'a AppState, csrf_token: &'a str) -> Self {
        let (stats, stats_error) = match stats::summarize(state.dataset()) {
            Ok(stats) => (Some(stats), None),
            Err(e) => {
                warn!("Dashboard statistics unavailable: {e}");
                (None, Some(e.to_string()))
            }
        };

        Page {
            csrf_token,
            question: "",
            answer: None,
            notice: None,
            stats,
            stats_error,
            full_data: state.dataset().as_csv(),
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index).post(handle_question))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load everything and serve until the process is stopped
pub async fn run(config: ServerConfig, secrets: Secrets) -> anyhow::Result<()> {
    use anyhow::Context;

    let data_path = &config.service.data;
    let dataset = Dataset::from_path(data_path)
        .with_context(|| format!("failed to load dataset from {}", data_path.display()))?;
    logging::log_dataset_info(data_path, &dataset);

    if secrets.insecure_cookie_secret {
        logging::log_insecure_secret();
    }

    let answers = config.service.answer_service(&secrets.api_key)?;
    logging::log_service_info(answers.model(), answers.policy());

    let state = AppState::new(dataset, answers, &secrets.cookie_secret)
        .context("failed to compile page template")?;

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    logging::log_listening(config.bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn serve_index(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let (jar, token) = csrf::ensure_token(jar);
    let page = Page::new(&state, &token);

    match state.render(&page) {
        Ok(html) => (jar, html).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn handle_question(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<AskForm>,
) -> Response {
    if !csrf::verify(&jar, form.csrf_token.as_deref()) {
        warn!("Rejected form post with a missing or invalid CSRF token");
        let (jar, token) = csrf::ensure_token(jar);
        let page = Page {
            question: &form.question,
            notice: Some(csrf::INVALID_TOKEN),
            ..Page::new(&state, &token)
        };
        return match state.render(&page) {
            Ok(html) => (StatusCode::BAD_REQUEST, jar, html).into_response(),
            Err(status) => status.into_response(),
        };
    }

    let (jar, token) = csrf::ensure_token(jar);
    let answer = state
        .ctx
        .answers
        .ask(&form.question, state.dataset().as_csv())
        .await;

    let (text, notice) = match &answer {
        Answer::Text(text) => (Some(text.as_str()), None),
        Answer::Rejected(msg) | Answer::Degraded(msg) => (None, Some(msg.as_str())),
    };
    let page = Page {
        question: &form.question,
        answer: text,
        notice,
        ..Page::new(&state, &token)
    };

    match state.render(&page) {
        Ok(html) => (jar, html).into_response(),
        Err(status) => status.into_response(),
    }
}
