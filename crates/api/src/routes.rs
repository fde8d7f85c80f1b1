//! HTTP route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use crewline_common::CrewError;
use crewline_crew::template::interpolate;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::AppState;

const INDEX_PAGE: &str = include_str!("../static/index.html");
const RESULT_PAGE: &str = include_str!("../static/result.html");
const ERROR_PAGE: &str = include_str!("../static/error.html");

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

#[derive(Debug, Deserialize)]
pub struct KickoffForm {
    #[serde(default)]
    pub topic: String,
}

/// Run the blog crew on the submitted topic and render its article.
pub async fn kickoff(
    State(state): State<Arc<AppState>>,
    Form(form): Form<KickoffForm>,
) -> Response {
    let topic = form.topic.trim();
    if topic.is_empty() {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Missing topic",
            "Please enter a topic to research.",
        );
    }

    info!(topic = %topic, "Kickoff requested");

    let result = match state.blog_crew() {
        Ok(crew) => crew.run(topic).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => {
            let page = render(RESULT_PAGE, &[("topic", topic), ("result", &output.raw)]);
            (StatusCode::OK, Html(page)).into_response()
        }
        Err(CrewError::InvalidInput(message)) => {
            error_page(StatusCode::BAD_REQUEST, "Invalid topic", &message)
        }
        Err(e) => {
            error!(error = %e, root_cause = ?e.root_cause(), topic = %topic, "Crew run failed");
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong",
                "The crew could not finish this topic. Please try again later.",
            )
        }
    }
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    let page = render(ERROR_PAGE, &[("title", title), ("message", message)]);
    (status, Html(page)).into_response()
}

/// Fill `{key}` slots in a static page with HTML-escaped values.
fn render(page: &str, values: &[(&str, &str)]) -> String {
    let escaped: HashMap<String, String> = values
        .iter()
        .map(|(k, v)| (k.to_string(), escape_html(v)))
        .collect();
    interpolate(page, &escaped)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
