//! Middleware selectable from `httpserver.middleware`.

use axum::extract::{Request, State};
use axum::http::HeaderName;
use axum::middleware::{self as axum_middleware, Next};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::components::logger::LogWriter;
use crate::config::Middleware;

/// State of the access-log middleware.
#[derive(Clone, Debug)]
pub struct AccessLog {
    writer: LogWriter,
    request_id: HeaderName,
}

impl AccessLog {
    pub fn new(writer: LogWriter, request_id: HeaderName) -> Self {
        Self { writer, request_id }
    }
}

#[derive(Serialize)]
struct AccessRecord<'a> {
    time: String,
    method: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    status: u16,
    latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
}

/// Writes one JSON line per request to the access-log writer.
pub async fn access_log(State(log): State<AccessLog>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = header_str(request.headers(), &log.request_id);
    let user_agent = header_str(request.headers(), &axum::http::header::USER_AGENT);

    let response = next.run(request).await;

    let request_id = request_id.or_else(|| header_str(response.headers(), &log.request_id));
    let record = AccessRecord {
        time: Utc::now().to_rfc3339(),
        method: method.as_str(),
        path: uri.path(),
        query: uri.query(),
        status: response.status().as_u16(),
        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        request_id: request_id.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    match serde_json::to_vec(&record) {
        Ok(mut line) => {
            line.push(b'\n');
            let mut writer = log.writer.clone();
            if let Err(e) = writer.write_all(&line) {
                tracing::warn!(error = %e, "failed to write access log");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode access log"),
    }

    response
}

fn header_str(headers: &axum::http::HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Wraps `router` with the listed middleware; the first entry is outermost.
pub fn apply(
    router: Router,
    middlewares: &[Middleware],
    request_id: &HeaderName,
    access: Option<&LogWriter>,
) -> Router {
    middlewares.iter().rev().fold(router, |router, mw| match mw {
        Middleware::Cors => router.layer(CorsLayer::permissive()),
        Middleware::RequestId => router
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid)),
        Middleware::AccessLog => match access {
            Some(writer) => router.layer(axum_middleware::from_fn_with_state(
                AccessLog::new(writer.clone(), request_id.clone()),
                access_log,
            )),
            None => router,
        },
    })
}
