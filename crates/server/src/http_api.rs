use crate::context::ServiceContext;
use axum::{
    body::{Body, Bytes},
    http::{Response as HttpResponse, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use intent_feedback::{round_confidence, TrainingSample};
use intent_protocol::{
    ClassifyRequest, ClassifyResponse, ErrorBody, HealthResponse, LogRequest, LogResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Route table for the classification service. Every response is JSON and
/// carries a permissive CORS header; wrong methods on known paths fall
/// through to the same not-found response as unknown paths.
pub fn build_router(context: Arc<ServiceContext>) -> Router {
    Router::new()
        .route(
            "/classify",
            post({
                let context = context.clone();
                move |body| classify(body, context.clone())
            })
            .fallback(not_found),
        )
        .route(
            "/log",
            post({
                let context = context.clone();
                move |body| log_sample(body, context.clone())
            })
            .fallback(not_found),
        )
        .route(
            "/health",
            get({
                let context = context.clone();
                move || health(context.clone())
            })
            .fallback(not_found),
        )
        .route(
            "/stats",
            get({
                let context = context.clone();
                move || stats(context.clone())
            })
            .fallback(not_found),
        )
        .fallback(not_found)
}

async fn classify(body: Bytes, context: Arc<ServiceContext>) -> Response {
    let request: ClassifyRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    if request.transcript.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            &ErrorBody::new("Missing transcript"),
        );
    }

    match context.engine.classify(&request.transcript).await {
        Ok(result) => json_response(
            StatusCode::OK,
            &ClassifyResponse {
                intent: result.label,
                confidence: round_confidence(f64::from(result.confidence)),
            },
        ),
        Err(err) => {
            log::error!("Classification failed: {err}");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorBody::new(format!("{err}")),
            )
        }
    }
}

async fn log_sample(body: Bytes, context: Arc<ServiceContext>) -> Response {
    let request: LogRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let sample = TrainingSample::new(
        request.transcript,
        request.user_label,
        request.predicted,
        request.confidence,
        request.was_overridden,
    );

    match context.feedback.append(&sample) {
        Ok(()) => json_response(StatusCode::OK, &LogResponse { logged: true }),
        Err(err) => {
            log::error!("Feedback append failed: {err}");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorBody::new(format!("{err}")),
            )
        }
    }
}

async fn health(context: Arc<ServiceContext>) -> Response {
    json_response(StatusCode::OK, &HealthResponse::ok(&context.model_id))
}

async fn stats(context: Arc<ServiceContext>) -> Response {
    match context.feedback.stats() {
        Ok(stats) => json_response(StatusCode::OK, &stats),
        Err(err) => {
            log::error!("Stats computation failed: {err}");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorBody::new(format!("{err}")),
            )
        }
    }
}

async fn not_found() -> Response {
    json_response(StatusCode::NOT_FOUND, &ErrorBody::new("Not found"))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| {
        json_response(
            StatusCode::BAD_REQUEST,
            &ErrorBody::new(format!("Invalid request body: {err}")),
        )
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    HttpResponse::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("access-control-allow-origin", "*")
        .body(Body::from(bytes))
        .expect("valid HTTP response")
}
