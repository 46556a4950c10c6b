//! Request correlation ids and Prometheus HTTP metrics

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::observability::{HTTP_IN_FLIGHT, HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL};

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

fn valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Keeps a well-formed client `x-request-id` or assigns a UUID, runs the
/// request inside a `request` span and echoes the id back.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| valid_request_id(s))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = HeaderValue::from_str(&id).ok();
    if let Some(val) = &header {
        req.headers_mut().insert(REQUEST_ID_HEADER, val.clone());
    }

    let span = tracing::info_span!("request", request_id = %id, method = %req.method(), path = %req.uri().path());
    let mut response = next.run(req).instrument(span).await;

    if let Some(val) = header {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    response
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Requests, duration and in-flight gauges by method and matched route
pub async fn http_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    // scrapes and long-lived sockets would skew the histograms
    if route == "/metrics" || route.starts_with("/v1/ws/") {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let in_flight = HTTP_IN_FLIGHT.with_label_values(&[method.as_str(), route.as_str()]);
    in_flight.inc();
    let start = Instant::now();

    let response = next.run(req).await;

    in_flight.dec();
    let class = status_class(response.status().as_u16());
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), route.as_str(), class])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), route.as_str(), class])
        .observe(start.elapsed().as_secs_f64());

    response
}
