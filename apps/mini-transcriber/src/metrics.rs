use axum::{
	body::Body,
	extract::MatchedPath,
	http::{header::CONTENT_TYPE, Request, Response, StatusCode},
	middleware::Next,
	response::IntoResponse,
};
use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder};
use std::time::Instant;

lazy_static! {
	static ref HTTP_REQUESTS_TOTAL: IntCounterVec =
		register_int_counter_vec!("http_requests_total", "Total number of HTTP requests", &["method", "route", "status"]).expect("Failed to register HTTP_REQUESTS_TOTAL");
	static ref HTTP_REQUEST_DURATION: HistogramVec =
		register_histogram_vec!("http_request_duration_seconds", "HTTP request duration in seconds", &["method", "route"]).expect("Failed to register HTTP_REQUEST_DURATION");
}

/// Middleware for Prometheus metrics collection
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response<Body> {
	let method = req.method().to_string();
	// label by route template so job ids do not explode cardinality
	let route = req
		.extensions()
		.get::<MatchedPath>()
		.map_or_else(|| "unmatched".to_string(), |path| path.as_str().to_string());

	let start = Instant::now();
	let response = next.run(req).await;
	let duration = start.elapsed().as_secs_f64();

	let status = response.status().as_u16().to_string();

	HTTP_REQUESTS_TOTAL.with_label_values(&[&method, &route, &status]).inc();
	HTTP_REQUEST_DURATION.with_label_values(&[&method, &route]).observe(duration);

	response
}

/// Prometheus text exposition of the default registry
pub async fn metrics_handler() -> impl IntoResponse {
	let encoder = TextEncoder::new();
	let metric_families = prometheus::gather();
	let mut buffer = Vec::new();

	if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
		tracing::error!("Failed to gather metrics: {}", e);
		return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics").into_response();
	}

	(StatusCode::OK, [(CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}
