use axum::{
	Json, Router,
	body::Body,
	extract::State,
	http::{HeaderMap, Request, StatusCode},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use dynq_domain::QueryRequest;
use dynq_service::QueryOutcome;

use crate::state::AppState;

pub const HEADER_API_KEY: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
	#[serde(default)]
	pub tag: Option<String>,
	#[serde(default)]
	pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
	pub invalidated: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/v1/content/query", post(query))
		.route_layer(middleware::from_fn_with_state(state.clone(), api_key_middleware))
		.route("/health", get(health))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/cache/invalidate", post(invalidate_cache))
		.route_layer(middleware::from_fn_with_state(state.clone(), api_key_middleware))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn query(
	State(state): State<AppState>,
	Json(payload): Json<QueryRequest>,
) -> Json<QueryOutcome> {
	let cancel = CancellationToken::new();
	// Cancels the engine call when the client goes away and this future is dropped.
	let _cancel_on_drop = cancel.clone().drop_guard();
	let outcome = state.service.query_dynamic_content_with(payload, cancel).await;

	Json(outcome)
}

async fn invalidate_cache(
	State(state): State<AppState>,
	Json(payload): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, ApiError> {
	let tag = payload.tag.as_deref().map(str::trim).filter(|tag| !tag.is_empty());
	let invalidated = match (tag, payload.all) {
		(None, true) => state.service.invalidate_cache_all().await,
		(Some(tag), false) => state.service.invalidate_cache_tag(tag).await,
		(Some(_), true) =>
			return Err(ApiError::new(
				StatusCode::BAD_REQUEST,
				"INVALID_REQUEST",
				"Specify either tag or all, not both.",
				Some(vec!["$.tag".to_string(), "$.all".to_string()]),
			)),
		(None, false) =>
			return Err(ApiError::new(
				StatusCode::BAD_REQUEST,
				"INVALID_REQUEST",
				"A non-empty tag or all=true is required.",
				Some(vec!["$.tag".to_string()]),
			)),
	};

	Ok(Json(InvalidateResponse { invalidated }))
}

async fn api_key_middleware(
	State(state): State<AppState>,
	req: Request<Body>,
	next: Next,
) -> Response {
	if let Some(expected) = state.api_key.as_deref()
		&& !is_authorized(req.headers(), expected)
	{
		tracing::warn!(path = %req.uri().path(), "Request rejected; API key missing or invalid.");

		return ApiError::new(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid X-API-Key header is required.",
			None,
		)
		.into_response();
	}

	next.run(req).await
}

fn is_authorized(headers: &HeaderMap, expected: &str) -> bool {
	headers
		.get(HEADER_API_KEY)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.is_some_and(|key| key == expected)
}

#[cfg(test)]
mod tests {
	use axum::http::HeaderMap;

	use crate::routes::{HEADER_API_KEY, is_authorized};

	#[test]
	fn api_key_must_match_exactly() {
		let mut headers = HeaderMap::new();

		assert!(!is_authorized(&headers, "secret"));

		headers.insert(HEADER_API_KEY, "secret".parse().expect("valid header"));

		assert!(is_authorized(&headers, "secret"));
		assert!(!is_authorized(&headers, "Secret"));
	}
}
