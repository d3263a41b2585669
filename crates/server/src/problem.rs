//! Error responses rendered as RFC7807 problem documents.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bestflow_shared::ProblemDetails;

use crate::store::StoreError;

/// Handler error carrying a [`ProblemDetails`] body.
#[derive(Debug, Clone)]
pub struct ApiProblem(pub ProblemDetails);

impl ApiProblem {
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::unauthorized(detail))
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::bad_request(detail))
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::not_found(detail))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<StoreError> for ApiProblem {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiProblem::not_found("Notification not found"),
            StoreError::InvalidQuery(detail) => ApiProblem::bad_request(detail),
        }
    }
}

impl IntoResponse for ApiProblem {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(self.0),
        )
            .into_response()
    }
}
