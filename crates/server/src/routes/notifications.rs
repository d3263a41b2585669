//! Notification pull API and the domain-event intake.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bestflow_shared::{
    DomainEvent, DomainEventAccepted, MarkAllReadResponse, NotificationPage, NotificationQuery,
    NotificationRecord, Pagination, UnreadCount,
};

use crate::auth::AuthUser;
use crate::problem::ApiProblem;
use crate::service;
use crate::state::AppState;

/// List the caller's notifications, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationPage>, ApiProblem> {
    let (data, total) = state.store.list(&session.user_id, session.role, &query)?;
    let pagination = Pagination::new(total, query.effective_limit(), query.effective_offset());
    Ok(Json(NotificationPage::new(data, pagination)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Json<UnreadCount> {
    Json(UnreadCount {
        unread_count: service::unread_count(&state, &session.user_id, session.role),
    })
}

/// Mark a single notification read
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<NotificationRecord>, ApiProblem> {
    let record = service::mark_read(&state, &session, &id).await?;
    Ok(Json(record))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Json<MarkAllReadResponse> {
    let updated = service::mark_all_read(&state, &session).await;
    tracing::debug!(user_id = %session.user_id, updated, "marked all notifications read");
    Json(MarkAllReadResponse {
        success: true,
        message: "All notifications marked as read".to_string(),
    })
}

/// Accept a domain event from the portal and fan it out as notifications
pub async fn ingest_event(
    State(state): State<AppState>,
    AuthUser(_session): AuthUser,
    Json(event): Json<DomainEvent>,
) -> (StatusCode, Json<DomainEventAccepted>) {
    let created = service::handle_event(&state, event).await;
    (
        StatusCode::CREATED,
        Json(DomainEventAccepted {
            created: created.len(),
        }),
    )
}
