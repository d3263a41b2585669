//! Notification creation and the pushes that follow state changes.

use bestflow_shared::{
    DomainEvent, NotificationKind, NotificationRecord, ReadReceipt, ServerEvent,
    UnreadCountPayload, UserRole,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::Session;
use crate::state::AppState;
use crate::store::StoreError;

/// Longest quoted excerpt in a notification message.
const EXCERPT_CHARS: usize = 100;

/// Draft of a notification before it is stored.
struct Draft {
    recipient: String,
    kind: NotificationKind,
    title: String,
    message: String,
    practice_id: String,
    practice_title: String,
    question_id: Option<String>,
}

/// Turn a domain event into notifications, store and push them.
/// Returns the created records. The acting user is never notified.
pub async fn handle_event(state: &AppState, event: DomainEvent) -> Vec<NotificationRecord> {
    let Some(draft) = draft_for(event) else {
        return Vec::new();
    };
    vec![create(state, draft).await]
}

fn draft_for(event: DomainEvent) -> Option<Draft> {
    match event {
        DomainEvent::QuestionAsked {
            practice_id,
            practice_title,
            practice_owner_id,
            question_id,
            asked_by_id,
            asked_by_name,
            question_text,
        } => (practice_owner_id != asked_by_id).then(|| Draft {
            recipient: practice_owner_id,
            kind: NotificationKind::QuestionAsked,
            title: format!("New Question on \"{practice_title}\""),
            message: format!("{asked_by_name} asked: \"{}\"", excerpt(&question_text)),
            practice_id,
            practice_title,
            question_id: Some(question_id),
        }),
        DomainEvent::QuestionAnswered {
            practice_id,
            practice_title,
            question_id,
            asked_by_id,
            answered_by_id,
            answered_by_name,
            answer_text,
        } => (asked_by_id != answered_by_id).then(|| Draft {
            recipient: asked_by_id,
            kind: NotificationKind::QuestionAnswered,
            title: "Your Question Was Answered".to_string(),
            message: format!(
                "{answered_by_name} answered your question on \"{practice_title}\": \"{}\"",
                excerpt(&answer_text)
            ),
            practice_id,
            practice_title,
            question_id: Some(question_id),
        }),
        DomainEvent::PracticeBenchmarked {
            practice_id,
            practice_title,
            practice_owner_id,
            benchmarked_by_id,
            benchmarked_by_name,
        } => (practice_owner_id != benchmarked_by_id).then(|| Draft {
            recipient: practice_owner_id,
            kind: NotificationKind::PracticeBenchmarked,
            title: "Practice Benchmarked".to_string(),
            message: format!("{benchmarked_by_name} benchmarked your practice \"{practice_title}\""),
            practice_id,
            practice_title,
            question_id: None,
        }),
    }
}

async fn create(state: &AppState, draft: Draft) -> NotificationRecord {
    let record = NotificationRecord {
        id: Uuid::new_v4().to_string(),
        kind: draft.kind,
        title: draft.title,
        message: draft.message,
        user_id: Some(draft.recipient.clone()),
        related_practice_id: Some(draft.practice_id),
        related_question_id: draft.question_id,
        practice_title: Some(draft.practice_title),
        is_read: false,
        created_at: Utc::now(),
    };
    state.store.insert(record.clone());
    tracing::info!(
        user_id = %draft.recipient,
        id = %record.id,
        kind = record.kind.as_str(),
        "notification created"
    );

    // A role that never lists this kind should not be shown it live either
    let visible = state
        .sessions
        .role_of(&draft.recipient)
        .map_or(true, |role| role.can_see(record.kind));
    if visible {
        let delivered = state
            .hub
            .send_to_user(&draft.recipient, ServerEvent::Notification(record.clone()))
            .await;
        tracing::debug!(user_id = %draft.recipient, delivered, "notification pushed");
    }
    record
}

/// Mark one notification read and tell the user's other connections.
pub async fn mark_read(
    state: &AppState,
    session: &Session,
    id: &str,
) -> Result<NotificationRecord, StoreError> {
    let record = state.store.mark_read(&session.user_id, id)?;
    push_read_state(state, session, ReadReceipt::one(id)).await;
    Ok(record)
}

/// Mark everything read. Returns how many notifications changed.
pub async fn mark_all_read(state: &AppState, session: &Session) -> usize {
    let updated = state.store.mark_all_read(&session.user_id);
    push_read_state(state, session, ReadReceipt::all()).await;
    updated
}

pub fn unread_count(state: &AppState, user_id: &str, role: UserRole) -> u64 {
    state.store.unread_count(user_id, role)
}

async fn push_read_state(state: &AppState, session: &Session, receipt: ReadReceipt) {
    let count = unread_count(state, &session.user_id, session.role);
    state
        .hub
        .send_to_user(&session.user_id, ServerEvent::NotificationRead(receipt))
        .await;
    state
        .hub
        .send_to_user(
            &session.user_id,
            ServerEvent::UnreadCount(UnreadCountPayload { count }),
        )
        .await;
}

/// Quote at most [`EXCERPT_CHARS`] characters, marking the cut with `...`.
fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
