//! Shared data models for the notification subsystem.
//!
//! Field names follow the portal's REST wire format (snake_case), which is
//! what both the pull API and the push channel carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for notification listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 15;
/// Largest page size the pull API accepts.
pub const MAX_PAGE_LIMIT: u32 = 50;

// --- Identity ---

/// Portal role of an authenticated user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Plant user: submits practices and answers questions about them.
    Plant,
    /// Headquarters user: reviews, asks questions and benchmarks.
    Hq,
}

impl UserRole {
    /// Notification kinds a user with this role is shown.
    ///
    /// HQ users never see `question_asked` (they are the ones asking) and
    /// plant users never see `question_answered` (they are the ones answering).
    pub fn visible_kinds(&self) -> &'static [NotificationKind] {
        match self {
            UserRole::Hq => &[
                NotificationKind::QuestionAnswered,
                NotificationKind::PracticeBenchmarked,
            ],
            UserRole::Plant => &[
                NotificationKind::QuestionAsked,
                NotificationKind::PracticeBenchmarked,
            ],
        }
    }

    pub fn can_see(&self, kind: NotificationKind) -> bool {
        self.visible_kinds().contains(&kind)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plant" => Some(UserRole::Plant),
            "hq" => Some(UserRole::Hq),
            _ => None,
        }
    }
}

// --- Notifications ---

/// What happened that produced a notification.
///
/// Unrecognised kinds coming off the wire are kept as [`NotificationKind::Other`]
/// rather than failing the whole record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    QuestionAsked,
    QuestionAnswered,
    PracticeBenchmarked,
    Other,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::QuestionAsked => "question_asked",
            NotificationKind::QuestionAnswered => "question_answered",
            NotificationKind::PracticeBenchmarked => "practice_benchmarked",
            NotificationKind::Other => "other",
        }
    }
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "question_asked" => NotificationKind::QuestionAsked,
            "question_answered" => NotificationKind::QuestionAnswered,
            "practice_benchmarked" => NotificationKind::PracticeBenchmarked,
            _ => NotificationKind::Other,
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A single notification as listed by the pull API and pushed over the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub related_practice_id: Option<String>,
    #[serde(default)]
    pub related_question_id: Option<String>,
    /// Populated by the server from the related practice, when it still exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_title: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Pagination block of a notification listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(total: u64, limit: u32, offset: u64) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset.saturating_add(u64::from(limit)) < total,
        }
    }
}

/// One page of notifications, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPage {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Vec<NotificationRecord>,
    #[serde(default)]
    pub pagination: Pagination,
}

fn default_success() -> bool {
    true
}

impl NotificationPage {
    pub fn new(data: Vec<NotificationRecord>, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            pagination,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.data.iter().any(|n| n.id == id)
    }

    pub fn unread(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.data.iter().filter(|n| !n.is_read)
    }
}

/// Response of `GET /notifications/unread-count`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadCount {
    pub unread_count: u64,
}

/// Response of `PATCH /notifications/read-all`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkAllReadResponse {
    pub success: bool,
    pub message: String,
}

/// Query parameters of `GET /notifications`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl NotificationQuery {
    pub fn first_page(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Effective page size, clamped to what the pull API accepts.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn effective_offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    /// Render as URL query pairs, skipping unset parameters.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(is_read) = self.is_read {
            pairs.push(("is_read", is_read.to_string()));
        }
        pairs
    }
}

// --- Domain events ---

/// Events the portal's REST layer reports to the notification subsystem.
///
/// Each one fans out into zero or more notifications for the affected users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    QuestionAsked {
        practice_id: String,
        practice_title: String,
        practice_owner_id: String,
        question_id: String,
        asked_by_id: String,
        asked_by_name: String,
        question_text: String,
    },
    QuestionAnswered {
        practice_id: String,
        practice_title: String,
        question_id: String,
        asked_by_id: String,
        answered_by_id: String,
        answered_by_name: String,
        answer_text: String,
    },
    PracticeBenchmarked {
        practice_id: String,
        practice_title: String,
        practice_owner_id: String,
        benchmarked_by_id: String,
        benchmarked_by_name: String,
    },
}

/// Response of the domain-event intake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainEventAccepted {
    pub created: usize,
}
