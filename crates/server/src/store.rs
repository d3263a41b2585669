//! In-memory notification persistence.

use std::sync::{PoisonError, RwLock};

use bestflow_shared::{NotificationQuery, NotificationRecord, UserRole, MAX_PAGE_LIMIT};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("notification not found")]
    NotFound,
    #[error("{0}")]
    InvalidQuery(String),
}

/// Notifications of all users, in insertion order.
#[derive(Debug, Default)]
pub struct NotificationStore {
    records: RwLock<Vec<NotificationRecord>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: NotificationRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// One page of a user's notifications visible to `role`, newest first.
    /// Returns the page and the total number of matches.
    pub fn list(
        &self,
        user_id: &str,
        role: UserRole,
        query: &NotificationQuery,
    ) -> Result<(Vec<NotificationRecord>, u64), StoreError> {
        if let Some(limit) = query.limit {
            if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
                return Err(StoreError::InvalidQuery(format!(
                    "limit must be between 1 and {MAX_PAGE_LIMIT}"
                )));
            }
        }
        let limit = query.effective_limit() as usize;
        let offset = usize::try_from(query.effective_offset()).unwrap_or(usize::MAX);

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<&NotificationRecord> = records
            .iter()
            .filter(|n| visible_to(n, user_id, role))
            .filter(|n| query.is_read.map_or(true, |is_read| n.is_read == is_read))
            .collect();
        // Ties keep insertion order, so after the reverse the latest insert leads
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.reverse();

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    pub fn unread_count(&self, user_id: &str, role: UserRole) -> u64 {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| !n.is_read && visible_to(n, user_id, role))
            .count() as u64
    }

    /// Mark one of the user's notifications read. Idempotent.
    pub fn mark_read(&self, user_id: &str, id: &str) -> Result<NotificationRecord, StoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .iter_mut()
            .find(|n| n.id == id && n.user_id.as_deref() == Some(user_id))
            .ok_or(StoreError::NotFound)?;
        record.is_read = true;
        Ok(record.clone())
    }

    /// Mark all of the user's notifications read. Returns how many changed.
    pub fn mark_all_read(&self, user_id: &str) -> usize {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = 0;
        for record in records
            .iter_mut()
            .filter(|n| !n.is_read && n.user_id.as_deref() == Some(user_id))
        {
            record.is_read = true;
            updated += 1;
        }
        updated
    }
}

fn visible_to(record: &NotificationRecord, user_id: &str, role: UserRole) -> bool {
    record.user_id.as_deref() == Some(user_id) && role.can_see(record.kind)
}
