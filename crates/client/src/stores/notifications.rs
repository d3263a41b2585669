//! Notification cache and its reconciliation rules.
//!
//! Two query cells hold the first page of notifications and the unread count.
//! Pushed events reach them through three rules:
//!
//! - insert: a new record is prepended to the cached page in place, and the
//!   unread count is invalidated;
//! - invalidate: read-state changes mark both entries stale;
//! - direct-set: a pushed count overwrites the cached count.
//!
//! Read flags only ever move from unread to read. Ids known to be read are
//! remembered and applied to every page that lands afterwards.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bestflow_shared::{
    ApiError, MarkAllReadResponse, NotificationPage, NotificationQuery, NotificationRecord,
    ReadReceipt,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::query::{QueryCell, QuerySnapshot};
use crate::api_client::NotificationApi;

pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    query: NotificationQuery,
    list: QueryCell<NotificationPage>,
    unread: QueryCell<u64>,
    read_ids: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("list", &self.list)
            .field("unread", &self.unread)
            .finish_non_exhaustive()
    }
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>, page_limit: u32) -> Self {
        Self {
            api,
            query: NotificationQuery::first_page(page_limit),
            list: QueryCell::new("notifications"),
            unread: QueryCell::new("unread_count"),
            read_ids: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The first page, refetched only when missing or stale.
    pub async fn notifications(&self) -> Result<NotificationPage, ApiError> {
        self.list
            .read(|| async {
                let mut page = self.api.list_notifications(self.query.clone()).await?;
                mask_read(&self.read_ids(), &mut page);
                Ok(page)
            })
            .await
    }

    /// The unread count, refetched only when missing or stale.
    pub async fn unread_count(&self) -> Result<u64, ApiError> {
        self.unread.read(|| self.api.unread_count()).await
    }

    pub fn list_snapshot(&self) -> QuerySnapshot<NotificationPage> {
        self.list.snapshot()
    }

    pub fn unread_snapshot(&self) -> QuerySnapshot<u64> {
        self.unread.snapshot()
    }

    pub fn watch_list(&self) -> watch::Receiver<QuerySnapshot<NotificationPage>> {
        self.list.watch()
    }

    pub fn watch_unread(&self) -> watch::Receiver<QuerySnapshot<u64>> {
        self.unread.watch()
    }

    /// Insert rule. Delivering the same record twice leaves it at the head
    /// exactly once.
    pub fn insert_notification(&self, mut record: NotificationRecord) {
        if self.read_ids().contains(&record.id) {
            record.is_read = true;
        }
        let id = record.id.clone();
        let prepended = self.list.patch(move |page| {
            let existed = page.contains(&record.id);
            page.data.retain(|n| n.id != record.id);
            page.data.insert(0, record.clone());
            if !existed {
                page.pagination.total = page.pagination.total.saturating_add(1);
            }
        });
        tracing::debug!(id = %id, prepended, "notification inserted");
        self.unread.invalidate();
    }

    /// Invalidate rule.
    pub fn invalidate_all(&self) {
        self.list.invalidate();
        self.unread.invalidate();
    }

    /// Direct-set rule.
    pub fn set_unread_count(&self, count: u64) {
        self.unread.set(count);
    }

    /// A read receipt from the channel. Known records flip to read locally,
    /// then both entries are invalidated, including for ids not in the page.
    pub fn apply_read(&self, receipt: &ReadReceipt) {
        match (&receipt.id, receipt.all) {
            (_, true) => self.flip_all_read(),
            (Some(id), false) => self.flip_read(id),
            (None, false) => {}
        }
        self.invalidate_all();
    }

    /// Mark one notification read through the pull API.
    pub async fn mark_read(&self, id: &str) -> Result<NotificationRecord, ApiError> {
        let record = self.api.mark_read(id).await?;
        self.flip_read(id);
        self.invalidate_all();
        Ok(record)
    }

    pub async fn mark_all_read(&self) -> Result<MarkAllReadResponse, ApiError> {
        let response = self.api.mark_all_read().await?;
        self.flip_all_read();
        self.invalidate_all();
        Ok(response)
    }

    /// Refetch whatever is not fresh, typically after a failure.
    pub async fn retry(&self) -> Result<(), ApiError> {
        let list = self.notifications().await;
        let count = self.unread_count().await;
        list?;
        count?;
        Ok(())
    }

    /// Refetch the stale entries on their own task. Failures are logged.
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if store.list_snapshot().is_stale() {
                if let Err(e) = store.notifications().await {
                    tracing::warn!(error = %e.message(), "notification refresh failed");
                }
            }
            if store.unread_snapshot().is_stale() {
                if let Err(e) = store.unread_count().await {
                    tracing::warn!(error = %e.message(), "unread count refresh failed");
                }
            }
        })
    }

    /// Drop all cached data, e.g. on logout.
    pub fn clear(&self) {
        self.read_ids().clear();
        self.list.clear();
        self.unread.clear();
    }

    fn read_ids(&self) -> MutexGuard<'_, HashSet<String>> {
        self.read_ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flip_read(&self, id: &str) {
        self.read_ids().insert(id.to_string());
        let id = id.to_string();
        self.list.patch(move |page| {
            for n in page.data.iter_mut().filter(|n| n.id == id) {
                n.is_read = true;
            }
        });
    }

    fn flip_all_read(&self) {
        if let Some(page) = self.list.peek() {
            self.read_ids().extend(page.data.iter().map(|n| n.id.clone()));
        }
        self.list.patch(|page| {
            for n in page.data.iter_mut() {
                n.is_read = true;
            }
        });
    }
}

fn mask_read(read_ids: &HashSet<String>, page: &mut NotificationPage) {
    for n in page.data.iter_mut().filter(|n| read_ids.contains(&n.id)) {
        n.is_read = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::QueryStatus;
    use async_trait::async_trait;
    use bestflow_shared::{NotificationKind, Pagination};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        list_calls: AtomicUsize,
        count_calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn list_notifications(&self, _query: NotificationQuery) -> Result<NotificationPage, ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(NotificationPage::new(vec![record("old", false)], Pagination::new(1, 15, 0)))
        }

        async fn unread_count(&self) -> Result<u64, ApiError> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }

        async fn mark_read(&self, id: &str) -> Result<NotificationRecord, ApiError> {
            Ok(record(id, true))
        }

        async fn mark_all_read(&self) -> Result<MarkAllReadResponse, ApiError> {
            Ok(MarkAllReadResponse {
                success: true,
                message: "Marked 1 notifications as read".to_string(),
            })
        }
    }

    fn record(id: &str, is_read: bool) -> NotificationRecord {
        NotificationRecord {
            id: id.to_string(),
            kind: NotificationKind::QuestionAsked,
            title: format!("title {id}"),
            message: "message".to_string(),
            user_id: None,
            related_practice_id: Some("p1".to_string()),
            related_question_id: None,
            practice_title: None,
            is_read,
            created_at: Utc::now(),
        }
    }

    fn store() -> (Arc<FakeApi>, NotificationStore) {
        let api = Arc::new(FakeApi::default());
        (api.clone(), NotificationStore::new(api, 15))
    }

    #[tokio::test]
    async fn duplicate_delivery_keeps_one_head_entry() {
        let (_, store) = store();
        store.notifications().await.unwrap();

        store.insert_notification(record("x", false));
        store.insert_notification(record("x", false));

        let page = store.list_snapshot().data.unwrap();
        let ids: Vec<_> = page.data.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "old"]);
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn insert_invalidates_count_but_not_list() {
        let (api, store) = store();
        store.notifications().await.unwrap();
        store.unread_count().await.unwrap();

        store.insert_notification(record("x", false));
        assert_eq!(store.list_snapshot().status, QueryStatus::Fresh);
        assert_eq!(store.unread_snapshot().status, QueryStatus::Stale);

        store.notifications().await.unwrap();
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pushed_count_needs_no_fetch() {
        let (api, store) = store();
        store.set_unread_count(7);
        assert_eq!(store.unread_count().await.unwrap(), 7);
        assert_eq!(api.count_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidations_coalesce_into_one_refetch() {
        let (api, store) = store();
        store.notifications().await.unwrap();
        for _ in 0..5 {
            store.apply_read(&ReadReceipt::one("nowhere"));
        }
        store.notifications().await.unwrap();
        store.notifications().await.unwrap();
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn read_flags_never_revert() {
        let (_, store) = store();
        store.notifications().await.unwrap();
        store.mark_read("old").await.unwrap();
        store.apply_read(&ReadReceipt::one("old"));

        // The fake server still reports "old" unread; the cache must not regress
        let page = store.notifications().await.unwrap();
        assert!(page.data.iter().all(|n| n.is_read));

        // A re-delivered push of the same record stays read too
        store.insert_notification(record("old", false));
        assert!(store.list_snapshot().data.unwrap().data[0].is_read);
    }

    #[tokio::test]
    async fn clear_forgets_everything() {
        let (_, store) = store();
        store.notifications().await.unwrap();
        store.set_unread_count(3);
        store.clear();
        assert_eq!(store.list_snapshot().data, None);
        assert_eq!(store.unread_snapshot().status, QueryStatus::Idle);
    }
}
