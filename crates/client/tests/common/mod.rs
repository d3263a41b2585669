#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bestflow_client::ws::{ChannelEndpoint, Connector, TransportError, TransportLink, TransportMessage};
use bestflow_client::NotificationApi;
use bestflow_shared::{
    ApiError, MarkAllReadResponse, NotificationKind, NotificationPage, NotificationQuery,
    NotificationRecord, Pagination,
};
use chrono::Utc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

pub const PUSH_BASE: &str = "ws://push.test/api/v1/ws/notifications";

pub fn endpoint(token: &str) -> Option<ChannelEndpoint> {
    let base = url::Url::parse(PUSH_BASE).unwrap();
    Some(ChannelEndpoint::derive(&base, token))
}

/// How the mock connector answers one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Accept,
    Refuse,
    /// Never completes; only the connect timeout ends it
    Hang,
}

/// The server half of an accepted mock connection.
pub struct ServerSide {
    pub to_client: UnboundedSender<TransportMessage>,
    pub from_client: UnboundedReceiver<String>,
}

impl ServerSide {
    pub fn push(&self, frame: &str) {
        self.to_client
            .send(TransportMessage::Text(frame.to_string()))
            .unwrap();
    }

    pub fn close(&self) {
        let _ = self.to_client.send(TransportMessage::Closed {
            code: Some(1000),
            reason: "server closed".to_string(),
        });
    }

    /// Everything the client sent so far.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            out.push(frame);
        }
        out
    }
}

pub struct MockConnector {
    script: Mutex<VecDeque<Behaviour>>,
    fallback: Behaviour,
    attempts: Mutex<Vec<(Instant, String)>>,
    accepted: UnboundedSender<ServerSide>,
}

impl MockConnector {
    pub fn new(fallback: Behaviour) -> (Arc<Self>, UnboundedReceiver<ServerSide>) {
        let (accepted, rx) = unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            attempts: Mutex::new(Vec::new()),
            accepted,
        });
        (connector, rx)
    }

    /// Queue behaviours for the next attempts, before the fallback applies.
    pub fn script(&self, behaviours: impl IntoIterator<Item = Behaviour>) {
        self.script.lock().unwrap().extend(behaviours);
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn last_url(&self) -> Option<String> {
        self.attempts.lock().unwrap().last().map(|(_, url)| url.clone())
    }

    /// Gaps between consecutive attempts, in whole seconds.
    pub fn gaps_secs(&self) -> Vec<u64> {
        self.attempt_times()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError> {
        self.attempts
            .lock()
            .unwrap()
            .push((Instant::now(), url.to_string()));
        let behaviour = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match behaviour {
            Behaviour::Accept => {
                let (out_tx, out_rx) = unbounded_channel();
                let (in_tx, in_rx) = unbounded_channel();
                let _ = self.accepted.send(ServerSide {
                    to_client: in_tx,
                    from_client: out_rx,
                });
                Ok(TransportLink::new(out_tx, in_rx))
            }
            Behaviour::Refuse => Err(TransportError::Connect("connection refused".to_string())),
            Behaviour::Hang => std::future::pending::<Result<TransportLink, TransportError>>().await,
        }
    }
}

/// Pull API double serving a fixed page and count, counting calls.
pub struct MockApi {
    pub page: Mutex<Vec<NotificationRecord>>,
    pub count: Mutex<u64>,
    pub list_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub fail: Mutex<bool>,
}

impl MockApi {
    pub fn new(page: Vec<NotificationRecord>, count: u64) -> Arc<Self> {
        Arc::new(Self {
            page: Mutex::new(page),
            count: Mutex::new(count),
            list_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            fail: Mutex::new(false),
        })
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }

    fn check(&self) -> Result<(), ApiError> {
        if *self.fail.lock().unwrap() {
            Err(ApiError::Http {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationApi for MockApi {
    async fn list_notifications(&self, query: NotificationQuery) -> Result<NotificationPage, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let data = self.page.lock().unwrap().clone();
        let total = data.len() as u64;
        Ok(NotificationPage::new(
            data,
            Pagination::new(total, query.effective_limit(), query.effective_offset()),
        ))
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(*self.count.lock().unwrap())
    }

    async fn mark_read(&self, id: &str) -> Result<NotificationRecord, ApiError> {
        self.check()?;
        let mut page = self.page.lock().unwrap();
        let record = page
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| ApiError::Http {
                status: 404,
                body: "not found".to_string(),
            })?;
        record.is_read = true;
        Ok(record.clone())
    }

    async fn mark_all_read(&self) -> Result<MarkAllReadResponse, ApiError> {
        self.check()?;
        let mut page = self.page.lock().unwrap();
        let mut marked = 0;
        for n in page.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            marked += 1;
        }
        *self.count.lock().unwrap() = 0;
        Ok(MarkAllReadResponse {
            success: true,
            message: format!("Marked {marked} notifications as read"),
        })
    }
}

pub fn record(id: &str) -> NotificationRecord {
    NotificationRecord {
        id: id.to_string(),
        kind: NotificationKind::QuestionAnswered,
        title: "Your Question Was Answered".to_string(),
        message: format!("answer {id}"),
        user_id: None,
        related_practice_id: Some("practice-1".to_string()),
        related_question_id: Some("question-1".to_string()),
        practice_title: None,
        is_read: false,
        created_at: Utc::now(),
    }
}

pub fn notification_frame(id: &str) -> String {
    serde_json::json!({
        "type": "notification",
        "data": record(id),
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

/// Let spawned tasks run without advancing virtual time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance virtual time by `duration`, then let tasks catch up.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}
