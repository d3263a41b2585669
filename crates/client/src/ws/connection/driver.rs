//! The connection driver.
//!
//! Every state transition happens under one lock and is tagged with an
//! epoch. Spawned tasks (open, connect guard, reconnect timer, reader) carry
//! the epoch they were started in and are ignored once it moves on, so a
//! cancelled attempt can never flip the state after `disconnect()` returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bestflow_shared::{ClientFrame, RawFrame, FRAME_PING};
use tokio::sync::{broadcast, mpsc::UnboundedSender, watch};
use tokio::task::JoinHandle;

use super::{ChannelEndpoint, ConnectionState};
use crate::ws::backoff::ReconnectBudget;
use crate::ws::transport::{Connector, TransportError, TransportLink, TransportMessage};

/// Driver tuning.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How long an attempt may stay in `Connecting`
    pub connect_timeout: Duration,
    pub reconnect: ReconnectBudget,
    /// Buffered raw frames per subscriber before it starts lagging
    pub inbound_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            reconnect: ReconnectBudget::default(),
            inbound_capacity: 256,
        }
    }
}

#[derive(Default)]
struct DriverTasks {
    open: Option<JoinHandle<()>>,
    connect_guard: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl DriverTasks {
    fn abort_all(&mut self) {
        for handle in [
            self.open.take(),
            self.connect_guard.take(),
            self.reconnect_timer.take(),
            self.reader.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

struct DriverInner {
    endpoint: Option<ChannelEndpoint>,
    budget: ReconnectBudget,
    auto_reconnect: bool,
    epoch: u64,
    outbound: Option<UnboundedSender<String>>,
    tasks: DriverTasks,
}

struct Shared {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: broadcast::Sender<String>,
    inner: Mutex<DriverInner>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.tasks.abort_all();
    }
}

/// Owns one push channel socket and keeps it alive.
///
/// Cloning yields another handle to the same driver. All methods return
/// immediately; progress is observed through [`ConnectionDriver::watch_state`]
/// and [`ConnectionDriver::subscribe`].
#[derive(Clone)]
pub struct ConnectionDriver {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ConnectionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDriver")
            .field("state", &self.state())
            .field("attempt", &self.attempt())
            .finish_non_exhaustive()
    }
}

impl ConnectionDriver {
    pub fn new(connector: Arc<dyn Connector>, config: DriverConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (inbound_tx, _) = broadcast::channel(config.inbound_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                connector,
                connect_timeout: config.connect_timeout,
                state_tx,
                inbound_tx,
                inner: Mutex::new(DriverInner {
                    endpoint: None,
                    budget: config.reconnect,
                    auto_reconnect: true,
                    epoch: 0,
                    outbound: None,
                    tasks: DriverTasks::default(),
                }),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Raw inbound text frames, in delivery order.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.shared.inbound_tx.subscribe()
    }

    /// Retries scheduled since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.shared.lock().budget.attempt()
    }

    pub fn endpoint(&self) -> Option<ChannelEndpoint> {
        self.shared.lock().endpoint.clone()
    }

    /// Connect-timeout guards and reconnect timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        let inner = self.shared.lock();
        [&inner.tasks.connect_guard, &inner.tasks.reconnect_timer]
            .into_iter()
            .flatten()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Open the channel to `endpoint`.
    ///
    /// `None` is ignored, as is the endpoint already connected or being
    /// connected to. Any other call replaces the current socket and turns
    /// auto-reconnect back on.
    pub fn connect(&self, endpoint: Option<ChannelEndpoint>) {
        let Some(endpoint) = endpoint else {
            return;
        };

        let mut inner = self.shared.lock();
        let state = self.state();
        let same = inner.endpoint.as_ref() == Some(&endpoint);
        if same && (state.is_connected() || state.is_connecting()) {
            return;
        }

        teardown(&mut inner);
        if !same {
            inner.budget.reset();
        }
        tracing::info!(host = %endpoint, "connecting push channel");
        inner.endpoint = Some(endpoint);
        inner.auto_reconnect = true;
        start_attempt(&self.shared, &mut inner);
    }

    /// Close the channel and cancel every timer. Stays down until
    /// [`connect`](Self::connect) or [`reconnect`](Self::reconnect).
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.auto_reconnect = false;
        teardown(&mut inner);
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Drop the socket and start over with a fresh budget.
    pub fn reconnect(&self) {
        let mut inner = self.shared.lock();
        teardown(&mut inner);
        inner.budget.reset();
        inner.auto_reconnect = true;
        if inner.endpoint.is_some() {
            start_attempt(&self.shared, &mut inner);
        } else {
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }

    /// Disconnect and forget the endpoint. Used when the credential goes away.
    pub fn release(&self) {
        let mut inner = self.shared.lock();
        inner.auto_reconnect = false;
        teardown(&mut inner);
        inner.endpoint = None;
        inner.budget.reset();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Queue a text frame. Dropped with a warning unless connected.
    pub fn send(&self, message: impl Into<String>) {
        let message = message.into();
        let inner = self.shared.lock();
        let sent = match (&inner.outbound, self.state()) {
            (Some(outbound), ConnectionState::Connected) => outbound.send(message).is_ok(),
            _ => false,
        };
        if !sent {
            tracing::warn!(state = %self.state(), "push channel not connected, dropping outbound frame");
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DriverInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::debug!(state = %next, "push channel state changed");
        }
    }
}

/// Invalidate outstanding tasks and close the socket.
fn teardown(inner: &mut DriverInner) {
    inner.epoch = inner.epoch.wrapping_add(1);
    inner.tasks.abort_all();
    // Dropping the sender closes the transport
    inner.outbound = None;
}

fn start_attempt(shared: &Arc<Shared>, inner: &mut DriverInner) {
    let Some(endpoint) = inner.endpoint.clone() else {
        return;
    };
    inner.epoch = inner.epoch.wrapping_add(1);
    let epoch = inner.epoch;
    shared.set_state(ConnectionState::Connecting);

    let weak = Arc::downgrade(shared);
    let connector = shared.connector.clone();
    inner.tasks.open = Some(tokio::spawn(async move {
        let result = connector.connect(endpoint.as_str()).await;
        if let Some(shared) = weak.upgrade() {
            on_open_result(&shared, epoch, result);
        }
    }));

    let weak = Arc::downgrade(shared);
    let timeout = shared.connect_timeout;
    inner.tasks.connect_guard = Some(tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(shared) = weak.upgrade() {
            on_connect_timeout(&shared, epoch);
        }
    }));
}

fn on_open_result(shared: &Arc<Shared>, epoch: u64, result: Result<TransportLink, TransportError>) {
    let mut inner = shared.lock();
    if inner.epoch != epoch {
        return;
    }
    inner.tasks.open = None;
    if let Some(guard) = inner.tasks.connect_guard.take() {
        guard.abort();
    }

    match result {
        Ok(link) => {
            let TransportLink { outbound, inbound } = link;
            inner.budget.reset();
            inner.outbound = Some(outbound.clone());
            if let Some(endpoint) = &inner.endpoint {
                tracing::info!(host = %endpoint, "push channel connected");
            }
            // Publish the state before any frame can reach subscribers
            shared.set_state(ConnectionState::Connected);
            inner.tasks.reader = Some(spawn_reader(shared, epoch, outbound, inbound));
        }
        Err(e) => {
            tracing::warn!(error = %e, attempt = inner.budget.attempt(), "push channel failed to open");
            shared.set_state(ConnectionState::Error);
            schedule_reconnect(shared, &mut inner);
        }
    }
}

fn on_connect_timeout(shared: &Arc<Shared>, epoch: u64) {
    let mut inner = shared.lock();
    if inner.epoch != epoch || !shared.state_tx.borrow().is_connecting() {
        return;
    }
    tracing::warn!(
        timeout_ms = shared.connect_timeout.as_millis() as u64,
        "push channel connect timed out"
    );
    inner.tasks.connect_guard = None;
    if let Some(open) = inner.tasks.open.take() {
        open.abort();
    }
    inner.epoch = inner.epoch.wrapping_add(1);
    inner.outbound = None;
    shared.set_state(ConnectionState::Error);
    schedule_reconnect(shared, &mut inner);
}

fn on_closed(shared: &Arc<Shared>, epoch: u64, code: Option<u16>, reason: &str) {
    let mut inner = shared.lock();
    if inner.epoch != epoch {
        return;
    }
    tracing::info!(?code, reason, "push channel closed");
    inner.tasks.reader = None;
    inner.outbound = None;
    inner.epoch = inner.epoch.wrapping_add(1);
    shared.set_state(ConnectionState::Disconnected);
    schedule_reconnect(shared, &mut inner);
}

fn schedule_reconnect(shared: &Arc<Shared>, inner: &mut DriverInner) {
    if !inner.auto_reconnect || inner.endpoint.is_none() {
        return;
    }
    let delay = inner.budget.next_delay();
    let epoch = inner.epoch;
    tracing::info!(
        attempt = inner.budget.attempt(),
        delay_ms = delay.as_millis() as u64,
        "scheduling push channel reconnect"
    );

    let weak: Weak<Shared> = Arc::downgrade(shared);
    if let Some(previous) = inner.tasks.reconnect_timer.take() {
        previous.abort();
    }
    inner.tasks.reconnect_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(shared) = weak.upgrade() {
            let mut inner = shared.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.tasks.reconnect_timer = None;
            start_attempt(&shared, &mut inner);
        }
    }));
}

fn spawn_reader(
    shared: &Arc<Shared>,
    epoch: u64,
    outbound: UnboundedSender<String>,
    mut inbound: tokio::sync::mpsc::UnboundedReceiver<TransportMessage>,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(shared);
    let inbound_tx = shared.inbound_tx.clone();
    tokio::spawn(async move {
        let (code, reason) = loop {
            match inbound.recv().await {
                Some(TransportMessage::Text(text)) => {
                    let is_ping = RawFrame::parse(&text)
                        .map(|frame| frame.frame_type == FRAME_PING)
                        .unwrap_or(false);
                    if is_ping {
                        tracing::debug!("ping received, answering with pong");
                        let _ = outbound.send(ClientFrame::Pong.to_json());
                    }
                    // No subscribers is fine
                    let _ = inbound_tx.send(text);
                }
                Some(TransportMessage::Closed { code, reason }) => break (code, reason),
                None => break (None, "transport dropped".to_string()),
            }
        };
        drop(outbound);
        if let Some(shared) = weak.upgrade() {
            on_closed(&shared, epoch, code, &reason);
        }
    })
}
