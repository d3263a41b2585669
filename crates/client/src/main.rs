//! Bestflow client - headless notification watcher
//!
//! Connects with `BESTFLOW_TOKEN`, logs connection state, the unread count
//! and incoming notifications, and refetches whatever the push channel marks
//! stale.

use bestflow_client::stores::QueryStatus;
use bestflow_client::{ClientConfig, NotificationCenter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bestflow_client::logging::init();

    let config = ClientConfig::from_env()?;
    let Some(token) = config.token.clone() else {
        anyhow::bail!("BESTFLOW_TOKEN is not set");
    };

    let center = NotificationCenter::new(&config);
    center.login(token);

    let mut state = center.watch_connection();
    let mut list = center.watch_notifications();
    let mut unread = center.watch_unread_count();

    // Initial load; failures are logged and retried when the cache goes stale
    if let Err(e) = center.retry().await {
        tracing::warn!(error = %e.message(), "initial load failed");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!(state = %current, "connection state");
            }
            changed = unread.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = unread.borrow_and_update().clone();
                match (snapshot.status, snapshot.data) {
                    (QueryStatus::Stale, _) => {
                        center.store().spawn_refresh();
                    }
                    (_, Some(count)) => tracing::info!(count, "unread notifications"),
                    _ => {}
                }
            }
            changed = list.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = list.borrow_and_update().clone();
                match (snapshot.status, snapshot.data) {
                    (QueryStatus::Stale, _) => {
                        center.store().spawn_refresh();
                    }
                    (_, Some(page)) => {
                        if let Some(head) = page.data.first() {
                            tracing::info!(
                                id = %head.id,
                                kind = head.kind.as_str(),
                                read = head.is_read,
                                "{}",
                                head.title
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    center.logout();
    Ok(())
}
