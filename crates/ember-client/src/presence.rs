//! Presence heartbeat loop
//!
//! While a client is attached to a room it re-writes its presence record on
//! a fixed period; every other client applies the same freshness predicate
//! to decide who is online. Failed writes are never retried; a missed
//! heartbeat just lets the record age out, which covers crashes and
//! network loss the same way.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiClient;

/// Default heartbeat period (the observed range is 8–20 s)
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(20);

pub struct PresenceReporter {
    api: Arc<ApiClient>,
    room_id: String,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PresenceReporter {
    /// Start heartbeating immediately and then on every period tick.
    ///
    /// `room_gone` flips to `true` when a heartbeat write is rejected with
    /// "room not found", the signal for the owning view to force-exit.
    pub fn start(
        api: Arc<ApiClient>,
        room_id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: Option<String>,
        period: Duration,
        room_gone: watch::Sender<bool>,
    ) -> Self {
        let room_id = room_id.into();
        let display_name = display_name.into();

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task_api = api.clone();
        let task_room = room_id.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("Heartbeat loop for '{}' shut down", task_room);
                        break;
                    }

                    // First tick completes immediately, so the record exists
                    // before anyone asks
                    _ = ticker.tick() => {
                        match task_api
                            .heartbeat(&task_room, &display_name, avatar_url.as_deref())
                            .await
                        {
                            Ok(_) => {}
                            Err(e) if e.is_room_gone() => {
                                info!("Room '{}' disappeared; stopping heartbeat", task_room);
                                let _ = room_gone.send(true);
                                break;
                            }
                            Err(e) => {
                                // Not retried; the record ages out on its own
                                warn!("Heartbeat write failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Self {
            api,
            room_id,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    /// Clean detach: cancel the periodic task strictly before the final
    /// offline write, so a racing heartbeat can never resurrect a stale
    /// "online" state. The offline write itself is best effort.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        if let Err(e) = self.api.set_offline(&self.room_id).await {
            debug!("Offline write for '{}' failed (ignored): {}", self.room_id, e);
        }
    }
}

impl Drop for PresenceReporter {
    fn drop(&mut self) {
        // Abnormal teardown: no offline write happens; staleness detection
        // by readers is the only recovery for this path
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
