//! Scoped room session
//!
//! Everything a mounted room view needs (the live subscription, the
//! presence heartbeat and the typing coordinator) is acquired together and
//! torn down together. `detach` runs the full cleanup on any exit path;
//! dropping an un-detached session still cancels every background task so
//! no heartbeat can outlive the view that started it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::api::{ApiClient, Subscription};
use crate::models::{FeedUpdate, RoomEvent, UserProfile};
use crate::presence::{PresenceReporter, DEFAULT_HEARTBEAT};
use crate::typing::{TypingCoordinator, DEFAULT_IDLE};
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub heartbeat_period: Duration,
    pub typing_idle: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat_period: DEFAULT_HEARTBEAT,
            typing_idle: DEFAULT_IDLE,
        }
    }
}

pub struct RoomSession {
    room_id: String,
    subscription: Option<Subscription>,
    presence: Option<PresenceReporter>,
    typing: TypingCoordinator,
    room_gone_tx: watch::Sender<bool>,
    room_gone_rx: watch::Receiver<bool>,
    detached: bool,
}

impl RoomSession {
    /// Attach to a room: open the subscription, start the heartbeat loop
    /// and set up typing coordination.
    pub async fn attach(
        api: Arc<ApiClient>,
        room_id: impl Into<String>,
        me: &UserProfile,
        options: SessionOptions,
    ) -> Result<Self> {
        let room_id = room_id.into();

        let subscription = api.subscribe(&room_id).await?;

        let (room_gone_tx, room_gone_rx) = watch::channel(false);

        let presence = PresenceReporter::start(
            api.clone(),
            room_id.clone(),
            me.username.clone(),
            me.avatar_url.clone(),
            options.heartbeat_period,
            room_gone_tx.clone(),
        );

        let typing = TypingCoordinator::with_idle(api, room_id.clone(), options.typing_idle);

        info!("Attached to room '{}'", room_id);

        Ok(Self {
            room_id,
            subscription: Some(subscription),
            presence: Some(presence),
            typing,
            room_gone_tx,
            room_gone_rx,
            detached: false,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Flips to `true` when the room is deleted out from under the view,
    /// observed either on the subscription stream or by a rejected
    /// heartbeat. The owner should detach and navigate back.
    pub fn room_gone(&self) -> watch::Receiver<bool> {
        self.room_gone_rx.clone()
    }

    /// Next live update. `None` once the stream has ended.
    pub async fn next_update(&mut self) -> Option<FeedUpdate> {
        let update = match self.subscription.as_mut() {
            Some(subscription) => subscription.next().await,
            None => None,
        };

        if let Some(FeedUpdate::Event(RoomEvent::RoomDeleted)) = &update {
            let _ = self.room_gone_tx.send(true);
        }

        update
    }

    /// Forward a keystroke to the typing coordinator
    pub async fn input_changed(&mut self, text: &str) {
        self.typing.on_input(text).await;
    }

    /// Release everything this session acquired. Safe to call on any exit
    /// path; later calls are no-ops.
    pub async fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;

        // Typing marker first: delete is idempotent and must not linger
        self.typing.on_detach().await;

        // Heartbeat: cancel the timer strictly before the offline write
        if let Some(presence) = self.presence.take() {
            presence.stop().await;
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.detach();
        }

        info!("Detached from room '{}'", self.room_id);
    }
}
