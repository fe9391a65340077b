//! Live subscription handler
//!
//! A subscription is a long-lived chunked response: an initial full
//! snapshot frame, then one frame per room event, with blank-line
//! keep-alives in between. The stream ends after `room-deleted`.
//!
//! Frame format:
//! ```text
//! event: message-added\r\n
//! data: {...}\r\n
//! \r\n
//! ```

use axum::{
    body::Body,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::{ChatSnapshot, RoomEvent};

use super::require_user;

/// Keep-alive cadence for idle subscriptions
const KEEP_ALIVE_SECS: u64 = 15;

/// GET /chat/{room_id}/subscribe
pub async fn subscribe(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    info!("GET /chat/{}/subscribe", room_id);

    require_user(&state, &headers).await?;

    let room_lock = state
        .store
        .get_room(&room_id)
        .await?
        .ok_or(Error::RoomNotFound)?;

    // Subscribe before taking the snapshot so an update landing in between
    // is delivered rather than lost
    let channel = state.store.get_channel(&room_id).await;
    let mut rx = channel.tx.subscribe();

    let room = room_lock.read().await.summary();
    let messages = state.store.get_messages(&room_id).await?;
    let snapshot = ChatSnapshot { room, messages };

    let stream = async_stream::stream! {
        let snapshot_json = serde_json::to_string(&snapshot).unwrap_or_default();
        yield Ok::<_, Infallible>(format!("event: snapshot\r\ndata: {}\r\n\r\n", snapshot_json));

        let mut keep_alive = tokio::time::interval(Duration::from_secs(KEEP_ALIVE_SECS));
        keep_alive.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let ended = matches!(event, RoomEvent::RoomDeleted);
                            let data = serde_json::to_string(&event).unwrap_or_default();
                            yield Ok::<_, Infallible>(
                                format!("event: {}\r\ndata: {}\r\n\r\n", event.kind(), data)
                            );
                            if ended {
                                debug!("Subscription to '{}' ended: room deleted", room_id);
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // Updates were dropped; the client refetches the
                            // snapshot on this signal
                            debug!("Subscriber lagged by {} on '{}'", missed, room_id);
                            yield Ok::<_, Infallible>("event: lagged\r\ndata: {}\r\n\r\n".to_string());
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = keep_alive.tick() => {
                    // Blank line keep-alive
                    yield Ok::<_, Infallible>("\r\n".to_string());
                }
            }
        }
    };

    let response = axum::response::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(http::header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(format!("Failed to build subscription response: {}", e)))?;

    Ok(response)
}
