//! Google push notifications. Every notification is acknowledged with 200;
//! Google retries anything else.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use roomsync_core::RoomId;
use roomsync_core::debounce::Trigger;
use serde::Serialize;

use crate::state::AppState;

const CHANNEL_ID: &str = "x-goog-channel-id";
const RESOURCE_STATE: &str = "x-goog-resource-state";
const RESOURCE_ID: &str = "x-goog-resource-id";
const CHANNEL_TOKEN: &str = "x-goog-channel-token";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/google", post(receive))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub resource_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /webhook/google
async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<WebhookAck> {
    let resource_state = header(&headers, RESOURCE_STATE).unwrap_or_default().to_string();
    let channel_id = header(&headers, CHANNEL_ID).unwrap_or_default();
    let resource_id = header(&headers, RESOURCE_ID).unwrap_or_default();
    let token = header(&headers, CHANNEL_TOKEN);

    let mut ack = WebhookAck {
        received: true,
        resource_state,
        room: None,
        trigger: None,
    };

    match ack.resource_state.as_str() {
        "sync" => {
            tracing::info!(channel_id, resource_id, "channel handshake");
        }
        "exists" => {
            let room = match state.channels.resolve_room(channel_id, token).await {
                Ok(room) => room,
                Err(err) => {
                    // Still acknowledge; the next notification retries.
                    tracing::error!(channel_id, error = %err, "could not resolve notification channel");
                    None
                }
            };
            match room {
                Some(room) => {
                    let trigger = state.trigger_sync(room);
                    tracing::info!(room = %room, channel_id, ?trigger, "change notification");
                    ack.room = Some(room);
                    ack.trigger = Some(trigger);
                }
                None => {
                    tracing::warn!(channel_id, resource_id, "notification for unknown channel");
                }
            }
        }
        other => {
            tracing::debug!(channel_id, resource_state = other, "notification ignored");
        }
    }

    Json(ack)
}
