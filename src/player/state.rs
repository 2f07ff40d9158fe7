use serde::Serialize;

use crate::{
    common::types::{ChannelId, RoomId},
    protocol::tracks::TrackRef,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomState {
    /// No transport. The queue may still hold tracks.
    #[default]
    Idle,
    Connecting,
    Playing,
    Paused,
}

/// Read-only view of one room, republished after every transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub state: RoomState,
    pub paused: bool,
    pub channel: Option<ChannelId>,
    pub now_playing: Option<TrackRef>,
    pub queue: Vec<TrackRef>,
}

impl RoomSnapshot {
    pub fn idle(room_id: RoomId) -> Self {
        Self {
            room_id,
            state: RoomState::Idle,
            paused: false,
            channel: None,
            now_playing: None,
            queue: Vec::new(),
        }
    }
}

/// What an accepted enqueue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueReceipt {
    pub queued: usize,
    /// Playback was started (or restarted) by this request.
    pub started: bool,
}
