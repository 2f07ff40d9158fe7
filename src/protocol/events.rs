use serde::Serialize;

use crate::{common::types::RoomId, protocol::tracks::TrackRef};

/// Room lifecycle notifications published by the registry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        track: TrackRef,
    },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        track: TrackRef,
        reason: TrackEndReason,
    },

    /// The "could not play this track" notice. The queue advances anyway.
    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        track: TrackRef,
        message: String,
    },

    #[serde(rename = "QueueFinishedEvent")]
    QueueFinished {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::TrackStart { room_id, .. }
            | Self::TrackEnd { room_id, .. }
            | Self::TrackException { room_id, .. }
            | Self::QueueFinished { room_id } => room_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    Skipped,
    Replaced,
    LoadFailed,
    Disconnected,
}
