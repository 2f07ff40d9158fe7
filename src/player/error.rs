use crate::common::types::RoomId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    /// The transcoder could not be started for one track. The queue moves on.
    #[error("could not play {track}: {reason}")]
    LaunchFailure { track: String, reason: String },
    #[error("cannot join voice: {0}")]
    TransportUnavailable(String),
    #[error("room {0} was being torn down, try again")]
    ConcurrentStateConflict(RoomId),
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("the queue is empty")]
    NothingQueued,
    #[error("already playing")]
    AlreadyPlaying,
}

impl PlayerError {
    pub fn not_in_room() -> Self {
        Self::TransportUnavailable("caller is not in any room".to_string())
    }
}
