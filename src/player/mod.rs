//! Per-room playback scheduling.
//!
//! ```text
//! src/player/
//! ├── registry.rs  ← RoomRegistry: room id → room task, events, retries
//! ├── room.rs      ← Room: queue + transport + feed, one command at a time
//! ├── feed.rs      ← FeedHandle: packet stream → transport for one track
//! ├── streamer.rs  ← TrackStreamer / PacketStream seam, FfmpegStreamer
//! ├── state.rs     ← RoomState, RoomSnapshot
//! └── error.rs     ← PlayerError
//! ```

pub mod error;
pub mod feed;
pub mod registry;
pub mod room;
pub mod state;
pub mod streamer;

pub use error::PlayerError;
pub use registry::RoomRegistry;
pub use state::{EnqueueReceipt, RoomSnapshot, RoomState};
pub use streamer::{FfmpegStreamer, PacketStream, TrackStreamer};

/// Upper bound for joining a voice channel.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
