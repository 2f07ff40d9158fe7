pub mod events;
pub mod tracks;

pub use events::{RoomEvent, TrackEndReason};
pub use tracks::{AlbumRef, QueuePosition, TrackRef};
