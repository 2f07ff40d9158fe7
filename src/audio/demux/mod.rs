//! Demux layer: container parsing for transcoder output.

pub mod ogg;

pub use ogg::{OggError, OggPacketReader};
