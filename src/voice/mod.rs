//! Voice transport seam.
//!
//! A [`VoiceConnector`] joins the caller's channel and hands back a shared
//! [`VoiceTransport`]. The room that connected owns the transport until it
//! calls `disconnect`; the feed task only borrows it to send packets.

pub mod rtp;

pub use rtp::{RtpConnector, RtpTransport};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::common::types::ChannelId;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("caller is not in a joinable channel")]
    NotJoinable,
    #[error("channel {channel} has unusable address {address:?}")]
    Address { channel: ChannelId, address: String },
    #[error("voice socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("voice transport is closed")]
    Closed,
}

/// Where the requesting caller currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerLocation {
    pub channel: ChannelId,
}

impl From<ChannelId> for CallerLocation {
    fn from(channel: ChannelId) -> Self {
        Self { channel }
    }
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Sends one Opus packet. Awaiting this is the transport's
    /// backpressure.
    async fn send_packet(&self, packet: Bytes) -> Result<(), VoiceError>;

    fn pause(&self);

    fn resume(&self);

    async fn disconnect(&self);

    /// Call bitrate, sizes the re-encode target at track start.
    fn negotiated_bitrate_kbps(&self) -> u32;

    fn channel(&self) -> ChannelId;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, location: CallerLocation)
    -> Result<Arc<dyn VoiceTransport>, VoiceError>;
}
