//! Turning a queued track into a live packet stream.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::{
    audio::{
        CodecDecision, KillHandle, PacketSource, Prober, SourceError, SourceInput, TranscodeArgs,
    },
    catalog::Catalog,
    common::types::RoomId,
    configs::PlayerConfig,
    protocol::tracks::TrackRef,
};

/// A blocking packet cursor. `next_packet` runs on the blocking pool; the
/// kill handle is the only thing touched from elsewhere.
pub trait PacketStream: Send {
    fn next_packet(&mut self) -> Result<Option<Bytes>, SourceError>;

    fn kill_handle(&self) -> KillHandle;
}

impl PacketStream for PacketSource {
    fn next_packet(&mut self) -> Result<Option<Bytes>, SourceError> {
        PacketSource::next_packet(self)
    }

    fn kill_handle(&self) -> KillHandle {
        PacketSource::kill_handle(self)
    }
}

#[async_trait]
pub trait TrackStreamer: Send + Sync {
    /// Opens `track` for a transport running at `transport_bitrate_kbps`.
    async fn open(
        &self,
        room: &RoomId,
        track: &TrackRef,
        transport_bitrate_kbps: u32,
    ) -> Result<Box<dyn PacketStream>, SourceError>;
}

/// Catalog stream URL → probe → codec decision → transcoder.
pub struct FfmpegStreamer {
    catalog: Arc<dyn Catalog>,
    prober: Prober,
    config: PlayerConfig,
}

impl FfmpegStreamer {
    pub fn new(catalog: Arc<dyn Catalog>, prober: Prober, config: PlayerConfig) -> Self {
        Self {
            catalog,
            prober,
            config,
        }
    }
}

#[async_trait]
impl TrackStreamer for FfmpegStreamer {
    async fn open(
        &self,
        room: &RoomId,
        track: &TrackRef,
        transport_bitrate_kbps: u32,
    ) -> Result<Box<dyn PacketStream>, SourceError> {
        let url = self.catalog.stream_url(&track.id, transport_bitrate_kbps);
        let probed = self.prober.probe(&url).await;
        let decision = CodecDecision::decide(
            &probed,
            Some(transport_bitrate_kbps),
            self.config.default_bitrate_kbps,
        );

        info!("[{}] Opening {} ({})", room, track, decision);

        let input = SourceInput::Locator(url);
        let args = TranscodeArgs::new(input.arg(), decision)
            .before_options(self.config.before_options.iter().cloned())
            .options(self.config.options.iter().cloned());

        let source = PacketSource::spawn(&self.config.executable, &args, input)?
            .with_strict_end(self.config.strict_stream_end);

        Ok(Box::new(source))
    }
}
