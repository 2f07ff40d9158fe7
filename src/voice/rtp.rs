//! RTP-over-UDP reference transport.
//!
//! Every Opus packet goes out as one datagram behind a 12-byte RTP header
//! (version 2, dynamic payload type 120). Sends are paced on a 20 ms
//! interval, which is what slows the feed task down to real time.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    net::UdpSocket,
    sync::Mutex,
    time::{Interval, MissedTickBehavior},
};
use tracing::{debug, info};

use super::{CallerLocation, VoiceConnector, VoiceError, VoiceTransport};
use crate::{
    audio::constants::{FRAME_DURATION_MS, FRAME_SAMPLES},
    common::types::ChannelId,
    configs::VoiceConfig,
};

pub const RTP_VERSION_BYTE: u8 = 0x80;
pub const RTP_OPUS_PAYLOAD_TYPE: u8 = 120;
pub const RTP_HEADER_LEN: usize = 12;

/// Builds the fixed RTP header for one packet.
pub fn rtp_header(sequence: u16, timestamp: u32, ssrc: u32) -> [u8; RTP_HEADER_LEN] {
    let mut header = [0u8; RTP_HEADER_LEN];
    header[0] = RTP_VERSION_BYTE;
    header[1] = RTP_OPUS_PAYLOAD_TYPE;
    header[2..4].copy_from_slice(&sequence.to_be_bytes());
    header[4..8].copy_from_slice(&timestamp.to_be_bytes());
    header[8..12].copy_from_slice(&ssrc.to_be_bytes());
    header
}

pub struct RtpConnector {
    config: VoiceConfig,
}

impl RtpConnector {
    pub fn new(config: VoiceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl VoiceConnector for RtpConnector {
    async fn connect(
        &self,
        location: CallerLocation,
    ) -> Result<Arc<dyn VoiceTransport>, VoiceError> {
        let channel = self
            .config
            .channel(location.channel)
            .ok_or(VoiceError::NotJoinable)?;

        let address = tokio::net::lookup_host(&channel.address)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| VoiceError::Address {
                channel: channel.id,
                address: channel.address.clone(),
            })?;

        let transport = RtpTransport::bind(channel.id, address, channel.bitrate_kbps).await?;
        Ok(Arc::new(transport))
    }
}

struct SendState {
    sequence: u16,
    timestamp: u32,
    pacer: Interval,
    packet_buf: Vec<u8>,
}

pub struct RtpTransport {
    socket: UdpSocket,
    address: SocketAddr,
    channel: ChannelId,
    bitrate_kbps: u32,
    ssrc: u32,
    state: Mutex<SendState>,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl RtpTransport {
    pub async fn bind(
        channel: ChannelId,
        address: SocketAddr,
        bitrate_kbps: u32,
    ) -> Result<Self, VoiceError> {
        let local = if address.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).await?;
        let ssrc: u32 = rand::random();

        let mut pacer = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Voice channel {} connected: RTP to {} (ssrc={}, {} kbps)",
            channel, address, ssrc, bitrate_kbps
        );

        Ok(Self {
            socket,
            address,
            channel,
            bitrate_kbps,
            ssrc,
            state: Mutex::new(SendState {
                sequence: 0,
                timestamp: 0,
                pacer,
                packet_buf: Vec::with_capacity(1_500),
            }),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

#[async_trait]
impl VoiceTransport for RtpTransport {
    async fn send_packet(&self, packet: Bytes) -> Result<(), VoiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VoiceError::Closed);
        }

        let mut state = self.state.lock().await;
        state.pacer.tick().await;

        let header = rtp_header(state.sequence, state.timestamp, self.ssrc);
        state.sequence = state.sequence.wrapping_add(1);
        state.timestamp = state.timestamp.wrapping_add(FRAME_SAMPLES);

        state.packet_buf.clear();
        state.packet_buf.extend_from_slice(&header);
        state.packet_buf.extend_from_slice(&packet);

        self.socket.send_to(&state.packet_buf, self.address).await?;
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Voice channel {} disconnected", self.channel);
        }
    }

    fn negotiated_bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    fn channel(&self) -> ChannelId {
        self.channel
    }
}
