//! The per-track feed: one task moving packets from a [`PacketStream`] to
//! the room's transport.
//!
//! ```text
//!  spawn_blocking                      feed task
//!  ┌──────────────┐  bounded flume   ┌──────────────────────┐
//!  │ next_packet()│ ───────────────► │ wait while paused    │
//!  │   (blocks)   │                  │ transport.send_packet│
//!  └──────────────┘                  └──────────────────────┘
//! ```
//!
//! Cancelling kills the transcoder, drops the receiver and joins the pump,
//! so by the time [`FeedHandle::stop`] returns the stream is gone.

use std::sync::Arc;

use bytes::Bytes;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::streamer::{PacketStream, TrackStreamer};
use crate::{
    audio::SourceError, common::types::RoomId, protocol::tracks::TrackRef,
    voice::VoiceTransport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The stream reached its end.
    Finished,
    /// The stream could not be opened.
    LaunchFailed(String),
    /// The stream broke mid-track (strict mode only).
    StreamFailed(String),
    /// The transport refused a packet.
    TransportLost(String),
    Cancelled,
}

pub struct FeedHandle {
    pub track: TrackRef,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    task: JoinHandle<FeedOutcome>,
}

impl FeedHandle {
    pub fn spawn(
        room: RoomId,
        track: TrackRef,
        streamer: Arc<dyn TrackStreamer>,
        transport: Arc<dyn VoiceTransport>,
        buffer: usize,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (paused, paused_rx) = watch::channel(false);

        let task = tokio::spawn(run_feed(
            room,
            track.clone(),
            streamer,
            transport,
            cancel.clone(),
            paused_rx,
            buffer.max(1),
        ));

        Self {
            track,
            cancel,
            paused,
            task,
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    /// Resolves once the feed ends on its own. Must not be polled again
    /// after it resolved.
    pub async fn completion(&mut self) -> FeedOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => FeedOutcome::StreamFailed(format!("feed task failed: {}", e)),
        }
    }

    /// Cancels the feed and waits until its stream is released.
    pub async fn stop(mut self) -> FeedOutcome {
        self.cancel.cancel();
        self.completion().await
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_feed(
    room: RoomId,
    track: TrackRef,
    streamer: Arc<dyn TrackStreamer>,
    transport: Arc<dyn VoiceTransport>,
    cancel: CancellationToken,
    mut paused: watch::Receiver<bool>,
    buffer: usize,
) -> FeedOutcome {
    let bitrate = transport.negotiated_bitrate_kbps();

    let stream = tokio::select! {
        _ = cancel.cancelled() => return FeedOutcome::Cancelled,
        opened = streamer.open(&room, &track, bitrate) => match opened {
            Ok(stream) => stream,
            Err(e) => return FeedOutcome::LaunchFailed(e.to_string()),
        },
    };

    let kill = stream.kill_handle();
    let (tx, rx) = flume::bounded::<Result<Bytes, SourceError>>(buffer);
    let pump = tokio::task::spawn_blocking(move || pump_packets(stream, tx));

    let mut sent: u64 = 0;
    let outcome = loop {
        if *paused.borrow_and_update() {
            tokio::select! {
                _ = cancel.cancelled() => break FeedOutcome::Cancelled,
                changed = paused.changed() => {
                    if changed.is_err() {
                        break FeedOutcome::Cancelled;
                    }
                    continue;
                }
            }
        }

        let next = tokio::select! {
            _ = cancel.cancelled() => break FeedOutcome::Cancelled,
            changed = paused.changed() => {
                if changed.is_err() {
                    break FeedOutcome::Cancelled;
                }
                continue;
            }
            next = rx.recv_async() => next,
        };

        match next {
            Ok(Ok(packet)) => {
                let result = tokio::select! {
                    _ = cancel.cancelled() => break FeedOutcome::Cancelled,
                    result = transport.send_packet(packet) => result,
                };
                if let Err(e) = result {
                    break FeedOutcome::TransportLost(e.to_string());
                }
                sent += 1;
            }
            Ok(Err(e)) => break FeedOutcome::StreamFailed(e.to_string()),
            // Pump hung up: end of stream.
            Err(_) => break FeedOutcome::Finished,
        }
    };

    if outcome != FeedOutcome::Finished {
        kill.kill();
    }
    drop(rx);
    if let Err(e) = pump.await {
        warn!("[{}] Packet pump for {} panicked: {}", room, track, e);
    }

    debug!("[{}] Feed for {} ended after {} packets: {:?}", room, track, sent, outcome);
    outcome
}

fn pump_packets(mut stream: Box<dyn PacketStream>, tx: flume::Sender<Result<Bytes, SourceError>>) {
    loop {
        match stream.next_packet() {
            Ok(Some(packet)) => {
                if tx.send(Ok(packet)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}
