//! One task per room owning its queue, now-playing entry, transport and
//! feed.
//!
//! Commands and feed completions are handled one at a time by the same task,
//! so an enqueue or skip can never interleave with an advance to the next
//! track. Nothing here blocks: connecting and stopping a feed are awaited,
//! the transcoder I/O lives on the feed's blocking pump.

use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
    time::Duration,
};

use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, warn};

use super::{
    CONNECT_TIMEOUT_SECS,
    error::PlayerError,
    feed::{FeedHandle, FeedOutcome},
    registry::RoomHandle,
    state::{EnqueueReceipt, RoomSnapshot, RoomState},
    streamer::TrackStreamer,
};
use crate::{
    common::types::RoomId,
    protocol::{
        events::{RoomEvent, TrackEndReason},
        tracks::{QueuePosition, TrackRef},
    },
    voice::{CallerLocation, VoiceConnector, VoiceError, VoiceTransport},
};

type Reply<T> = oneshot::Sender<Result<T, PlayerError>>;

pub enum RoomCommand {
    Enqueue {
        tracks: Vec<TrackRef>,
        position: QueuePosition,
        caller: Option<CallerLocation>,
        reply: Reply<EnqueueReceipt>,
    },
    Skip {
        reply: Reply<TrackRef>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Start {
        caller: Option<CallerLocation>,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Shutdown,
}

/// Collaborators shared by every room.
#[derive(Clone)]
pub struct RoomDeps {
    pub connector: Arc<dyn VoiceConnector>,
    pub streamer: Arc<dyn TrackStreamer>,
    pub events: broadcast::Sender<RoomEvent>,
    pub packet_buffer: usize,
}

pub struct Room {
    id: RoomId,
    generation: u64,
    deps: RoomDeps,
    rooms: Weak<DashMap<RoomId, RoomHandle>>,
    commands: flume::Receiver<RoomCommand>,
    status: watch::Sender<RoomSnapshot>,

    queue: VecDeque<TrackRef>,
    transport: Option<Arc<dyn VoiceTransport>>,
    feed: Option<FeedHandle>,
    paused: bool,
    connecting: bool,
}

enum Event {
    Command(Option<RoomCommand>),
    FeedDone(FeedOutcome),
}

impl Room {
    pub fn new(
        id: RoomId,
        generation: u64,
        deps: RoomDeps,
        rooms: Weak<DashMap<RoomId, RoomHandle>>,
        commands: flume::Receiver<RoomCommand>,
        status: watch::Sender<RoomSnapshot>,
    ) -> Self {
        Self {
            id,
            generation,
            deps,
            rooms,
            commands,
            status,
            queue: VecDeque::new(),
            transport: None,
            feed: None,
            paused: false,
            connecting: false,
        }
    }

    pub async fn run(mut self) {
        debug!("[{}] Room task started", self.id);

        loop {
            let event = tokio::select! {
                cmd = self.commands.recv_async() => Event::Command(cmd.ok()),
                outcome = wait_feed(&mut self.feed) => Event::FeedDone(outcome),
            };

            match event {
                Event::Command(Some(RoomCommand::Shutdown)) | Event::Command(None) => break,
                Event::Command(Some(cmd)) => self.handle(cmd).await,
                Event::FeedDone(outcome) => {
                    if let Some(feed) = self.feed.take() {
                        self.on_feed_done(feed.track.clone(), outcome).await;
                    }
                }
            }

            self.publish();

            if self.is_disposable() {
                break;
            }
        }

        self.teardown().await;
    }

    /// Applies one command. The snapshot is published before the reply goes
    /// out, so a caller that reads `snapshot()` after awaiting the reply
    /// sees its own command applied.
    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Enqueue {
                tracks,
                position,
                caller,
                reply,
            } => {
                let result = self.enqueue(tracks, position, caller).await;
                self.publish();
                let _ = reply.send(result);
            }
            RoomCommand::Skip { reply } => {
                let result = self.skip().await;
                self.publish();
                let _ = reply.send(result);
            }
            RoomCommand::Pause { reply } => {
                let result = self.pause();
                self.publish();
                let _ = reply.send(result);
            }
            RoomCommand::Resume { reply } => {
                let result = self.resume().await;
                self.publish();
                let _ = reply.send(result);
            }
            RoomCommand::Start { caller, reply } => {
                let result = self.start(caller).await;
                self.publish();
                let _ = reply.send(result);
            }
            RoomCommand::Disconnect { reply } => {
                let result = self.disconnect().await;
                self.publish();
                let _ = reply.send(result);
            }
            RoomCommand::Shutdown => {}
        }
    }

    // ── Commands ────────────────────────────────────────────────────────────

    async fn enqueue(
        &mut self,
        tracks: Vec<TrackRef>,
        position: QueuePosition,
        caller: Option<CallerLocation>,
    ) -> Result<EnqueueReceipt, PlayerError> {
        if tracks.is_empty() {
            return Err(PlayerError::NothingQueued);
        }
        let queued = tracks.len();

        if self.transport.is_none() {
            match caller {
                Some(location) => {
                    self.connect(location).await?;
                    self.insert(tracks, position);
                    self.play_next().await;
                    return Ok(EnqueueReceipt {
                        queued,
                        started: true,
                    });
                }
                None if position == QueuePosition::Now => {
                    return Err(PlayerError::not_in_room());
                }
                None => {
                    self.insert(tracks, position);
                    return Ok(EnqueueReceipt {
                        queued,
                        started: false,
                    });
                }
            }
        }

        self.insert(tracks, position);

        let started = match (&self.feed, position) {
            (Some(_), QueuePosition::Now) => {
                self.end_current(TrackEndReason::Replaced).await;
                self.play_next().await;
                true
            }
            (Some(_), _) => false,
            (None, _) => {
                self.play_next().await;
                true
            }
        };

        Ok(EnqueueReceipt { queued, started })
    }

    async fn skip(&mut self) -> Result<TrackRef, PlayerError> {
        let Some(track) = self.end_current(TrackEndReason::Skipped).await else {
            return Err(PlayerError::NothingPlaying);
        };
        info!("[{}] Skipped {}", self.id, track);
        self.play_next().await;
        Ok(track)
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        let (Some(feed), Some(transport)) = (&self.feed, &self.transport) else {
            return Err(PlayerError::NothingPlaying);
        };
        if !self.paused {
            self.paused = true;
            transport.pause();
            feed.set_paused(true);
            info!("[{}] Paused {}", self.id, feed.track);
        }
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlayerError> {
        let Some(transport) = self.transport.clone() else {
            return Err(PlayerError::NotConnected);
        };
        if self.paused {
            self.paused = false;
            transport.resume();
        }
        match &self.feed {
            Some(feed) => {
                feed.set_paused(false);
                info!("[{}] Resumed {}", self.id, feed.track);
            }
            None => self.play_next().await,
        }
        Ok(())
    }

    async fn start(&mut self, caller: Option<CallerLocation>) -> Result<(), PlayerError> {
        if self.feed.is_some() {
            return if self.paused {
                self.resume().await
            } else {
                Err(PlayerError::AlreadyPlaying)
            };
        }
        if self.queue.is_empty() {
            return Err(PlayerError::NothingQueued);
        }
        if self.transport.is_none() {
            let location = caller.ok_or_else(PlayerError::not_in_room)?;
            self.connect(location).await?;
        }
        self.play_next().await;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), PlayerError> {
        if self.transport.is_none() {
            return Err(PlayerError::NotConnected);
        }
        self.end_current(TrackEndReason::Disconnected).await;
        self.release_transport().await;
        Ok(())
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    async fn connect(&mut self, location: CallerLocation) -> Result<(), PlayerError> {
        self.connecting = true;
        self.publish();

        let result = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            self.deps.connector.connect(location),
        )
        .await;
        self.connecting = false;

        match result {
            Ok(Ok(transport)) => {
                info!(
                    "[{}] Connected to channel {} ({} kbps)",
                    self.id,
                    transport.channel(),
                    transport.negotiated_bitrate_kbps()
                );
                self.transport = Some(transport);
                self.paused = false;
                Ok(())
            }
            Ok(Err(VoiceError::NotJoinable)) => Err(PlayerError::not_in_room()),
            Ok(Err(e)) => Err(PlayerError::TransportUnavailable(e.to_string())),
            Err(_) => Err(PlayerError::TransportUnavailable(format!(
                "connect timed out after {}s",
                CONNECT_TIMEOUT_SECS
            ))),
        }
    }

    fn insert(&mut self, tracks: Vec<TrackRef>, position: QueuePosition) {
        match position {
            QueuePosition::Last => self.queue.extend(tracks),
            QueuePosition::Next | QueuePosition::Now => {
                for track in tracks.into_iter().rev() {
                    self.queue.push_front(track);
                }
            }
        }
    }

    /// Starts the queue head, or goes idle when the queue is exhausted.
    async fn play_next(&mut self) {
        debug_assert!(self.feed.is_none(), "two feeds for one room");
        let Some(transport) = self.transport.clone() else {
            return;
        };

        let Some(track) = self.queue.pop_front() else {
            info!("[{}] Queue finished", self.id);
            self.release_transport().await;
            self.emit(RoomEvent::QueueFinished {
                room_id: self.id.clone(),
            });
            return;
        };

        if self.paused {
            self.paused = false;
            transport.resume();
        }

        info!("[{}] Now playing {}", self.id, track);
        self.emit(RoomEvent::TrackStart {
            room_id: self.id.clone(),
            track: track.clone(),
        });

        self.feed = Some(FeedHandle::spawn(
            self.id.clone(),
            track,
            self.deps.streamer.clone(),
            transport,
            self.deps.packet_buffer,
        ));
    }

    /// Stops the current feed, if any, and waits for its stream to be gone.
    async fn end_current(&mut self, reason: TrackEndReason) -> Option<TrackRef> {
        let feed = self.feed.take()?;
        let track = feed.track.clone();
        let outcome = feed.stop().await;
        debug!("[{}] Stopped {} ({:?})", self.id, track, outcome);

        self.emit(RoomEvent::TrackEnd {
            room_id: self.id.clone(),
            track: track.clone(),
            reason,
        });
        Some(track)
    }

    async fn on_feed_done(&mut self, track: TrackRef, outcome: FeedOutcome) {
        let reason = match outcome {
            FeedOutcome::Finished | FeedOutcome::Cancelled => TrackEndReason::Finished,
            FeedOutcome::LaunchFailed(reason) | FeedOutcome::StreamFailed(reason) => {
                let error = PlayerError::LaunchFailure {
                    track: track.to_string(),
                    reason,
                };
                warn!("[{}] {}", self.id, error);
                self.emit(RoomEvent::TrackException {
                    room_id: self.id.clone(),
                    track: track.clone(),
                    message: error.to_string(),
                });
                TrackEndReason::LoadFailed
            }
            FeedOutcome::TransportLost(reason) => {
                warn!("[{}] Transport lost during {}: {}", self.id, track, reason);
                self.emit(RoomEvent::TrackEnd {
                    room_id: self.id.clone(),
                    track,
                    reason: TrackEndReason::Disconnected,
                });
                self.release_transport().await;
                return;
            }
        };

        self.emit(RoomEvent::TrackEnd {
            room_id: self.id.clone(),
            track,
            reason,
        });
        self.play_next().await;
    }

    async fn release_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.disconnect().await;
            info!("[{}] Disconnected from channel {}", self.id, transport.channel());
        }
        self.paused = false;
    }

    async fn teardown(&mut self) {
        self.end_current(TrackEndReason::Disconnected).await;
        self.release_transport().await;
        self.publish();

        if let Some(rooms) = self.rooms.upgrade() {
            rooms.remove_if(&self.id, |_, handle| handle.generation == self.generation);
        }
        debug!("[{}] Room task stopped", self.id);
    }

    // ── Bookkeeping ─────────────────────────────────────────────────────────

    fn is_disposable(&self) -> bool {
        self.transport.is_none() && self.feed.is_none() && self.queue.is_empty()
    }

    fn state(&self) -> RoomState {
        match (&self.transport, &self.feed) {
            _ if self.connecting => RoomState::Connecting,
            (Some(_), Some(_)) if self.paused => RoomState::Paused,
            (Some(_), Some(_)) => RoomState::Playing,
            _ => RoomState::Idle,
        }
    }

    fn publish(&self) {
        self.status.send_replace(RoomSnapshot {
            room_id: self.id.clone(),
            state: self.state(),
            paused: self.paused,
            channel: self.transport.as_ref().map(|t| t.channel()),
            now_playing: self.feed.as_ref().map(|f| f.track.clone()),
            queue: self.queue.iter().cloned().collect(),
        });
    }

    fn emit(&self, event: RoomEvent) {
        // No subscribers is fine.
        let _ = self.deps.events.send(event);
    }
}

async fn wait_feed(feed: &mut Option<FeedHandle>) -> FeedOutcome {
    match feed {
        Some(feed) => feed.completion().await,
        None => std::future::pending().await,
    }
}
