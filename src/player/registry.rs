//! Process-wide map from room identity to its room task.
//!
//! Handles are created on demand by commands that may start playback and
//! removed by the room task itself once it is idle with an empty queue.
//! A command that races that removal sees its channel or reply dropped; it
//! is retried once against a fresh room, then rejected with
//! [`PlayerError::ConcurrentStateConflict`].

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::debug;

use super::{
    error::PlayerError,
    room::{Room, RoomCommand, RoomDeps},
    state::{EnqueueReceipt, RoomSnapshot},
    streamer::TrackStreamer,
};
use crate::{
    common::types::RoomId,
    protocol::{
        events::RoomEvent,
        tracks::{QueuePosition, TrackRef},
    },
    voice::{CallerLocation, VoiceConnector},
};

/// Capacity of the event broadcast; slow subscribers skip ahead.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pending commands per room.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct RoomHandle {
    pub(crate) generation: u64,
    commands: flume::Sender<RoomCommand>,
    status: watch::Receiver<RoomSnapshot>,
}

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    deps: RoomDeps,
    generations: Arc<AtomicU64>,
    /// Rooms still to be handed out with their task already gone.
    #[cfg(test)]
    dead_spawns: Arc<std::sync::atomic::AtomicUsize>,
}

impl RoomRegistry {
    pub fn new(
        connector: Arc<dyn VoiceConnector>,
        streamer: Arc<dyn TrackStreamer>,
        packet_buffer: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            rooms: Arc::new(DashMap::new()),
            deps: RoomDeps {
                connector,
                streamer,
                events,
                packet_buffer,
            },
            generations: Arc::new(AtomicU64::new(0)),
            #[cfg(test)]
            dead_spawns: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.deps.events.subscribe()
    }

    fn existing(&self, room: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(room).map(|h| h.value().clone())
    }

    fn get_or_create(&self, room: &RoomId) -> RoomHandle {
        self.rooms
            .entry(room.clone())
            .or_insert_with(|| self.spawn_room(room.clone()))
            .value()
            .clone()
    }

    fn spawn_room(&self, room: RoomId) -> RoomHandle {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        #[cfg(test)]
        {
            let dead = self
                .dead_spawns
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if dead {
                let (commands, _) = flume::bounded(COMMAND_CHANNEL_CAPACITY);
                let (_, status) = watch::channel(RoomSnapshot::idle(room));
                return RoomHandle {
                    generation,
                    commands,
                    status,
                };
            }
        }

        let (commands, rx) = flume::bounded(COMMAND_CHANNEL_CAPACITY);
        let (status_tx, status) = watch::channel(RoomSnapshot::idle(room.clone()));

        let task = Room::new(
            room,
            generation,
            self.deps.clone(),
            Arc::downgrade(&self.rooms),
            rx,
            status_tx,
        );
        tokio::spawn(task.run());

        RoomHandle {
            generation,
            commands,
            status,
        }
    }

    /// Drops a handle whose room task is gone, unless it was replaced.
    fn forget(&self, room: &RoomId, generation: u64) {
        self.rooms
            .remove_if(room, |_, handle| handle.generation == generation);
    }

    /// Sends one command, retrying once if the room went away underneath
    /// it. `None` when `create` is false and the room does not exist.
    async fn request<T>(
        &self,
        room: &RoomId,
        create: bool,
        make: impl Fn(oneshot::Sender<Result<T, PlayerError>>) -> RoomCommand,
    ) -> Option<Result<T, PlayerError>> {
        for attempt in 0..2 {
            let handle = if create {
                self.get_or_create(room)
            } else {
                self.existing(room)?
            };

            let (tx, rx) = oneshot::channel();
            if handle.commands.send_async(make(tx)).await.is_ok() {
                if let Ok(result) = rx.await {
                    return Some(result);
                }
            }

            debug!(
                "[{}] Room task went away mid-command (attempt {})",
                room,
                attempt + 1
            );
            self.forget(room, handle.generation);
            if !create {
                return None;
            }
        }

        Some(Err(PlayerError::ConcurrentStateConflict(room.clone())))
    }

    pub async fn enqueue(
        &self,
        room: &RoomId,
        tracks: Vec<TrackRef>,
        position: QueuePosition,
        caller: Option<CallerLocation>,
    ) -> Result<EnqueueReceipt, PlayerError> {
        if tracks.is_empty() {
            return Err(PlayerError::NothingQueued);
        }
        self.request(room, true, |reply| RoomCommand::Enqueue {
            tracks: tracks.clone(),
            position,
            caller,
            reply,
        })
        .await
        .unwrap_or(Err(PlayerError::NothingQueued))
    }

    pub async fn skip(&self, room: &RoomId) -> Result<TrackRef, PlayerError> {
        self.request(room, false, |reply| RoomCommand::Skip { reply })
            .await
            .unwrap_or(Err(PlayerError::NothingPlaying))
    }

    pub async fn pause(&self, room: &RoomId) -> Result<(), PlayerError> {
        self.request(room, false, |reply| RoomCommand::Pause { reply })
            .await
            .unwrap_or(Err(PlayerError::NothingPlaying))
    }

    pub async fn resume(&self, room: &RoomId) -> Result<(), PlayerError> {
        self.request(room, false, |reply| RoomCommand::Resume { reply })
            .await
            .unwrap_or(Err(PlayerError::NotConnected))
    }

    /// Begins playback of an already queued room.
    pub async fn start(
        &self,
        room: &RoomId,
        caller: Option<CallerLocation>,
    ) -> Result<(), PlayerError> {
        self.request(room, false, |reply| RoomCommand::Start { caller, reply })
            .await
            .unwrap_or(Err(PlayerError::NothingQueued))
    }

    /// Stops playback and leaves the channel. The queue is kept.
    pub async fn disconnect(&self, room: &RoomId) -> Result<(), PlayerError> {
        self.request(room, false, |reply| RoomCommand::Disconnect { reply })
            .await
            .unwrap_or(Err(PlayerError::NotConnected))
    }

    pub fn snapshot(&self, room: &RoomId) -> RoomSnapshot {
        self.existing(room)
            .map(|h| h.status.borrow().clone())
            .unwrap_or_else(|| RoomSnapshot::idle(room.clone()))
    }

    pub fn queue_of(&self, room: &RoomId) -> Vec<TrackRef> {
        self.snapshot(room).queue
    }

    pub fn now_playing(&self, room: &RoomId) -> Option<TrackRef> {
        self.snapshot(room).now_playing
    }

    pub fn rooms(&self) -> Vec<RoomSnapshot> {
        let mut rooms: Vec<RoomSnapshot> = self
            .rooms
            .iter()
            .map(|entry| entry.value().status.borrow().clone())
            .collect();
        rooms.sort_by(|a, b| a.room_id.0.cmp(&b.room_id.0));
        rooms
    }

    /// Stops every room: feeds cancelled, transports released.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self.rooms.iter().map(|e| e.value().clone()).collect();
        self.rooms.clear();

        for handle in handles {
            let _ = handle.commands.send_async(RoomCommand::Shutdown).await;
            let mut status = handle.status.clone();
            // The sender side closes when the room task finishes.
            while status.changed().await.is_ok() {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{Mutex as StdMutex, Weak, atomic::AtomicBool, atomic::AtomicUsize},
        time::Duration,
    };

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::{
        audio::{KillHandle, SourceError},
        common::types::ChannelId,
        player::{
            state::RoomState,
            streamer::PacketStream,
        },
        protocol::events::TrackEndReason,
        voice::{VoiceError, VoiceTransport},
    };

    const LONG: usize = 100_000;
    const SHORT: usize = 3;

    // ── Fakes ────────────────────────────────────────────────────────────

    struct FakeTransport {
        channel: ChannelId,
        sent: AtomicUsize,
        fail_after: Option<usize>,
        paused: AtomicBool,
        closed: AtomicBool,
    }

    #[async_trait]
    impl VoiceTransport for FakeTransport {
        async fn send_packet(&self, _packet: Bytes) -> Result<(), VoiceError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(VoiceError::Closed);
            }
            if let Some(limit) = self.fail_after {
                if self.sent.load(Ordering::SeqCst) >= limit {
                    return Err(VoiceError::Closed);
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn pause(&self) {
            self.paused.store(true, Ordering::SeqCst);
        }

        fn resume(&self) {
            self.paused.store(false, Ordering::SeqCst);
        }

        async fn disconnect(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn negotiated_bitrate_kbps(&self) -> u32 {
            64
        }

        fn channel(&self) -> ChannelId {
            self.channel
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        joinable: Vec<ChannelId>,
        fail_after: Option<usize>,
        made: StdMutex<Vec<Weak<FakeTransport>>>,
    }

    impl FakeConnector {
        fn joinable(channel: u64) -> Self {
            Self {
                joinable: vec![ChannelId(channel)],
                ..Default::default()
            }
        }

        fn connects(&self) -> usize {
            self.made.lock().unwrap().len()
        }

        fn last(&self) -> Option<Arc<FakeTransport>> {
            self.made.lock().unwrap().last().and_then(Weak::upgrade)
        }

        fn all_released(&self) -> bool {
            self.made
                .lock()
                .unwrap()
                .iter()
                .all(|t| t.upgrade().is_none())
        }
    }

    #[async_trait]
    impl VoiceConnector for FakeConnector {
        async fn connect(
            &self,
            location: CallerLocation,
        ) -> Result<Arc<dyn VoiceTransport>, VoiceError> {
            if !self.joinable.contains(&location.channel) {
                return Err(VoiceError::NotJoinable);
            }
            let transport = Arc::new(FakeTransport {
                channel: location.channel,
                sent: AtomicUsize::new(0),
                fail_after: self.fail_after,
                paused: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            });
            self.made.lock().unwrap().push(Arc::downgrade(&transport));
            Ok(transport)
        }
    }

    struct FakeStream {
        remaining: usize,
        kill: KillHandle,
        live: Arc<AtomicUsize>,
    }

    impl PacketStream for FakeStream {
        fn next_packet(&mut self) -> Result<Option<Bytes>, SourceError> {
            if self.kill.is_killed() || self.remaining == 0 {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(5));
            self.remaining -= 1;
            Ok(Some(Bytes::from_static(b"opus")))
        }

        fn kill_handle(&self) -> KillHandle {
            self.kill.clone()
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Track length is read from the id: `short*` tracks end after a few
    /// packets, `fail*` cannot launch, `stall*` never finishes opening.
    #[derive(Default)]
    struct FakeStreamer {
        live: Arc<AtomicUsize>,
        max_live: AtomicUsize,
        opened: StdMutex<Vec<String>>,
    }

    impl FakeStreamer {
        fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TrackStreamer for FakeStreamer {
        async fn open(
            &self,
            _room: &RoomId,
            track: &TrackRef,
            _transport_bitrate_kbps: u32,
        ) -> Result<Box<dyn PacketStream>, SourceError> {
            self.opened.lock().unwrap().push(track.id.clone());
            if track.id.starts_with("fail") {
                return Err(SourceError::Launch {
                    executable: "ffmpeg".into(),
                    source: std::io::Error::other("not found"),
                });
            }
            if track.id.starts_with("stall") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }

            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);

            let remaining = if track.id.starts_with("short") {
                SHORT
            } else {
                LONG
            };
            Ok(Box::new(FakeStream {
                remaining,
                kill: KillHandle::default(),
                live: self.live.clone(),
            }))
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    struct Harness {
        registry: RoomRegistry,
        connector: Arc<FakeConnector>,
        streamer: Arc<FakeStreamer>,
        room: RoomId,
    }

    fn harness(connector: FakeConnector) -> Harness {
        let connector = Arc::new(connector);
        let streamer = Arc::new(FakeStreamer::default());
        Harness {
            registry: RoomRegistry::new(connector.clone(), streamer.clone(), 4),
            connector,
            streamer,
            room: RoomId::from("guild-1"),
        }
    }

    fn track(id: &str) -> TrackRef {
        TrackRef::new(id, id.to_uppercase())
    }

    fn caller() -> Option<CallerLocation> {
        Some(ChannelId(1).into())
    }

    fn ids(tracks: &[TrackRef]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    fn drain(events: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn ended(events: &[RoomEvent], id: &str) -> Option<TrackEndReason> {
        events.iter().find_map(|e| match e {
            RoomEvent::TrackEnd { track, reason, .. } if track.id == id => Some(*reason),
            _ => None,
        })
    }

    // ── Tests ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn last_enqueues_keep_insertion_order() {
        let h = harness(FakeConnector::joinable(1));
        for id in ["a", "b", "c"] {
            let receipt = h
                .registry
                .enqueue(&h.room, vec![track(id)], QueuePosition::Last, None)
                .await
                .unwrap();
            assert!(!receipt.started);
        }

        assert_eq!(ids(&h.registry.queue_of(&h.room)), ["a", "b", "c"]);
        assert_eq!(h.registry.now_playing(&h.room), None);
        assert_eq!(h.registry.snapshot(&h.room).state, RoomState::Idle);
        assert_eq!(h.connector.connects(), 0);
    }

    #[tokio::test]
    async fn next_prepends_albums_in_order() {
        let h = harness(FakeConnector::joinable(1));
        h.registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, None)
            .await
            .unwrap();
        h.registry
            .enqueue(&h.room, vec![track("x"), track("y")], QueuePosition::Next, None)
            .await
            .unwrap();

        assert_eq!(ids(&h.registry.queue_of(&h.room)), ["x", "y", "a"]);
    }

    #[tokio::test]
    async fn enqueue_with_caller_plays_then_skip_goes_idle() {
        let h = harness(FakeConnector::joinable(1));
        let mut events = h.registry.subscribe();

        let receipt = h
            .registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, caller())
            .await
            .unwrap();
        assert!(receipt.started);

        let snapshot = h.registry.snapshot(&h.room);
        assert_eq!(snapshot.state, RoomState::Playing);
        assert_eq!(snapshot.now_playing.map(|t| t.id), Some("a".to_string()));
        assert!(snapshot.queue.is_empty());

        let skipped = h.registry.skip(&h.room).await.unwrap();
        assert_eq!(skipped.id, "a");

        assert!(wait_until(|| h.connector.all_released()).await);
        assert_eq!(h.registry.now_playing(&h.room), None);
        assert_eq!(h.registry.snapshot(&h.room).state, RoomState::Idle);
        assert_eq!(h.streamer.live.load(Ordering::SeqCst), 0);

        let events = drain(&mut events);
        assert_eq!(ended(&events, "a"), Some(TrackEndReason::Skipped));
        assert!(matches!(events.last(), Some(RoomEvent::QueueFinished { .. })));
    }

    #[tokio::test]
    async fn caller_outside_joinable_channel_is_rejected_without_mutation() {
        let h = harness(FakeConnector::joinable(1));
        let result = h
            .registry
            .enqueue(
                &h.room,
                vec![track("a")],
                QueuePosition::Last,
                Some(ChannelId(99).into()),
            )
            .await;

        assert!(matches!(result, Err(PlayerError::TransportUnavailable(_))));
        assert!(h.registry.queue_of(&h.room).is_empty());
        assert!(h.streamer.opened().is_empty());
    }

    #[tokio::test]
    async fn play_now_without_transport_needs_a_caller() {
        let h = harness(FakeConnector::joinable(1));
        let result = h
            .registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Now, None)
            .await;
        assert!(matches!(result, Err(PlayerError::TransportUnavailable(_))));
        assert!(h.registry.queue_of(&h.room).is_empty());
    }

    #[tokio::test]
    async fn play_now_preempts_the_current_track() {
        let h = harness(FakeConnector::joinable(1));
        let mut events = h.registry.subscribe();

        h.registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, caller())
            .await
            .unwrap();
        assert!(wait_until(|| h.streamer.live.load(Ordering::SeqCst) == 1).await);

        let receipt = h
            .registry
            .enqueue(&h.room, vec![track("b")], QueuePosition::Now, None)
            .await
            .unwrap();
        assert!(receipt.started);

        let snapshot = h.registry.snapshot(&h.room);
        assert_eq!(snapshot.now_playing.map(|t| t.id), Some("b".to_string()));
        assert!(snapshot.queue.is_empty());
        assert_eq!(ended(&drain(&mut events), "a"), Some(TrackEndReason::Replaced));

        assert!(wait_until(|| h.streamer.opened() == ["a", "b"]).await);
        assert_eq!(h.streamer.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(h.connector.connects(), 1);
    }

    #[tokio::test]
    async fn queued_track_stays_behind_play_now() {
        let h = harness(FakeConnector::joinable(1));
        h.registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, None)
            .await
            .unwrap();
        h.registry
            .enqueue(&h.room, vec![track("b")], QueuePosition::Now, caller())
            .await
            .unwrap();

        let snapshot = h.registry.snapshot(&h.room);
        assert_eq!(ids(&snapshot.queue), ["a"]);
        assert_eq!(snapshot.now_playing.map(|t| t.id), Some("b".to_string()));
    }

    #[tokio::test]
    async fn end_of_stream_advances_exactly_one() {
        let h = harness(FakeConnector::joinable(1));
        let mut events = h.registry.subscribe();

        h.registry
            .enqueue(
                &h.room,
                vec![track("short-a"), track("b"), track("c")],
                QueuePosition::Last,
                caller(),
            )
            .await
            .unwrap();

        assert!(
            wait_until(|| h.registry.now_playing(&h.room).map(|t| t.id)
                == Some("b".to_string()))
            .await
        );
        assert_eq!(ids(&h.registry.queue_of(&h.room)), ["c"]);
        assert_eq!(ended(&drain(&mut events), "short-a"), Some(TrackEndReason::Finished));
    }

    #[tokio::test]
    async fn exhausted_queue_releases_the_transport() {
        let h = harness(FakeConnector::joinable(1));
        let mut events = h.registry.subscribe();

        h.registry
            .enqueue(
                &h.room,
                vec![track("short-a"), track("short-b")],
                QueuePosition::Last,
                caller(),
            )
            .await
            .unwrap();

        assert!(wait_until(|| h.registry.rooms().is_empty()).await);
        assert!(h.connector.all_released());
        assert_eq!(h.registry.now_playing(&h.room), None);

        let events = drain(&mut events);
        assert_eq!(ended(&events, "short-a"), Some(TrackEndReason::Finished));
        assert_eq!(ended(&events, "short-b"), Some(TrackEndReason::Finished));
        assert!(matches!(events.last(), Some(RoomEvent::QueueFinished { .. })));
    }

    #[tokio::test]
    async fn launch_failure_is_reported_and_the_queue_advances() {
        let h = harness(FakeConnector::joinable(1));
        let mut events = h.registry.subscribe();

        h.registry
            .enqueue(
                &h.room,
                vec![track("fail-a"), track("b")],
                QueuePosition::Last,
                caller(),
            )
            .await
            .unwrap();

        assert!(
            wait_until(|| h.registry.now_playing(&h.room).map(|t| t.id)
                == Some("b".to_string()))
            .await
        );
        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            RoomEvent::TrackException { track, message, .. }
                if track.id == "fail-a" && message.contains("could not play")
        )));
        assert_eq!(ended(&events, "fail-a"), Some(TrackEndReason::LoadFailed));
    }

    #[tokio::test]
    async fn pause_holds_the_feed_and_resume_continues() {
        let h = harness(FakeConnector::joinable(1));
        h.registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, caller())
            .await
            .unwrap();
        let transport = h.connector.last().unwrap();
        assert!(wait_until(|| transport.sent.load(Ordering::SeqCst) > 2).await);

        h.registry.pause(&h.room).await.unwrap();
        assert_eq!(h.registry.snapshot(&h.room).state, RoomState::Paused);
        assert!(transport.paused.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let held = transport.sent.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(transport.sent.load(Ordering::SeqCst), held);
        assert_eq!(h.streamer.live.load(Ordering::SeqCst), 1);

        h.registry.resume(&h.room).await.unwrap();
        assert_eq!(h.registry.snapshot(&h.room).state, RoomState::Playing);
        assert!(!transport.paused.load(Ordering::SeqCst));
        assert!(wait_until(|| transport.sent.load(Ordering::SeqCst) > held).await);
    }

    #[tokio::test]
    async fn disconnect_keeps_the_queue_for_start() {
        let h = harness(FakeConnector::joinable(1));
        h.registry
            .enqueue(
                &h.room,
                vec![track("a"), track("b")],
                QueuePosition::Last,
                caller(),
            )
            .await
            .unwrap();

        h.registry.disconnect(&h.room).await.unwrap();
        let snapshot = h.registry.snapshot(&h.room);
        assert_eq!(snapshot.state, RoomState::Idle);
        assert_eq!(snapshot.now_playing, None);
        assert_eq!(ids(&snapshot.queue), ["b"]);
        assert!(wait_until(|| h.connector.all_released()).await);

        assert!(matches!(
            h.registry.start(&h.room, None).await,
            Err(PlayerError::TransportUnavailable(_))
        ));
        h.registry.start(&h.room, caller()).await.unwrap();
        assert_eq!(h.registry.now_playing(&h.room).map(|t| t.id), Some("b".to_string()));
        assert_eq!(h.connector.connects(), 2);
    }

    #[tokio::test]
    async fn transport_loss_goes_idle_and_keeps_the_queue() {
        let h = harness(FakeConnector {
            joinable: vec![ChannelId(1)],
            fail_after: Some(2),
            ..Default::default()
        });
        let mut events = h.registry.subscribe();

        h.registry
            .enqueue(
                &h.room,
                vec![track("a"), track("b")],
                QueuePosition::Last,
                caller(),
            )
            .await
            .unwrap();

        assert!(wait_until(|| h.registry.snapshot(&h.room).state == RoomState::Idle).await);
        assert_eq!(ids(&h.registry.queue_of(&h.room)), ["b"]);
        assert!(wait_until(|| h.connector.all_released()).await);
        assert_eq!(ended(&drain(&mut events), "a"), Some(TrackEndReason::Disconnected));
    }

    #[tokio::test]
    async fn commands_on_unknown_rooms_do_not_create_them() {
        let h = harness(FakeConnector::joinable(1));
        assert_eq!(h.registry.skip(&h.room).await, Err(PlayerError::NothingPlaying));
        assert_eq!(h.registry.pause(&h.room).await, Err(PlayerError::NothingPlaying));
        assert_eq!(h.registry.disconnect(&h.room).await, Err(PlayerError::NotConnected));
        assert!(h.registry.rooms().is_empty());
    }

    #[tokio::test]
    async fn a_stalled_room_does_not_delay_another() {
        let h = harness(FakeConnector::joinable(1));
        let other = RoomId::from("guild-2");

        h.registry
            .enqueue(&h.room, vec![track("stall-a")], QueuePosition::Last, caller())
            .await
            .unwrap();

        let quick = tokio::time::timeout(
            Duration::from_secs(1),
            h.registry
                .enqueue(&other, vec![track("b")], QueuePosition::Last, caller()),
        )
        .await;
        assert!(matches!(quick, Ok(Ok(_))));
        assert!(wait_until(|| h.streamer.live.load(Ordering::SeqCst) == 1).await);

        // Skipping interrupts the stalled open promptly.
        let skipped = tokio::time::timeout(Duration::from_secs(1), h.registry.skip(&h.room)).await;
        assert!(matches!(skipped, Ok(Ok(_))));

        assert!(wait_until(|| h.registry.rooms().len() == 1).await);
        assert_eq!(h.registry.rooms()[0].room_id, other);
    }

    #[tokio::test]
    async fn shutdown_releases_everything() {
        let h = harness(FakeConnector::joinable(1));
        h.registry
            .enqueue(&h.room, vec![track("a"), track("b")], QueuePosition::Last, caller())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), h.registry.shutdown())
            .await
            .unwrap();
        assert!(h.connector.all_released());
        assert!(h.registry.rooms().is_empty());
        assert!(wait_until(|| h.streamer.live.load(Ordering::SeqCst) == 0).await);
    }

    #[tokio::test]
    async fn empty_enqueue_is_rejected() {
        let h = harness(FakeConnector::joinable(1));
        let result = h
            .registry
            .enqueue(&h.room, Vec::new(), QueuePosition::Last, caller())
            .await;
        assert_eq!(result, Err(PlayerError::NothingQueued));
        assert!(h.registry.rooms().is_empty());
        assert_eq!(h.connector.connects(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn replies_follow_the_published_snapshot() {
        let h = harness(FakeConnector::joinable(1));
        for i in 0..100 {
            let queued = RoomId::from(format!("queued-{i}"));
            h.registry
                .enqueue(&queued, vec![track("a")], QueuePosition::Last, None)
                .await
                .unwrap();
            assert_eq!(ids(&h.registry.queue_of(&queued)), ["a"]);

            let paused = RoomId::from(format!("paused-{i}"));
            h.registry
                .enqueue(&paused, vec![track("b")], QueuePosition::Last, caller())
                .await
                .unwrap();
            assert_eq!(h.registry.snapshot(&paused).state, RoomState::Playing);
            h.registry.pause(&paused).await.unwrap();
            assert_eq!(h.registry.snapshot(&paused).state, RoomState::Paused);
        }

        tokio::time::timeout(Duration::from_secs(5), h.registry.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn command_to_a_vanished_room_is_retried_on_a_fresh_one() {
        let h = harness(FakeConnector::joinable(1));
        h.registry.dead_spawns.store(1, Ordering::SeqCst);

        let receipt = h
            .registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, None)
            .await
            .unwrap();
        assert!(!receipt.started);

        assert_eq!(ids(&h.registry.queue_of(&h.room)), ["a"]);
        assert_eq!(h.registry.rooms.get(&h.room).map(|r| r.generation), Some(1));
    }

    #[tokio::test]
    async fn second_vanished_room_is_a_state_conflict() {
        let h = harness(FakeConnector::joinable(1));
        h.registry.dead_spawns.store(2, Ordering::SeqCst);

        let result = h
            .registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, caller())
            .await;
        assert_eq!(
            result,
            Err(PlayerError::ConcurrentStateConflict(h.room.clone()))
        );
        assert!(h.registry.rooms().is_empty());
        assert_eq!(h.connector.connects(), 0);

        // The next command gets a working room again.
        h.registry
            .enqueue(&h.room, vec![track("a")], QueuePosition::Last, None)
            .await
            .unwrap();
        assert_eq!(ids(&h.registry.queue_of(&h.room)), ["a"]);
    }
}
