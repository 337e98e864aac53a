//! Session coordination for the single room hosted by the process.
//!
//! [`RoomHub`] owns the [`Room`] together with the outbound queue of every
//! joined connection. Each operation runs as one critical section without any
//! `.await` inside, so appending a message and fanning it out is atomic with
//! respect to every other join, leave or message. Delivery uses `try_send`: a
//! member whose queue is full misses that event and nobody else waits.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use huddle_config::RoomConfig;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use super::relay::FileRelay;
use super::room::{CapacityChange, Room};
use crate::entities::{ConnectionId, NewMessage};
use crate::types::{ChatError, ChatResult, RoomSnapshot, ServerEvent};

/// Sending half of a connection's outbound queue
pub type Outbound = mpsc::Sender<ServerEvent>;

#[derive(Debug)]
struct HubInner {
    room: Room,
    sessions: HashMap<ConnectionId, Outbound>,
}

impl HubInner {
    fn broadcast(&self, event: &ServerEvent) {
        for (connection_id, outbound) in &self.sessions {
            deliver(*connection_id, outbound, event.clone());
        }
    }

    fn append_and_broadcast(&mut self, message: NewMessage) -> u64 {
        let logged = self.room.append(message);
        let sequence = logged.sequence;
        self.broadcast(&ServerEvent::Message { message: logged });
        sequence
    }
}

fn deliver(connection_id: ConnectionId, outbound: &Outbound, event: ServerEvent) {
    match outbound.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%connection_id, "outbound queue full, dropping event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(%connection_id, "outbound queue closed");
        }
    }
}

#[derive(Debug)]
pub struct RoomHub {
    inner: Mutex<HubInner>,
    relay: Arc<FileRelay>,
    outbound_buffer: usize,
    closing: watch::Sender<bool>,
}

impl RoomHub {
    pub fn new(config: &RoomConfig, relay: Arc<FileRelay>) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            inner: Mutex::new(HubInner {
                room: Room::new(config),
                sessions: HashMap::new(),
            }),
            relay,
            outbound_buffer: config.outbound_buffer.max(RoomConfig::MIN_OUTBOUND_BUFFER),
            closing,
        }
    }

    /// Capacity for per-connection outbound channels.
    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    pub fn relay(&self) -> &Arc<FileRelay> {
        &self.relay
    }

    /// Register a connection and start delivering room events to `outbound`.
    ///
    /// On success the joiner receives, in order: `welcome`, `history` with
    /// everything logged before it arrived, its own join message (broadcast to
    /// everyone) and, if it was elected, `capacity_prompt`. On error nothing is
    /// registered and the caller reports the error.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        requested_name: &str,
        remote_address: SocketAddr,
        outbound: Outbound,
    ) -> ChatResult<()> {
        let mut inner = self.inner.lock().await;
        let admission = inner
            .room
            .join(connection_id, requested_name, remote_address)?;

        let capacity = inner.room.capacity();
        let display_name = admission.member.display_name.clone();

        deliver(
            connection_id,
            &outbound,
            ServerEvent::Welcome {
                connection_id,
                display_name: display_name.clone(),
                capacity,
                is_admin: admission.elected_admin,
            },
        );
        deliver(
            connection_id,
            &outbound,
            ServerEvent::History {
                messages: inner.room.history(),
            },
        );

        inner.sessions.insert(connection_id, outbound.clone());
        inner.append_and_broadcast(NewMessage::system(format!("{display_name} has joined")));

        if admission.elected_admin {
            deliver(connection_id, &outbound, ServerEvent::CapacityPrompt { capacity });
        }

        info!(
            %connection_id,
            name = %display_name,
            %remote_address,
            members = inner.room.len(),
            capacity,
            "member joined"
        );
        Ok(())
    }

    /// Remove a connection. Safe to call for connections that never joined or
    /// already left; returns whether anything was removed.
    pub async fn leave(&self, connection_id: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(&connection_id);

        let Some(departure) = inner.room.leave(connection_id) else {
            return false;
        };

        let name = departure.member.display_name;
        inner.append_and_broadcast(NewMessage::system(format!("{name} has left")));
        info!(
            %connection_id,
            %name,
            was_admin = departure.was_admin,
            members = inner.room.len(),
            "member left"
        );
        true
    }

    /// Append a text message from a joined member and broadcast it.
    pub async fn post_text(&self, connection_id: ConnectionId, text: &str) -> ChatResult<u64> {
        let mut inner = self.inner.lock().await;
        let sender = inner
            .room
            .member(connection_id)
            .map(|member| member.display_name.clone())
            .ok_or(ChatError::NotJoined)?;

        Ok(inner.append_and_broadcast(NewMessage::text(sender, text)))
    }

    /// Announce a file previously stored through the relay.
    pub async fn share_file(&self, connection_id: ConnectionId, raw_key: &str) -> ChatResult<u64> {
        let handle = self.relay.resolve(raw_key).await?;

        let mut inner = self.inner.lock().await;
        let sender = inner
            .room
            .member(connection_id)
            .map(|member| member.display_name.clone())
            .ok_or(ChatError::NotJoined)?;

        debug!(%connection_id, key = %handle.storage_key, "file shared");
        Ok(inner.append_and_broadcast(NewMessage::file_share(sender, handle)))
    }

    /// Change room capacity. Requests from members other than the admin are
    /// dropped without telling the requester.
    pub async fn set_capacity(&self, connection_id: ConnectionId, value: i64) -> ChatResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.room.member(connection_id).is_none() {
            return Err(ChatError::NotJoined);
        }

        match inner.room.set_capacity(connection_id, value)? {
            CapacityChange::Applied(capacity) => {
                info!(%connection_id, capacity, members = inner.room.len(), "capacity changed");
                inner.broadcast(&ServerEvent::CapacityChanged { capacity });
            }
            CapacityChange::Ignored => {
                warn!(%connection_id, requested = value, "capacity change from non-admin ignored");
            }
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        self.inner.lock().await.room.snapshot()
    }

    pub async fn member_count(&self) -> usize {
        self.inner.lock().await.room.len()
    }

    /// Ask every connection loop to finish.
    pub fn close(&self) {
        self.closing.send_replace(true);
        info!("room hub closing");
    }

    pub fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    /// Resolves its `changed()` once [`close`](Self::close) is called.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ChatMessage, MessageKind};
    use huddle_config::UploadConfig;
    use tempfile::TempDir;

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<ServerEvent>,
        tx: Outbound,
    }

    impl Client {
        fn new() -> Self {
            Self::with_buffer(64)
        }

        fn with_buffer(buffer: usize) -> Self {
            let (tx, rx) = mpsc::channel(buffer);
            Self {
                id: ConnectionId::new(),
                rx,
                tx,
            }
        }

        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn messages(&mut self) -> Vec<ChatMessage> {
            self.drain()
                .into_iter()
                .filter_map(|event| match event {
                    ServerEvent::Message { message } => Some(message),
                    _ => None,
                })
                .collect()
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn hub(capacity: usize) -> (RoomHub, TempDir) {
        let dir = TempDir::new().unwrap();
        let relay = FileRelay::open(&UploadConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            max_bytes: 1024,
            max_files: 10,
        })
        .await
        .unwrap();
        let config = RoomConfig {
            capacity,
            ..RoomConfig::default()
        };
        (RoomHub::new(&config, Arc::new(relay)), dir)
    }

    async fn join(hub: &RoomHub, client: &Client, name: &str) -> ChatResult<()> {
        hub.join(client.id, name, addr(), client.tx.clone()).await
    }

    #[tokio::test]
    async fn join_delivers_welcome_history_join_message_and_prompt() {
        let (hub, _dir) = hub(4).await;
        let mut a = Client::new();
        join(&hub, &a, "alice").await.unwrap();

        let events = a.drain();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ServerEvent::Welcome { is_admin: true, capacity: 4, .. }));
        assert_eq!(events[1], ServerEvent::History { messages: vec![] });
        match &events[2] {
            ServerEvent::Message { message } => {
                assert_eq!(message.kind, MessageKind::System);
                assert_eq!(message.body, "alice has joined");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(events[3], ServerEvent::CapacityPrompt { capacity: 4 });
    }

    #[tokio::test]
    async fn room_scenario() {
        let (hub, _dir) = hub(3).await;
        let mut a = Client::new();
        let mut b = Client::new();
        let c = Client::new();

        join(&hub, &a, "A").await.unwrap();
        hub.set_capacity(a.id, 2).await.unwrap();
        a.drain();

        join(&hub, &b, "B").await.unwrap();
        let events = b.drain();
        assert!(matches!(events[0], ServerEvent::Welcome { is_admin: false, capacity: 2, .. }));
        match &events[1] {
            ServerEvent::History { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].body, "A has joined");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let rejected = join(&hub, &c, "C").await.unwrap_err();
        assert!(matches!(rejected, ChatError::RoomFull { capacity: 2 }));

        let before = hub.snapshot().await.next_sequence;
        let sequence = hub.post_text(a.id, "hi").await.unwrap();
        assert_eq!(sequence, before);
        let received = b.messages();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "hi");
        assert_eq!(received[0].sequence, sequence);
        assert_eq!(received[0].sender.as_ref().map(|s| s.as_str()), Some("A"));

        assert!(hub.leave(a.id).await);
        assert_eq!(hub.snapshot().await.admin, None);
        b.drain();

        hub.post_text(b.id, "still here").await.unwrap();
        let own = b.messages();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].body, "still here");
    }

    #[tokio::test]
    async fn admin_vacancy_is_filled_by_next_joiner() {
        let (hub, _dir) = hub(4).await;
        let a = Client::new();
        let mut b = Client::new();
        let mut c = Client::new();

        join(&hub, &a, "a").await.unwrap();
        join(&hub, &b, "b").await.unwrap();
        hub.leave(a.id).await;
        b.drain();

        // b is not promoted and cannot change capacity
        hub.set_capacity(b.id, 1).await.unwrap();
        assert_eq!(hub.snapshot().await.capacity, 4);
        assert!(!b.drain().iter().any(|e| matches!(e, ServerEvent::CapacityChanged { .. })));

        join(&hub, &c, "c").await.unwrap();
        assert!(c.drain().contains(&ServerEvent::CapacityPrompt { capacity: 4 }));
        assert_eq!(hub.snapshot().await.admin, Some(c.id));

        hub.set_capacity(c.id, 6).await.unwrap();
        assert!(b.drain().contains(&ServerEvent::CapacityChanged { capacity: 6 }));
    }

    #[tokio::test]
    async fn invalid_capacity_from_admin_is_an_error() {
        let (hub, _dir) = hub(4).await;
        let a = Client::new();
        join(&hub, &a, "a").await.unwrap();

        let error = hub.set_capacity(a.id, 0).await.unwrap_err();
        assert_eq!(error.code(), "invalid_capacity");
        assert_eq!(hub.snapshot().await.capacity, 4);
    }

    #[tokio::test]
    async fn operations_before_join_are_rejected() {
        let (hub, _dir) = hub(4).await;
        let a = Client::new();

        assert!(matches!(hub.post_text(a.id, "x").await, Err(ChatError::NotJoined)));
        assert!(matches!(hub.set_capacity(a.id, 3).await, Err(ChatError::NotJoined)));
        assert!(!hub.leave(a.id).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_posts_get_unique_ordered_sequences() {
        let (hub, _dir) = hub(4).await;
        let hub = Arc::new(hub);
        let a = Client::with_buffer(512);
        let b = Client::with_buffer(512);
        let mut observer = Client::with_buffer(512);
        join(&hub, &a, "a").await.unwrap();
        join(&hub, &b, "b").await.unwrap();
        join(&hub, &observer, "observer").await.unwrap();
        observer.drain();

        let tasks: Vec<_> = [a.id, b.id]
            .into_iter()
            .map(|id| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        hub.post_text(id, &format!("m{i}")).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let sequences: Vec<u64> = observer.messages().iter().map(|m| m.sequence).collect();
        assert_eq!(sequences.len(), 100);
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));

        let mut late = Client::with_buffer(512);
        join(&hub, &late, "late").await.unwrap();
        let events = late.drain();
        match &events[1] {
            ServerEvent::History { messages } => {
                let replayed: Vec<u64> = messages.iter().map(|m| m.sequence).collect();
                assert!(replayed.windows(2).all(|w| w[0] < w[1]));
                assert!(replayed.ends_with(&sequences));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn shared_file_reaches_every_member() {
        let (hub, _dir) = hub(4).await;
        let mut a = Client::new();
        let mut b = Client::new();
        join(&hub, &a, "a").await.unwrap();
        join(&hub, &b, "b").await.unwrap();
        a.drain();
        b.drain();

        let handle = hub
            .relay()
            .store("photo.png", Some("image/png"), b"\x89PNG data")
            .await
            .unwrap();
        hub.share_file(a.id, &handle.storage_key.to_string())
            .await
            .unwrap();

        for client in [&mut a, &mut b] {
            let messages = client.messages();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].kind, MessageKind::FileShare);
            let shared = messages[0].file.clone().unwrap();
            assert_eq!(messages[0].body, shared.url());
            let (_, bytes) = hub.relay().retrieve(&shared.storage_key).await.unwrap();
            assert_eq!(&bytes[..], b"\x89PNG data");
        }

        let missing = hub.share_file(a.id, "nope").await.unwrap_err();
        assert_eq!(missing.code(), "file_not_found");
    }

    #[tokio::test]
    async fn full_queue_drops_only_for_that_member() {
        let (hub, _dir) = hub(4).await;
        let mut fast = Client::new();
        let mut slow = Client::with_buffer(RoomConfig::MIN_OUTBOUND_BUFFER);

        join(&hub, &fast, "fast").await.unwrap();
        join(&hub, &slow, "slow").await.unwrap();
        fast.drain();

        hub.post_text(fast.id, "one").await.unwrap();
        hub.post_text(fast.id, "two").await.unwrap();
        assert_eq!(fast.messages().len(), 2);

        // the join burst fits, the first broadcast after it does not
        let events = slow.drain();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ServerEvent::Welcome { is_admin: false, .. }));
        assert!(matches!(events[1], ServerEvent::History { ref messages } if messages.len() == 1));
        assert!(matches!(&events[2], ServerEvent::Message { message } if message.body == "slow has joined"));
        assert!(matches!(&events[3], ServerEvent::Message { message } if message.body == "one"));
    }

    #[tokio::test]
    async fn admin_receives_full_join_burst_with_minimum_buffer() {
        let (hub, _dir) = hub(4).await;
        let mut admin = Client::with_buffer(RoomConfig::MIN_OUTBOUND_BUFFER);

        join(&hub, &admin, "admin").await.unwrap();

        let events = admin.drain();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[1], ServerEvent::History { .. }));
        assert_eq!(events[3], ServerEvent::CapacityPrompt { capacity: 4 });
    }

    #[tokio::test]
    async fn outbound_buffer_is_clamped_to_join_burst() {
        let dir = TempDir::new().unwrap();
        let relay = FileRelay::open(&UploadConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            max_bytes: 1024,
            max_files: 10,
        })
        .await
        .unwrap();
        let config = RoomConfig {
            outbound_buffer: 1,
            ..RoomConfig::default()
        };

        let hub = RoomHub::new(&config, Arc::new(relay));
        assert_eq!(hub.outbound_buffer(), RoomConfig::MIN_OUTBOUND_BUFFER);
    }

    #[tokio::test]
    async fn close_notifies_watchers() {
        let (hub, _dir) = hub(4).await;
        let mut closing = hub.closing();
        assert!(!hub.is_closing());
        hub.close();
        closing.changed().await.unwrap();
        assert!(*closing.borrow());
    }
}
