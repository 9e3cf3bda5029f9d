//! Live fan-out of committed messages to connected clients.
//!
//! Every connection owns one unbounded queue drained by a single writer task,
//! so events reach a connection in the order they were enqueued. Posting into
//! a room holds that room's [`Broadcaster::sequence`] lock across commit and
//! broadcast, which makes enqueue order equal commit order per room.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use uuid::Uuid;

use crate::db::Message;

pub type ConnectionId = u64;

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LiveEvent {
    ReceiveMessage { message: Message },
    MessageEdited { message: Message },
    #[serde(rename_all = "camelCase")]
    Joined { room_id: Uuid },
    Error { kind: String, message: String },
}

/// Client → server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: Uuid },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        room_id: Uuid,
        kind: Option<String>,
        content: Option<String>,
    },
}

/// One connected client session.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: String,
    tx: mpsc::UnboundedSender<LiveEvent>,
    rooms: HashSet<Uuid>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn rooms(&self) -> &HashSet<Uuid> {
        &self.rooms
    }

    /// Queues an event for this connection only.
    pub fn notify(&self, event: LiveEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Default)]
pub struct Broadcaster {
    rooms: DashMap<Uuid, HashMap<ConnectionId, mpsc::UnboundedSender<LiveEvent>>>,
    sequencers: DashMap<Uuid, Arc<Mutex<()>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, user_id: impl Into<String>) -> (Connection, mpsc::UnboundedReceiver<LiveEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            user_id: user_id.into(),
            tx,
            rooms: HashSet::new(),
        };
        tracing::debug!(conn = conn.id, user = %conn.user_id, "live connection opened");
        (conn, rx)
    }

    /// Registers `conn` under `room_id`. Returns false if it was already there.
    pub fn join(&self, conn: &mut Connection, room_id: Uuid) -> bool {
        if !conn.rooms.insert(room_id) {
            return false;
        }
        self.rooms
            .entry(room_id)
            .or_default()
            .insert(conn.id, conn.tx.clone());
        true
    }

    pub fn leave(&self, conn: &mut Connection, room_id: Uuid) -> bool {
        if !conn.rooms.remove(&room_id) {
            return false;
        }
        self.unregister(conn.id, room_id);
        true
    }

    /// Delivers `event` to every connection joined to `room_id` right now.
    /// Returns how many connections accepted it.
    pub fn broadcast(&self, room_id: Uuid, event: &LiveEvent) -> usize {
        let Some(mut members) = self.rooms.get_mut(&room_id) else {
            return 0;
        };

        let before = members.len();
        members.retain(|_, tx| tx.send(event.clone()).is_ok());
        let delivered = members.len();
        if delivered < before {
            tracing::debug!(%room_id, dropped = before - delivered, "pruned closed live connections");
        }
        delivered
    }

    pub fn disconnect(&self, conn: Connection) {
        for room_id in &conn.rooms {
            self.unregister(conn.id, *room_id);
        }
        tracing::debug!(conn = conn.id, user = %conn.user_id, "live connection closed");
    }

    /// Forgets every registration under a deleted room.
    pub fn close_room(&self, room_id: Uuid) {
        self.rooms.remove(&room_id);
        self.sequencers.remove(&room_id);
    }

    pub fn member_count(&self, room_id: Uuid) -> usize {
        self.rooms.get(&room_id).map_or(0, |members| members.len())
    }

    /// Per-room ordering lock held across a message commit and its broadcast.
    pub async fn sequence(&self, room_id: Uuid) -> SequenceGuard<'_> {
        let lock = self
            .sequencers
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SequenceGuard {
            guard: Some(lock.lock_owned().await),
            sequencers: &self.sequencers,
            room_id,
        }
    }

    fn unregister(&self, conn_id: ConnectionId, room_id: Uuid) {
        self.rooms.remove_if_mut(&room_id, |_, members| {
            members.remove(&conn_id);
            members.is_empty()
        });
    }
}

/// Holds a room's ordering lock. The room's entry is dropped once nobody else
/// holds or waits on it.
pub struct SequenceGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    sequencers: &'a DashMap<Uuid, Arc<Mutex<()>>>,
    room_id: Uuid,
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // waiters hold a clone, so only the map's own reference means idle
        self.sequencers.remove_if(&self.room_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
