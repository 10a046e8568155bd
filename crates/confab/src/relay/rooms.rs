//! Conversation room membership.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::registry::{ConnectionHandle, ConnectionId};

#[derive(Default)]
struct Inner {
    /// Room id to its members' handles.
    by_room: HashMap<String, HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    /// Connection id to the rooms it sits in.
    by_conn: HashMap<ConnectionId, HashSet<String>>,
}

/// Bidirectional index of which connection is in which conversation room.
///
/// A single mutex guards both directions, so a join or leave lands in them
/// atomically and a membership snapshot never observes half an update. The
/// lock is only ever held for map operations, never across await points.
///
/// A room exists exactly as long as it has members: the first join creates
/// it, removing the last member erases it.
pub struct RoomIndex {
    inner: Mutex<Inner>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Add a connection to a room. Joining a room twice is a no-op.
    pub fn join(&self, conn: &Arc<ConnectionHandle>, room: &str) {
        let mut inner = self.inner.lock();
        inner
            .by_room
            .entry(room.to_string())
            .or_default()
            .insert(conn.id(), Arc::clone(conn));
        inner
            .by_conn
            .entry(conn.id())
            .or_default()
            .insert(room.to_string());
    }

    /// Remove a connection from a room. Unknown rooms and non-members are
    /// no-ops.
    pub fn leave(&self, conn_id: ConnectionId, room: &str) {
        let mut inner = self.inner.lock();
        Self::remove_membership(&mut inner, conn_id, room);
    }

    /// Remove a connection from every room it joined, returning the rooms
    /// it was removed from.
    pub fn purge_all(&self, conn_id: ConnectionId) -> Vec<String> {
        let mut inner = self.inner.lock();
        let Some(rooms) = inner.by_conn.remove(&conn_id) else {
            return Vec::new();
        };

        let mut left: Vec<String> = rooms.into_iter().collect();
        left.sort();
        for room in &left {
            if let Some(members) = inner.by_room.get_mut(room.as_str()) {
                members.remove(&conn_id);
                if members.is_empty() {
                    inner.by_room.remove(room.as_str());
                }
            }
        }
        left
    }

    /// Point-in-time copy of a room's members. Callers iterate the copy
    /// without holding the lock.
    pub fn members_of(&self, room: &str) -> Vec<Arc<ConnectionHandle>> {
        let inner = self.inner.lock();
        inner
            .by_room
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection currently sits in.
    pub fn rooms_of(&self, conn_id: ConnectionId) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .by_conn
            .get(&conn_id)
            .map(|rooms| {
                let mut rooms: Vec<String> = rooms.iter().cloned().collect();
                rooms.sort();
                rooms
            })
            .unwrap_or_default()
    }

    pub fn is_member(&self, conn_id: ConnectionId, room: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .by_room
            .get(room)
            .is_some_and(|members| members.contains_key(&conn_id))
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.inner.lock().by_room.len()
    }

    fn remove_membership(inner: &mut Inner, conn_id: ConnectionId, room: &str) {
        if let Some(members) = inner.by_room.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.by_room.remove(room);
            }
        }
        if let Some(rooms) = inner.by_conn.get_mut(&conn_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                inner.by_conn.remove(&conn_id);
            }
        }
    }
}

impl Default for RoomIndex {
    fn default() -> Self {
        Self::new()
    }
}
