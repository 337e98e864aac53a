//! The room aggregate: membership registry, admin election, capacity control
//! and the message log.
//!
//! `Room` is plain synchronous state. Callers serialize access to it (see
//! [`RoomHub`](super::hub::RoomHub)), which makes every method below atomic
//! with respect to every other.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use huddle_config::RoomConfig;
use tracing::{debug, info};

use crate::entities::{ChatMessage, ConnectionId, DisplayName, Member, NewMessage};
use crate::types::{ChatError, ChatResult, MemberSummary, RoomSnapshot};

/// Admin election state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    NoAdmin,
    HasAdmin(ConnectionId),
}

/// Result of an accepted join
#[derive(Debug, Clone)]
pub struct Admission {
    pub member: Member,
    /// True when this join filled an admin vacancy
    pub elected_admin: bool,
}

/// Result of removing a registered member
#[derive(Debug, Clone)]
pub struct Departure {
    pub member: Member,
    pub was_admin: bool,
}

/// Outcome of a capacity change request that did not fail validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityChange {
    Applied(usize),
    /// Requester is not the admin; nothing changed
    Ignored,
}

#[derive(Debug)]
pub struct Room {
    capacity: usize,
    admin: AdminState,
    members: HashMap<ConnectionId, Member>,
    /// Join order, used for stable listings
    join_order: Vec<ConnectionId>,
    log: VecDeque<ChatMessage>,
    history_limit: usize,
    next_sequence: u64,
    max_name_length: usize,
}

impl Room {
    pub fn new(config: &RoomConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            admin: AdminState::NoAdmin,
            members: HashMap::new(),
            join_order: Vec::new(),
            log: VecDeque::new(),
            history_limit: config.history_limit.max(1),
            next_sequence: 0,
            max_name_length: config.max_name_length.max(1),
        }
    }

    /// Register a connection.
    ///
    /// The admin check-and-set happens here, together with the insert, so two
    /// first joiners can never both be elected.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        requested_name: &str,
        remote_address: SocketAddr,
    ) -> ChatResult<Admission> {
        if self.members.contains_key(&connection_id) {
            return Err(ChatError::AlreadyJoined);
        }
        if self.members.len() >= self.capacity {
            return Err(ChatError::RoomFull {
                capacity: self.capacity,
            });
        }

        let display_name = DisplayName::parse(requested_name, self.max_name_length)?;
        let member = Member::new(connection_id, display_name, remote_address);

        self.members.insert(connection_id, member.clone());
        self.join_order.push(connection_id);

        let elected_admin = self.admin == AdminState::NoAdmin;
        if elected_admin {
            self.admin = AdminState::HasAdmin(connection_id);
            info!(%connection_id, name = %member.display_name, "admin elected");
        }

        Ok(Admission {
            member,
            elected_admin,
        })
    }

    /// Remove a connection. Returns `None` if it was not registered.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Option<Departure> {
        let member = self.members.remove(&connection_id)?;
        self.join_order.retain(|id| *id != connection_id);

        let was_admin = self.admin == AdminState::HasAdmin(connection_id);
        if was_admin {
            self.admin = AdminState::NoAdmin;
            info!(%connection_id, "admin left, seat is vacant");
        }

        Some(Departure { member, was_admin })
    }

    /// Apply an admin's capacity change.
    ///
    /// Non-admin requests are ignored regardless of the value. The admin gets
    /// `InvalidCapacity` for values below 1, and capacity stays unchanged.
    pub fn set_capacity(&mut self, requester: ConnectionId, value: i64) -> ChatResult<CapacityChange> {
        if self.admin != AdminState::HasAdmin(requester) {
            return Ok(CapacityChange::Ignored);
        }

        let capacity = usize::try_from(value)
            .ok()
            .filter(|capacity| *capacity >= 1)
            .ok_or(ChatError::InvalidCapacity { value })?;

        self.capacity = capacity;
        Ok(CapacityChange::Applied(capacity))
    }

    /// Assign the next sequence number and store the message.
    pub fn append(&mut self, message: NewMessage) -> ChatMessage {
        let logged = message.into_logged(self.next_sequence);
        self.next_sequence += 1;

        self.log.push_back(logged.clone());
        while self.log.len() > self.history_limit {
            if let Some(evicted) = self.log.pop_front() {
                debug!(sequence = evicted.sequence, "history limit reached, dropping oldest message");
            }
        }

        logged
    }

    /// Retained history, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.log.iter().cloned().collect()
    }

    pub fn member(&self, connection_id: ConnectionId) -> Option<&Member> {
        self.members.get(&connection_id)
    }

    /// Members in join order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.join_order.iter().filter_map(|id| self.members.get(id))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn admin(&self) -> AdminState {
        self.admin
    }

    pub fn is_admin(&self, connection_id: ConnectionId) -> bool {
        self.admin == AdminState::HasAdmin(connection_id)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let admin = match self.admin {
            AdminState::HasAdmin(id) => Some(id),
            AdminState::NoAdmin => None,
        };

        RoomSnapshot {
            capacity: self.capacity,
            admin,
            members: self
                .members()
                .map(|member| MemberSummary {
                    connection_id: member.connection_id,
                    display_name: member.display_name.clone(),
                    is_admin: admin == Some(member.connection_id),
                    joined_at: member.joined_at,
                })
                .collect(),
            history_len: self.log.len(),
            next_sequence: self.next_sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MessageKind;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn room(capacity: usize) -> Room {
        Room::new(&RoomConfig {
            capacity,
            history_limit: 5,
            max_name_length: 32,
            outbound_buffer: 16,
        })
    }

    #[test]
    fn first_join_elects_admin_once() {
        let mut room = room(4);
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        assert!(room.join(a, "alice", addr()).unwrap().elected_admin);
        assert!(!room.join(b, "bob", addr()).unwrap().elected_admin);
        assert_eq!(room.admin(), AdminState::HasAdmin(a));
    }

    #[test]
    fn join_beyond_capacity_is_rejected_until_someone_leaves() {
        let mut room = room(2);
        let a = ConnectionId::new();
        room.join(a, "a", addr()).unwrap();
        room.join(ConnectionId::new(), "b", addr()).unwrap();

        let error = room.join(ConnectionId::new(), "c", addr()).unwrap_err();
        assert!(matches!(error, ChatError::RoomFull { capacity: 2 }));

        room.leave(a);
        assert!(room.join(ConnectionId::new(), "c", addr()).is_ok());
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let mut room = room(4);
        let a = ConnectionId::new();
        room.join(a, "a", addr()).unwrap();
        assert!(matches!(room.join(a, "again", addr()), Err(ChatError::AlreadyJoined)));
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn invalid_name_does_not_register_or_elect() {
        let mut room = room(4);
        let a = ConnectionId::new();
        assert!(room.join(a, "   ", addr()).is_err());
        assert!(room.is_empty());
        assert_eq!(room.admin(), AdminState::NoAdmin);
    }

    #[test]
    fn leave_is_idempotent_and_vacates_admin() {
        let mut room = room(4);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        room.join(a, "a", addr()).unwrap();
        room.join(b, "b", addr()).unwrap();

        let departure = room.leave(a).unwrap();
        assert!(departure.was_admin);
        assert_eq!(room.admin(), AdminState::NoAdmin);
        assert!(room.leave(a).is_none());

        // remaining members are not promoted; the next joiner is
        let c = ConnectionId::new();
        assert!(room.join(c, "c", addr()).unwrap().elected_admin);
        assert!(room.is_admin(c));
        assert!(!room.is_admin(b));
    }

    #[test]
    fn capacity_changes_are_admin_only() {
        let mut room = room(4);
        let admin = ConnectionId::new();
        let other = ConnectionId::new();
        room.join(admin, "admin", addr()).unwrap();
        room.join(other, "other", addr()).unwrap();

        assert_eq!(room.set_capacity(other, 10).unwrap(), CapacityChange::Ignored);
        assert_eq!(room.capacity(), 4);

        // non-admins are ignored even with invalid values
        assert_eq!(room.set_capacity(other, -1).unwrap(), CapacityChange::Ignored);

        assert!(matches!(
            room.set_capacity(admin, 0),
            Err(ChatError::InvalidCapacity { value: 0 })
        ));
        assert!(room.set_capacity(admin, -3).is_err());
        assert_eq!(room.capacity(), 4);

        assert_eq!(room.set_capacity(admin, 2).unwrap(), CapacityChange::Applied(2));
        assert_eq!(room.capacity(), 2);
        assert!(room.join(ConnectionId::new(), "third", addr()).is_err());
    }

    #[test]
    fn append_assigns_increasing_sequences_and_bounds_history() {
        let mut room = room(4);
        for i in 0..7 {
            let logged = room.append(NewMessage::system(format!("event {i}")));
            assert_eq!(logged.sequence, i);
        }

        let history = room.history();
        assert_eq!(history.len(), 5);
        assert_eq!(history.first().unwrap().sequence, 2);
        assert_eq!(history.last().unwrap().sequence, 6);
        assert!(history.iter().all(|m| m.kind == MessageKind::System));
        assert_eq!(room.snapshot().next_sequence, 7);
    }

    #[test]
    fn snapshot_lists_members_in_join_order() {
        let mut room = room(4);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        room.join(a, "a", addr()).unwrap();
        room.join(b, "b", addr()).unwrap();

        let snapshot = room.snapshot();
        let ids: Vec<_> = snapshot.members.iter().map(|m| m.connection_id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(snapshot.admin, Some(a));
        assert!(snapshot.members[0].is_admin);
    }
}
