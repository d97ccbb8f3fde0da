use dashmap::DashMap;
use uuid::Uuid;

/// Identifier assigned to every WebSocket connection on upgrade.
pub type ConnectionId = Uuid;

/// What the server knows about a connection once it attached to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBinding {
    /// Session the connection belongs to.
    pub session_id: Uuid,
    /// Join code the connection used.
    pub code: String,
    /// Authenticated user, when a valid token was presented.
    pub user_id: Option<Uuid>,
    /// Player this connection speaks for, set after a successful join.
    pub player_id: Option<Uuid>,
}

/// Connection → binding lookup table.
///
/// Answers and host commands are attributed only through this table, never
/// through identifiers carried in client payloads.
#[derive(Debug, Default)]
pub struct PresenceManager {
    bindings: DashMap<ConnectionId, ConnectionBinding>,
}

impl PresenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly attached connection.
    pub fn bind(&self, connection_id: ConnectionId, binding: ConnectionBinding) {
        self.bindings.insert(connection_id, binding);
    }

    /// Attach a player to the connection. Returns `false` if the connection is gone.
    pub fn set_player(&self, connection_id: ConnectionId, player_id: Uuid) -> bool {
        match self.bindings.get_mut(&connection_id) {
            Some(mut binding) => {
                binding.player_id = Some(player_id);
                true
            }
            None => false,
        }
    }

    pub fn binding(&self, connection_id: ConnectionId) -> Option<ConnectionBinding> {
        self.bindings
            .get(&connection_id)
            .map(|binding| binding.value().clone())
    }

    /// Forget a connection, returning its last binding.
    pub fn unbind(&self, connection_id: ConnectionId) -> Option<ConnectionBinding> {
        self.bindings
            .remove(&connection_id)
            .map(|(_, binding)| binding)
    }

    /// Number of live connections attached to `session_id`.
    pub fn connections_in(&self, session_id: Uuid) -> usize {
        self.bindings
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(session_id: Uuid) -> ConnectionBinding {
        ConnectionBinding {
            session_id,
            code: "123456".into(),
            user_id: None,
            player_id: None,
        }
    }

    #[test]
    fn player_is_attached_to_existing_binding_only() {
        let presence = PresenceManager::new();
        let (connection, session, player) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(!presence.set_player(connection, player));

        presence.bind(connection, binding(session));
        assert!(presence.set_player(connection, player));
        assert_eq!(
            presence.binding(connection).and_then(|b| b.player_id),
            Some(player)
        );
    }

    #[test]
    fn unbind_removes_connection() {
        let presence = PresenceManager::new();
        let session = Uuid::new_v4();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        presence.bind(first, binding(session));
        presence.bind(second, binding(session));
        assert_eq!(presence.connections_in(session), 2);

        assert!(presence.unbind(first).is_some());
        assert!(presence.binding(first).is_none());
        assert_eq!(presence.connections_in(session), 1);
    }
}
