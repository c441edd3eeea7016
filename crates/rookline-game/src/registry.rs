//! Who is connected, and how to reach them.
//!
//! Sessions never hold connections. Anything that wants to talk to a
//! participant looks them up here by id; a missing entry just means the
//! message is dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use rookline_protocol::{ParticipantId, ServerMessage};
use rookline_transport::ConnectionId;
use tokio::sync::mpsc;

/// Channel into a connection's outbound writer task.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

struct Handle {
    connection: ConnectionId,
    tx: Outbound,
}

/// Participant id → at most one live connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: Mutex<HashMap<ParticipantId, Handle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ParticipantId, Handle>> {
        self.handles.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers `connection` for `participant`, replacing any earlier one.
    /// Returns the replaced connection.
    pub fn register(
        &self,
        participant: ParticipantId,
        connection: ConnectionId,
        tx: Outbound,
    ) -> Option<ConnectionId> {
        let previous = self
            .lock()
            .insert(participant, Handle { connection, tx })
            .map(|h| h.connection);
        if let Some(old) = previous {
            tracing::debug!(%participant, %old, new = %connection, "connection replaced");
        }
        previous
    }

    /// Removes the entry only if it still belongs to `connection`.
    pub fn unregister(&self, participant: ParticipantId, connection: ConnectionId) -> bool {
        let mut handles = self.lock();
        if handles.get(&participant).is_some_and(|h| h.connection == connection) {
            handles.remove(&participant);
            true
        } else {
            false
        }
    }

    /// Best-effort delivery. `false` if the participant is not connected
    /// or their writer is gone.
    pub fn send(&self, participant: ParticipantId, msg: ServerMessage) -> bool {
        let handles = self.lock();
        match handles.get(&participant) {
            Some(h) => h.tx.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self, participant: ParticipantId) -> bool {
        self.lock().contains_key(&participant)
    }

    pub fn connection(&self, participant: ParticipantId) -> Option<ConnectionId> {
        self.lock().get(&participant).map(|h| h.connection)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> ParticipantId {
        ParticipantId(id)
    }

    #[test]
    fn test_register_replaces_previous_connection() {
        let reg = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        assert_eq!(reg.register(pid(1), ConnectionId::new(1), tx1), None);
        assert_eq!(
            reg.register(pid(1), ConnectionId::new(2), tx2),
            Some(ConnectionId::new(1))
        );

        assert!(reg.send(pid(1), ServerMessage::QueueWaiting));
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::QueueWaiting);
    }

    #[test]
    fn test_unregister_stale_connection_is_ignored() {
        let reg = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        reg.register(pid(1), ConnectionId::new(1), tx1);
        reg.register(pid(1), ConnectionId::new(2), tx2);

        assert!(!reg.unregister(pid(1), ConnectionId::new(1)));
        assert_eq!(reg.connection(pid(1)), Some(ConnectionId::new(2)));
        assert!(reg.unregister(pid(1), ConnectionId::new(2)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_send_to_absent_participant_is_false() {
        let reg = ConnectionRegistry::new();
        assert!(!reg.send(pid(9), ServerMessage::QueueWaiting));

        let (tx, rx) = mpsc::unbounded_channel();
        reg.register(pid(9), ConnectionId::new(1), tx);
        drop(rx);
        assert!(!reg.send(pid(9), ServerMessage::QueueWaiting));
    }
}
