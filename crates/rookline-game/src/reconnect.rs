//! Reconnection and connection loss.
//!
//! A participant's session is found through their pointer, never through
//! the connection. Resuming is idempotent: the same participant resuming
//! twice gets the same snapshot twice, and the opponent hears about it
//! only when the seat had actually been marked away.

use rookline_protocol::{ParticipantId, ServerMessage, SessionId, SessionStatus};
use rookline_transport::ConnectionId;
use tracing::{debug, info};

use crate::{GameCore, GameError, Outbound};

impl GameCore {
    /// Handles `session.reconnect`: registers the new connection, then
    /// resumes the participant's session.
    ///
    /// # Errors
    /// [`GameError::ReconnectUnavailable`] if there is no live session to
    /// resume.
    pub async fn reconnect(
        &self,
        participant: ParticipantId,
        connection: ConnectionId,
        tx: Outbound,
    ) -> Result<SessionId, GameError> {
        self.attach(participant, connection, tx);
        self.resume(participant)
            .await?
            .ok_or(GameError::ReconnectUnavailable(participant))
    }

    /// Sends the participant a snapshot of their live session, if any,
    /// and marks their seat present again.
    ///
    /// `Ok(None)` means there was nothing to resume. A stale pointer (to a
    /// finished or vanished session) is cleared on the way.
    ///
    /// # Errors
    /// [`GameError::Store`] if the durable store cannot be read.
    pub async fn resume(&self, participant: ParticipantId) -> Result<Option<SessionId>, GameError> {
        let Some(id) = self.inner.store.pointer(participant) else {
            debug!(%participant, "no session pointer");
            return Ok(None);
        };

        let live = self
            .inner
            .store
            .get(id)
            .await?
            .filter(|s| !s.status.is_terminal())
            .and_then(|s| s.color_of(participant));
        let Some(color) = live else {
            self.inner.store.unbind(participant, id);
            debug!(%participant, session_id = %id, "stale pointer cleared");
            return Ok(None);
        };

        let Some((was_away, session)) = self
            .inner
            .store
            .update(id, |s| (s.mark_back(color), s.clone()))
        else {
            return Ok(None);
        };

        self.inner.store.bind(participant, id);
        if session.status.is_in_play() {
            self.inner.store.activate(id);
            self.ensure_scheduler();
        }

        self.send_snapshot(&session, color);
        if was_away {
            self.notify(
                &session,
                color.opposite(),
                ServerMessage::OpponentReconnected {
                    session_id: id,
                    participant_id: participant,
                },
            );
            info!(session_id = %id, %participant, %color, "participant back");
        } else {
            debug!(session_id = %id, %participant, "resume of a present seat");
        }

        if session.status == SessionStatus::Active && session.is_oracle_turn() {
            self.request_oracle_move(id);
        }
        Ok(Some(id))
    }

    /// Handles a closed connection.
    ///
    /// Nothing happens if `connection` was already replaced by a newer
    /// one. Otherwise the participant leaves the matchmaking queue and, in
    /// a running game, their seat is marked away.
    pub fn disconnect(&self, participant: ParticipantId, connection: ConnectionId) {
        if !self.inner.registry.unregister(participant, connection) {
            debug!(%participant, %connection, "superseded connection closed");
            return;
        }
        if self.inner.queue.remove(participant) {
            debug!(%participant, "left the matchmaking queue");
        }

        let Some(id) = self.inner.store.pointer(participant) else {
            return;
        };
        let now = self.now_ms();
        let marked = self
            .inner
            .store
            .update(id, |s| {
                let color = s.color_of(participant)?;
                (s.status.is_in_play() && s.mark_away(color, now)).then(|| (color, s.clone()))
            })
            .flatten();

        if let Some((color, session)) = marked {
            self.notify(
                &session,
                color.opposite(),
                ServerMessage::OpponentDisconnected {
                    session_id: id,
                    participant_id: participant,
                },
            );
            info!(session_id = %id, %participant, %color, "participant away");
        }
    }
}
