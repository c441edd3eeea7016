//! Draw offers.
//!
//! Each participant has an offer counter that only goes up, even for an
//! offer refused over the cap. One offer can be pending at a time; a move
//! withdraws it.

use rookline_protocol::{
    Color, EndReason, GameMode, GameResult, ParticipantId, ServerMessage, SessionId,
    SessionStatus,
};
use rookline_session::GameSession;
use tracing::{debug, info};

use crate::{GameCore, GameError};

enum Offer {
    Made { count: u32, session: GameSession },
    OverCap { count: u32 },
}

impl GameCore {
    fn require_active(session: &GameSession) -> Result<(), GameError> {
        if session.status != SessionStatus::Active {
            return Err(GameError::SessionNotActive {
                session: session.id,
                status: session.status,
            });
        }
        Ok(())
    }

    /// Handles `draw.offer`.
    ///
    /// # Errors
    /// `Validation` against the engine, `SessionNotActive`, and
    /// `DrawOfferLimit` once the participant has used up their offers.
    pub async fn offer_draw(
        &self,
        participant: ParticipantId,
        id: SessionId,
    ) -> Result<(), GameError> {
        let (session, color) = self.load_seated(id, participant).await?;
        if session.mode == GameMode::PlayerVsEngine {
            return Err(GameError::Validation(
                "draw offers are not available against the engine".into(),
            ));
        }

        let cap = self.inner.config.draw_offer_cap;
        let offer = self
            .inner
            .store
            .update(id, |s| -> Result<Offer, GameError> {
                Self::require_active(s)?;
                let slot = &mut s.draw_offers[color.index()];
                *slot = slot.saturating_add(1);
                let count = *slot;
                if count > cap {
                    return Ok(Offer::OverCap { count });
                }
                s.pending_draw_offer = Some(color);
                Ok(Offer::Made {
                    count,
                    session: s.clone(),
                })
            })
            .ok_or(GameError::NotFound(id))??;

        match offer {
            Offer::OverCap { count } => {
                debug!(session_id = %id, %participant, count, cap, "draw offer over the cap");
                Err(GameError::DrawOfferLimit { count })
            }
            Offer::Made { count, session } => {
                self.notify(
                    &session,
                    color.opposite(),
                    ServerMessage::DrawOffered {
                        session_id: id,
                        by: color,
                        count,
                    },
                );
                info!(session_id = %id, %participant, count, "draw offered");
                Ok(())
            }
        }
    }

    /// Handles `draw.accept`: ends the game drawn by agreement.
    ///
    /// # Errors
    /// `SessionNotActive`, or `Validation` if the opponent has no offer
    /// pending.
    pub async fn accept_draw(
        &self,
        participant: ParticipantId,
        id: SessionId,
    ) -> Result<(), GameError> {
        let (session, color) = self.load_seated(id, participant).await?;
        Self::require_active(&session)?;

        let offered_by = color.opposite();
        let accepted = self
            .finalize_when(id, GameResult::draw(EndReason::Agreed), |s| {
                s.status == SessionStatus::Active && s.pending_draw_offer == Some(offered_by)
            })
            .await?;
        if accepted {
            return Ok(());
        }

        // Tell the caller why, from a fresh read.
        let session = self.load(id).await?;
        Self::require_active(&session)?;
        Err(no_pending_offer(offered_by))
    }

    /// Handles `draw.reject`: withdraws the opponent's offer and tells both
    /// seats. Clocks, counters and status are untouched.
    ///
    /// # Errors
    /// `SessionNotActive`, or `Validation` if the opponent has no offer
    /// pending.
    pub async fn reject_draw(
        &self,
        participant: ParticipantId,
        id: SessionId,
    ) -> Result<(), GameError> {
        let (_, color) = self.load_seated(id, participant).await?;
        let offered_by = color.opposite();

        let session = self
            .inner
            .store
            .update(id, |s| -> Result<GameSession, GameError> {
                Self::require_active(s)?;
                if s.pending_draw_offer != Some(offered_by) {
                    return Err(no_pending_offer(offered_by));
                }
                s.pending_draw_offer = None;
                Ok(s.clone())
            })
            .ok_or(GameError::NotFound(id))??;

        self.notify_both(
            &session,
            ServerMessage::DrawRejected {
                session_id: id,
                by: color,
            },
        );
        info!(session_id = %id, %participant, "draw rejected");
        Ok(())
    }
}

fn no_pending_offer(from: Color) -> GameError {
    GameError::Validation(format!("no draw offer pending from {from}"))
}
