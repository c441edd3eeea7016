//! The matchmaking queue seam.

use std::collections::VecDeque;
use std::sync::Mutex;

use rookline_protocol::ParticipantId;

/// Participants waiting for a player-vs-player partner.
///
/// Pairing strategy is up to the implementation; the game core only asks
/// for "someone other than me".
pub trait MatchmakingQueue: Send + Sync + 'static {
    /// Adds `participant`. `false` if already queued.
    fn enqueue(&self, participant: ParticipantId) -> bool;

    /// Takes the longest-waiting participant other than `participant`.
    fn dequeue_oldest_other_than(&self, participant: ParticipantId) -> Option<ParticipantId>;

    /// `false` if `participant` was not queued.
    fn remove(&self, participant: ParticipantId) -> bool;
}

/// First-in, first-out queue in memory.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    waiting: Mutex<VecDeque<ParticipantId>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ParticipantId>> {
        self.waiting.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl MatchmakingQueue for MemoryQueue {
    fn enqueue(&self, participant: ParticipantId) -> bool {
        let mut waiting = self.lock();
        if waiting.contains(&participant) {
            return false;
        }
        waiting.push_back(participant);
        true
    }

    fn dequeue_oldest_other_than(&self, participant: ParticipantId) -> Option<ParticipantId> {
        let mut waiting = self.lock();
        let idx = waiting.iter().position(|p| *p != participant)?;
        waiting.remove(idx)
    }

    fn remove(&self, participant: ParticipantId) -> bool {
        let mut waiting = self.lock();
        let before = waiting.len();
        waiting.retain(|p| *p != participant);
        waiting.len() != before
    }
}
