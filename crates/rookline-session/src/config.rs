use std::time::Duration;

/// Settings for [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Checkpoint to the durable store every this many applied moves.
    pub checkpoint_every: usize,
    /// A rebuild that follows an outage longer than this credits `grace`.
    pub buffer_threshold: Duration,
    /// Credit added to both clocks after a long outage.
    pub grace: Duration,
    /// Lifetime of a participant → session pointer.
    pub pointer_ttl: Duration,
    /// How long a finished session whose terminal write failed lingers in
    /// the volatile store for the retry loop.
    pub finished_ttl: Duration,
    /// Number of volatile-store shards.
    pub shards: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 5,
            buffer_threshold: Duration::from_secs(10),
            grace: Duration::from_secs(5),
            pointer_ttl: Duration::from_secs(60 * 60),
            finished_ttl: Duration::from_secs(5 * 60),
            shards: 16,
        }
    }
}
