use std::time::Duration;

use rookline_tick::TickerConfig;

/// Game rules that belong to the server rather than the rules engine.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Offers per participant per session before further offers are refused.
    pub draw_offer_cap: u32,
    /// Clock per side when `session.start` does not say otherwise.
    pub initial_clock: Duration,
    /// Strength passed to the oracle when the client does not pick one.
    pub default_difficulty: u8,
    pub oracle_timeout: Duration,
    /// How long a disconnected seat may stay away before the game is
    /// scored as abandoned.
    pub reconnect_grace: Duration,
    /// Longest chat message, in characters, after trimming.
    pub max_chat_len: usize,
    /// Compare-and-swap attempts for one move before giving up.
    pub move_retry_limit: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            draw_offer_cap: 3,
            initial_clock: Duration::from_secs(600),
            default_difficulty: 3,
            oracle_timeout: Duration::from_secs(5),
            reconnect_grace: Duration::from_secs(60),
            max_chat_len: 500,
            move_retry_limit: 8,
        }
    }
}

/// Shared clock scheduler settings.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub tick: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }
}

impl ClockConfig {
    pub(crate) fn ticker(&self) -> TickerConfig {
        TickerConfig::every(self.tick)
    }
}
