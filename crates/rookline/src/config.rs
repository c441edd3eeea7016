use std::time::Duration;

/// Listener and per-connection settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to. Port 0 picks a free port.
    pub bind: String,
    /// Deadline for the WebSocket upgrade, and then again for `hello`.
    pub handshake_timeout: Duration,
    /// A connection that sends nothing (not even `heartbeat`) for this long
    /// is dropped and its seat marked away.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        }
    }
}
