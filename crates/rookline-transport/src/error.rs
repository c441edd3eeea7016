#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket is closed, or the listener behind `accept` has stopped.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The listener could not bind or accept.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}
