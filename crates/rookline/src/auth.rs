//! Authentication hook for establishing participant identity.
//!
//! Rookline doesn't verify credentials itself. The server calls an
//! [`Authenticator`] with the token from `hello` and trusts the
//! [`ParticipantId`] it returns for the rest of the connection.

use rookline_protocol::ParticipantId;

/// Why a `hello` token was refused.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token resolved to the identity reserved for the engine seat.
    #[error("participant id is reserved")]
    Reserved,
}

/// Validates a client's token and returns their identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use rookline::{AuthError, Authenticator};
/// use rookline_protocol::ParticipantId;
///
/// /// Everyone is participant 7.
/// struct Fixed;
///
/// impl Authenticator for Fixed {
///     async fn authenticate(&self, _token: &str) -> Result<ParticipantId, AuthError> {
///         Ok(ParticipantId(7))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns the caller's identity.
    ///
    /// Must never return [`ParticipantId::ENGINE`].
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<ParticipantId, AuthError>> + Send;
}

/// Uses the token, parsed as a number, as the participant id.
///
/// For local play and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<ParticipantId, AuthError> {
        let id: u64 = token
            .trim()
            .parse()
            .map_err(|_| AuthError::InvalidToken("token must be a number".into()))?;
        let participant = ParticipantId(id);
        if participant.is_engine() {
            return Err(AuthError::Reserved);
        }
        Ok(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_authenticator_parses_number() {
        let id = DevAuthenticator.authenticate(" 42 ").await.unwrap();
        assert_eq!(id, ParticipantId(42));
    }

    #[tokio::test]
    async fn test_dev_authenticator_rejects_garbage() {
        let err = DevAuthenticator.authenticate("alice").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_dev_authenticator_rejects_engine_id() {
        let err = DevAuthenticator.authenticate("0").await.unwrap_err();
        assert!(matches!(err, AuthError::Reserved));
    }
}
