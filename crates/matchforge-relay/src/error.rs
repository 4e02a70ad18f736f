use thiserror::Error;

use matchforge_protocol::ProtocolError;
use matchforge_transport::SessionId;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("relay session {0} has not logged in")]
    NotLoggedIn(SessionId),
}
