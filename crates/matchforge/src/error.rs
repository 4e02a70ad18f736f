use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchforgeError {
    #[error(transparent)]
    Transport(#[from] matchforge_transport::TransportError),
    #[error(transparent)]
    Protocol(#[from] matchforge_protocol::ProtocolError),
    #[error(transparent)]
    Room(#[from] matchforge_room::RoomError),
    #[error(transparent)]
    Relay(#[from] matchforge_relay::RelayError),
    #[error(transparent)]
    Store(#[from] matchforge_session::StoreError),
    #[error("config error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}
