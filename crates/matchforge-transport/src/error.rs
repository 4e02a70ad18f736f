/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Accepting a connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Writing to a peer failed.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Reading from a peer failed.
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// A peer declared a frame length below the 2-byte minimum.
    #[error("protocol violation: declared frame length {0}")]
    FrameTooShort(u16),
}
