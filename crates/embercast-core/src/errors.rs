use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbercastError {
    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },

    #[error("Frame too large: {len} bytes")]
    FrameTooLarge { len: usize },

    #[error("Handshake rejected: {reason}")]
    HandshakeRejected { reason: String },

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },
}
