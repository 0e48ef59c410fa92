use thiserror::Error;

use netpool_shared::{PoolError, ProtocolError};

#[derive(Debug, Error)]
pub enum NetPoolClientError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Malformed packet from the server: {0}")]
    Protocol(ProtocolError),

    #[error("Cannot encode packets for the server: {0}")]
    Encode(ProtocolError),

    #[error("Cannot send packet to the server")]
    SendError,

    #[error("Transport failed while receiving packets")]
    RecvError,
}
