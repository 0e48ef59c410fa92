use thiserror::Error;

use netpool_shared::{ClientId, PoolError, ProtocolError};

#[derive(Debug, Error)]
pub enum NetPoolServerError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Malformed packet from {client}: {source}")]
    Protocol {
        client: ClientId,
        source: ProtocolError,
    },

    #[error("Cannot encode packets for {client}: {source}")]
    Encode {
        client: ClientId,
        source: ProtocolError,
    },

    #[error("Cannot send packet to {client}")]
    SendError { client: ClientId },

    #[error("Transport failed while receiving packets")]
    RecvError,

    #[error("Received a packet from unknown client {client}")]
    UnknownClient { client: ClientId },

    #[error("Client {client} is already connected")]
    AlreadyConnected { client: ClientId },
}
