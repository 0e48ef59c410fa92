pub use netpool_shared::{RecvError, SendError};

use netpool_shared::ClientId;

/// Used to send packets from the Server Socket
pub trait PacketSender {
    /// Sends a packet to the given Client
    fn send(&self, client: &ClientId, payload: &[u8]) -> Result<(), SendError>;
}

/// Used to receive packets from the Server Socket
pub trait PacketReceiver {
    /// Receives the next packet, if any, along with the Client it came from
    fn receive(&mut self) -> Result<Option<(ClientId, &[u8])>, RecvError>;
}
