pub use netpool_shared::{RecvError, SendError};

/// Used to send packets from the Client Socket
pub trait PacketSender {
    /// Sends a packet from the Client Socket
    fn send(&self, payload: &[u8]) -> Result<(), SendError>;
}

/// Used to receive packets from the Client Socket
pub trait PacketReceiver {
    /// Receives a packet from the Client Socket
    fn receive(&mut self) -> Result<Option<&[u8]>, RecvError>;
}
