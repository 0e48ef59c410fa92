//! Errors shared by the server and client packet transports.

/// The transport could not take an outgoing packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError;

/// The transport failed while polling for packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;
