use std::fmt;

use naia_serde::{BitReader, BitWrite, BitWriter, Serde, SerdeErr, MTU_SIZE_BITS};

use crate::{
    archetype::Archetype,
    error::{PoolError, ProtocolError},
    gameplay::SpawnContext,
    replication::{ReplicationDelta, SnapshotChunk},
    types::{de_variant, ser_variant, RequestId, SlotId, SlotKey, VARIANT_BIT_LENGTH},
};

// DenyReason

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    PoolExhausted,
    UnknownArchetype,
    RateLimited,
    Rejected,
}

impl DenyReason {
    pub fn from_error(error: &PoolError) -> Self {
        match error {
            PoolError::PoolExhausted { .. } | PoolError::CapacityExceeded { .. } => {
                DenyReason::PoolExhausted
            }
            PoolError::UnknownArchetype { .. } => DenyReason::UnknownArchetype,
            _ => DenyReason::Rejected,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DenyReason::PoolExhausted => "pool exhausted",
            DenyReason::UnknownArchetype => "unknown archetype",
            DenyReason::RateLimited => "rate limited",
            DenyReason::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

impl Serde for DenyReason {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let index = match self {
            DenyReason::PoolExhausted => 0,
            DenyReason::UnknownArchetype => 1,
            DenyReason::RateLimited => 2,
            DenyReason::Rejected => 3,
        };
        ser_variant(index, writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match de_variant(reader)? {
            0 => Ok(DenyReason::PoolExhausted),
            1 => Ok(DenyReason::UnknownArchetype),
            2 => Ok(DenyReason::RateLimited),
            3 => Ok(DenyReason::Rejected),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        VARIANT_BIT_LENGTH
    }
}

// AcquireResult

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireResult {
    Granted(SlotKey),
    Denied(DenyReason),
}

impl Serde for AcquireResult {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            AcquireResult::Granted(key) => {
                true.ser(writer);
                key.ser(writer);
            }
            AcquireResult::Denied(reason) => {
                false.ser(writer);
                reason.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if bool::de(reader)? {
            Ok(AcquireResult::Granted(SlotKey::de(reader)?))
        } else {
            Ok(AcquireResult::Denied(DenyReason::de(reader)?))
        }
    }

    fn bit_length(&self) -> u32 {
        1 + match self {
            AcquireResult::Granted(key) => key.bit_length(),
            AcquireResult::Denied(reason) => reason.bit_length(),
        }
    }
}

// ClientMessage

/// Requests a client sends to the server.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    AcquireRequest {
        request_id: RequestId,
        archetype: Archetype,
        predicted_slot: Option<SlotId>,
        context: SpawnContext,
    },
    ReleaseRequest {
        key: SlotKey,
    },
    ResyncRequest {
        archetype: Archetype,
    },
}

impl Serde for ClientMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            ClientMessage::AcquireRequest {
                request_id,
                archetype,
                predicted_slot,
                context,
            } => {
                ser_variant(0, writer);
                request_id.ser(writer);
                archetype.ser(writer);
                match predicted_slot {
                    Some(slot) => {
                        true.ser(writer);
                        slot.ser(writer);
                    }
                    None => false.ser(writer),
                }
                context.ser(writer);
            }
            ClientMessage::ReleaseRequest { key } => {
                ser_variant(1, writer);
                key.ser(writer);
            }
            ClientMessage::ResyncRequest { archetype } => {
                ser_variant(2, writer);
                archetype.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match de_variant(reader)? {
            0 => {
                let request_id = RequestId::de(reader)?;
                let archetype = Archetype::de(reader)?;
                let predicted_slot = if bool::de(reader)? {
                    Some(SlotId::de(reader)?)
                } else {
                    None
                };
                let context = SpawnContext::de(reader)?;
                Ok(ClientMessage::AcquireRequest {
                    request_id,
                    archetype,
                    predicted_slot,
                    context,
                })
            }
            1 => Ok(ClientMessage::ReleaseRequest {
                key: SlotKey::de(reader)?,
            }),
            2 => Ok(ClientMessage::ResyncRequest {
                archetype: Archetype::de(reader)?,
            }),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        VARIANT_BIT_LENGTH
            + match self {
                ClientMessage::AcquireRequest {
                    request_id,
                    archetype,
                    predicted_slot,
                    context,
                } => {
                    request_id.bit_length()
                        + archetype.bit_length()
                        + 1
                        + predicted_slot.map(|slot| slot.bit_length()).unwrap_or(0)
                        + context.bit_length()
                }
                ClientMessage::ReleaseRequest { key } => key.bit_length(),
                ClientMessage::ResyncRequest { archetype } => archetype.bit_length(),
            }
    }
}

// ServerMessage

/// Deltas, responses and snapshots the server sends to clients.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    Delta(ReplicationDelta),
    AcquireResponse {
        request_id: RequestId,
        result: AcquireResult,
    },
    Snapshot(SnapshotChunk),
}

impl Serde for ServerMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            ServerMessage::Delta(delta) => {
                ser_variant(0, writer);
                delta.ser(writer);
            }
            ServerMessage::AcquireResponse { request_id, result } => {
                ser_variant(1, writer);
                request_id.ser(writer);
                result.ser(writer);
            }
            ServerMessage::Snapshot(chunk) => {
                ser_variant(2, writer);
                chunk.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match de_variant(reader)? {
            0 => Ok(ServerMessage::Delta(ReplicationDelta::de(reader)?)),
            1 => {
                let request_id = RequestId::de(reader)?;
                let result = AcquireResult::de(reader)?;
                Ok(ServerMessage::AcquireResponse { request_id, result })
            }
            2 => Ok(ServerMessage::Snapshot(SnapshotChunk::de(reader)?)),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        VARIANT_BIT_LENGTH
            + match self {
                ServerMessage::Delta(delta) => delta.bit_length(),
                ServerMessage::AcquireResponse { request_id, result } => {
                    request_id.bit_length() + result.bit_length()
                }
                ServerMessage::Snapshot(chunk) => chunk.bit_length(),
            }
    }
}

// Packets

/// Bits a packet may use: one continuation bit precedes every message and
/// one closes the list.
const PACKET_BUDGET_BITS: u32 = MTU_SIZE_BITS - 8;

/// Packs messages, in order, into as few packets as fit.
pub fn write_packets<M: Serde>(messages: &[M]) -> Result<Vec<Box<[u8]>>, ProtocolError> {
    let mut packets = Vec::new();
    let mut start = 0;
    while start < messages.len() {
        let mut bits = 1;
        let mut end = start;
        while end < messages.len() {
            let needed = 1 + messages[end].bit_length();
            if bits + needed > PACKET_BUDGET_BITS {
                break;
            }
            bits += needed;
            end += 1;
        }
        if end == start {
            return Err(ProtocolError::Oversized {
                bits: 1 + messages[start].bit_length(),
                budget: PACKET_BUDGET_BITS,
            });
        }

        let mut writer = BitWriter::new();
        for message in &messages[start..end] {
            true.ser(&mut writer);
            message.ser(&mut writer);
        }
        false.ser(&mut writer);
        packets.push(writer.to_bytes());
        start = end;
    }
    Ok(packets)
}

/// Reads every message from one packet.
pub fn read_packet<M: Serde>(payload: &[u8], message: &'static str) -> Result<Vec<M>, ProtocolError> {
    let mut reader = BitReader::new(payload);
    let mut messages = Vec::new();
    loop {
        let more = bool::de(&mut reader).map_err(|_| ProtocolError::Malformed { message })?;
        if !more {
            break;
        }
        messages.push(M::de(&mut reader).map_err(|_| ProtocolError::Malformed { message })?);
    }
    Ok(messages)
}
