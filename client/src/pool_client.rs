use std::collections::VecDeque;

use log::warn;

use netpool_shared::{
    read_packet, write_packets, AcquireTicket, Archetype, ArchetypeBehavior, ClientId,
    GameplayPoolAccess, PoolCounts, PoolError, PoolEvents, PoolManager, PoolPolicy,
    PoolSettings, PoolTag, ReleaseProgress, ServerMessage, SlotId, SlotKey, SlotView,
    SpawnContext,
};

use crate::{
    transport::{PacketReceiver, PacketSender},
    ClientConfig, NetPoolClientError,
};

/// Predicting pool host. Each step: `receive_all_packets`,
/// `process_all_packets`, gameplay calls, then `send_all_packets`.
pub struct PoolClient<H> {
    config: ClientConfig,
    manager: PoolManager<H>,
    sender: Box<dyn PacketSender>,
    receiver: Box<dyn PacketReceiver>,
    /// Server messages in arrival order, drained by `process_all_packets`
    incoming: VecDeque<ServerMessage>,
    errors: Vec<NetPoolClientError>,
}

impl<H> PoolClient<H> {
    pub fn new(
        config: ClientConfig,
        sender: Box<dyn PacketSender>,
        receiver: Box<dyn PacketReceiver>,
    ) -> Self {
        let manager = PoolManager::new_client(config.client_id, config.resync_timeout_steps);
        Self {
            config,
            manager,
            sender,
            receiver,
            incoming: VecDeque::new(),
            errors: Vec::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.config.client_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn manager(&self) -> &PoolManager<H> {
        &self.manager
    }

    // Session

    pub fn register_archetype(
        &mut self,
        archetype: Archetype,
        policy: PoolPolicy,
        behavior: Box<dyn ArchetypeBehavior<H>>,
    ) -> Result<PoolTag, PoolError> {
        self.manager.register_archetype(archetype, policy, behavior)
    }

    pub fn register_settings<F>(&mut self, settings: &PoolSettings, behaviors: F) -> Result<(), PoolError>
    where
        F: FnMut(&Archetype) -> Box<dyn ArchetypeBehavior<H>>,
    {
        self.manager.register_settings(settings, behaviors)
    }

    pub fn start_session(&mut self) {
        self.manager.start_session();
    }

    pub fn end_session(&mut self) -> usize {
        self.incoming.clear();
        self.manager.end_session()
    }

    // Step

    pub fn receive_all_packets(&mut self) {
        loop {
            match self.receiver.receive() {
                Ok(Some(payload)) => match read_packet::<ServerMessage>(payload, "server packet") {
                    Ok(messages) => self.incoming.extend(messages),
                    Err(error) => {
                        warn!("Client Error: cannot read malformed packet");
                        self.errors.push(NetPoolClientError::Protocol(error));
                    }
                },
                Ok(None) => {
                    break;
                }
                Err(_) => {
                    self.errors.push(NetPoolClientError::RecvError);
                    break;
                }
            }
        }
    }

    /// Applies the step's server messages in arrival order, then ages
    /// outstanding resync requests.
    pub fn process_all_packets(&mut self) {
        while let Some(message) = self.incoming.pop_front() {
            if let Err(error) = self.manager.receive_server_message(message) {
                self.errors.push(error.into());
            }
        }
        self.manager.advance_step();
    }

    pub fn send_all_packets(&mut self) {
        let messages = self.manager.take_client_outgoing();
        if messages.is_empty() {
            return;
        }
        let packets = match write_packets(&messages) {
            Ok(packets) => packets,
            Err(error) => {
                warn!("Client Error: cannot encode outgoing packets");
                self.errors.push(NetPoolClientError::Encode(error));
                return;
            }
        };
        for packet in packets {
            if self.sender.send(&packet).is_err() {
                warn!("Client Error: Cannot send packet to server");
                self.errors.push(NetPoolClientError::SendError);
                return;
            }
        }
    }

    pub fn take_events(&mut self) -> PoolEvents {
        self.manager.take_events()
    }

    pub fn take_errors(&mut self) -> Vec<NetPoolClientError> {
        std::mem::take(&mut self.errors)
    }

    // Pools

    /// Predicts an acquire and queues the request for the server.
    pub fn request_acquire(
        &mut self,
        archetype: &Archetype,
        context: SpawnContext,
    ) -> Result<AcquireTicket, PoolError> {
        self.manager.request_acquire(archetype, context)
    }

    /// Cancels a tentative slot, or asks the server to release an owned one.
    pub fn release(&mut self, key: SlotKey) -> Result<ReleaseProgress, PoolError> {
        self.manager.release(key)
    }

    pub fn complete_reset(&mut self, slot: SlotId) -> Result<(), PoolError> {
        self.manager.complete_reset(slot)
    }

    pub fn slot(&self, slot: SlotId) -> Result<SlotView, PoolError> {
        self.manager.slot(slot)
    }

    pub fn handle(&self, slot: SlotId) -> Option<&H> {
        self.manager.handle(slot)
    }

    pub fn handle_mut(&mut self, slot: SlotId) -> Option<&mut H> {
        self.manager.handle_mut(slot)
    }

    pub fn is_active(&self, key: SlotKey) -> bool {
        self.manager.is_active(key)
    }

    pub fn is_resyncing(&self, archetype: &Archetype) -> bool {
        self.manager.is_resyncing(archetype)
    }

    pub fn pool_counts(&self, archetype: &Archetype) -> Result<PoolCounts, PoolError> {
        self.manager.pool_counts(archetype)
    }
}

impl<H> GameplayPoolAccess for PoolClient<H> {
    fn is_authority(&self) -> bool {
        false
    }

    fn request_acquire(
        &mut self,
        archetype: &Archetype,
        context: SpawnContext,
    ) -> Result<AcquireTicket, PoolError> {
        self.manager.request_acquire(archetype, context)
    }

    fn request_release(&mut self, key: SlotKey) -> Result<(), PoolError> {
        self.manager.release(key).map(|_| ())
    }
}
