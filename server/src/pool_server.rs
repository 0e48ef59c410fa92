use std::collections::{BTreeMap, VecDeque};

use log::{info, warn};

use netpool_shared::{
    read_packet, write_packets, AcquireTicket, Archetype, ArchetypeBehavior, ClientId,
    ClientMessage, DenyReason, GameplayPoolAccess, Outgoing, OwnerAuthority, PoolCounts,
    PoolError, PoolEvents, PoolManager, PoolPolicy, PoolSettings, PoolTag, ReleaseProgress,
    SlotId, SlotKey, SlotView, SnapshotChunk, SpawnContext,
};

use crate::{
    transport::{PacketReceiver, PacketSender},
    NetPoolServerError, ServerConfig, User,
};

/// Authoritative pool host. Each step: `receive_all_packets`,
/// `process_all_packets`, gameplay calls, then `send_all_packets`.
pub struct PoolServer<H> {
    config: ServerConfig,
    manager: PoolManager<H>,
    sender: Box<dyn PacketSender>,
    receiver: Box<dyn PacketReceiver>,
    users: BTreeMap<ClientId, User>,
    /// Client messages in arrival order, drained by `process_all_packets`
    incoming: VecDeque<(ClientId, ClientMessage)>,
    errors: Vec<NetPoolServerError>,
}

impl<H> PoolServer<H> {
    pub fn new(
        config: ServerConfig,
        sender: Box<dyn PacketSender>,
        receiver: Box<dyn PacketReceiver>,
    ) -> Self {
        Self {
            config,
            manager: PoolManager::new_server(),
            sender,
            receiver,
            users: BTreeMap::new(),
            incoming: VecDeque::new(),
            errors: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
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

    /// Forces every pool empty and forgets queued traffic.
    pub fn end_session(&mut self) -> usize {
        self.incoming.clear();
        for user in self.users.values_mut() {
            user.take_outbox();
        }
        self.manager.end_session()
    }

    // Users

    /// Admits a client and queues a snapshot of every pool for it.
    pub fn connect_user(&mut self, client: ClientId) -> Result<(), NetPoolServerError> {
        if self.users.contains_key(&client) {
            return Err(NetPoolServerError::AlreadyConnected { client });
        }
        // earlier broadcasts predate the snapshot
        self.collect_outgoing();
        self.users.insert(client, User::new(client));
        self.manager.client_connected(client)?;
        info!("{} connected", client);
        Ok(())
    }

    /// Drops a client, releasing every slot it owned.
    pub fn disconnect_user(&mut self, client: ClientId) -> Result<usize, NetPoolServerError> {
        if self.users.remove(&client).is_none() {
            return Err(NetPoolServerError::UnknownClient { client });
        }
        self.incoming.retain(|(sender, _)| *sender != client);
        Ok(self.manager.client_disconnected(client)?)
    }

    pub fn user_exists(&self, client: &ClientId) -> bool {
        self.users.contains_key(client)
    }

    pub fn user(&self, client: &ClientId) -> Option<&User> {
        self.users.get(client)
    }

    pub fn users_count(&self) -> usize {
        self.users.len()
    }

    pub fn user_ids(&self) -> Vec<ClientId> {
        self.users.keys().copied().collect()
    }

    // Step

    /// Reads every waiting packet, queueing its messages in arrival order.
    pub fn receive_all_packets(&mut self) {
        loop {
            match self.receiver.receive() {
                Ok(Some((client, payload))) => {
                    if !self.users.contains_key(&client) {
                        warn!("Server Error: packet from unknown {}", client);
                        self.errors
                            .push(NetPoolServerError::UnknownClient { client });
                        continue;
                    }
                    match read_packet::<ClientMessage>(payload, "client packet") {
                        Ok(messages) => {
                            self.incoming
                                .extend(messages.into_iter().map(|message| (client, message)));
                        }
                        Err(source) => {
                            warn!("Server Error: cannot read malformed packet from {}", client);
                            self.errors
                                .push(NetPoolServerError::Protocol { client, source });
                        }
                    }
                }
                Ok(None) => {
                    break;
                }
                Err(_) => {
                    self.errors.push(NetPoolServerError::RecvError);
                    break;
                }
            }
        }
    }

    /// Applies the step's client messages, capping acquire requests per
    /// client.
    pub fn process_all_packets(&mut self) {
        for user in self.users.values_mut() {
            user.reset_step();
        }
        while let Some((client, message)) = self.incoming.pop_front() {
            let Some(user) = self.users.get_mut(&client) else {
                continue;
            };
            if let ClientMessage::AcquireRequest { request_id, .. } = &message {
                if !user.spend_request(self.config.max_requests_per_step) {
                    warn!("{} exceeded its request budget", client);
                    let request_id = *request_id;
                    if let Err(error) =
                        self.manager
                            .deny_request(client, request_id, DenyReason::RateLimited)
                    {
                        self.errors.push(error.into());
                    }
                    continue;
                }
            }
            if let Err(error) = self.manager.receive_client_message(client, message) {
                self.errors.push(error.into());
            }
        }
    }

    /// Packs and sends every queued message. Users are visited in random
    /// order.
    pub fn send_all_packets(&mut self) {
        self.collect_outgoing();

        let mut clients: Vec<ClientId> = self.users.keys().copied().collect();
        fastrand::shuffle(&mut clients);

        for client in clients {
            let Some(user) = self.users.get_mut(&client) else {
                continue;
            };
            let messages = user.take_outbox();
            if messages.is_empty() {
                continue;
            }
            let packets = match write_packets(&messages) {
                Ok(packets) => packets,
                Err(source) => {
                    warn!("Server Error: cannot encode packets for {}", client);
                    self.errors
                        .push(NetPoolServerError::Encode { client, source });
                    continue;
                }
            };
            for packet in packets {
                if self.sender.send(&client, &packet).is_err() {
                    warn!("Server Error: Cannot send packet to {}", client);
                    self.errors
                        .push(NetPoolServerError::SendError { client });
                    break;
                }
            }
        }
    }

    /// Moves the manager's queued messages into each recipient's outbox.
    fn collect_outgoing(&mut self) {
        for outgoing in self.manager.take_server_outgoing() {
            match outgoing {
                Outgoing::Broadcast(message) => {
                    for user in self.users.values_mut() {
                        user.queue(message.clone());
                    }
                }
                Outgoing::Direct(client, message) => {
                    if let Some(user) = self.users.get_mut(&client) {
                        user.queue(message);
                    }
                }
            }
        }
    }

    pub fn take_events(&mut self) -> PoolEvents {
        self.manager.take_events()
    }

    pub fn take_errors(&mut self) -> Vec<NetPoolServerError> {
        std::mem::take(&mut self.errors)
    }

    // Pools

    /// Acquires a slot for `owner`, either the server or a client.
    pub fn acquire(
        &mut self,
        archetype: &Archetype,
        owner: OwnerAuthority,
        context: SpawnContext,
    ) -> Result<SlotKey, PoolError> {
        self.manager.acquire(archetype, owner, context)
    }

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

    pub fn pool_counts(&self, archetype: &Archetype) -> Result<PoolCounts, PoolError> {
        self.manager.pool_counts(archetype)
    }

    pub fn snapshot(&self, archetype: &Archetype) -> Result<Vec<SnapshotChunk>, PoolError> {
        self.manager.snapshot(archetype)
    }
}

impl<H> GameplayPoolAccess for PoolServer<H> {
    fn is_authority(&self) -> bool {
        true
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
