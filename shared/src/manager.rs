use std::mem;

use log::info;

use crate::{
    archetype::{Archetype, ArchetypeBehavior},
    config::{validate_name, PoolPolicy, PoolSettings, MAX_ARCHETYPES},
    error::{ConfigError, PoolError},
    events::PoolEvents,
    gameplay::{AcquireTicket, GameplayPoolAccess, SpawnContext},
    pool::{Pool, PoolCounts, PoolSet, ReleaseProgress},
    replication::{ClientMessage, Coordinator, DenyReason, Outgoing, ServerMessage, SnapshotChunk},
    slot::{OwnerAuthority, SlotView},
    types::{ClientId, HostType, PoolTag, RequestId, SlotId, SlotKey},
};

/// Owns every pool of a session and routes gameplay calls and network
/// messages through the server or client role.
pub struct PoolManager<H> {
    pools: PoolSet<H>,
    coordinator: Coordinator,
    events: PoolEvents,
    automatic_reset: bool,
    session_active: bool,
}

impl<H> PoolManager<H> {
    pub fn new_server() -> Self {
        Self::new(Coordinator::server())
    }

    pub fn new_client(client_id: ClientId, resync_timeout_steps: u32) -> Self {
        Self::new(Coordinator::client(client_id, resync_timeout_steps))
    }

    fn new(coordinator: Coordinator) -> Self {
        Self {
            pools: PoolSet::new(),
            coordinator,
            events: PoolEvents::new(),
            automatic_reset: true,
            session_active: false,
        }
    }

    pub fn host_type(&self) -> HostType {
        self.coordinator.host_type()
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active
    }

    pub fn pools(&self) -> &PoolSet<H> {
        &self.pools
    }

    pub fn archetypes(&self) -> Vec<Archetype> {
        self.pools.archetypes()
    }

    // Setup

    /// Registers a pool for `archetype`. Registering again with the same
    /// policy is a no-op returning the existing tag.
    pub fn register_archetype(
        &mut self,
        archetype: Archetype,
        policy: PoolPolicy,
        behavior: Box<dyn ArchetypeBehavior<H>>,
    ) -> Result<PoolTag, PoolError> {
        if let Some(existing) = self.pools.get(&archetype) {
            if *existing.policy() == policy {
                return Ok(existing.tag());
            }
            return Err(PoolError::AlreadyRegistered {
                archetype: archetype.to_string(),
            });
        }
        validate_name(&archetype)?;
        policy.validate(archetype.name())?;
        if self.pools.len() >= MAX_ARCHETYPES {
            return Err(ConfigError::TooManyArchetypes {
                max: MAX_ARCHETYPES,
            }
            .into());
        }

        if let Coordinator::Client(role) = &mut self.coordinator {
            role.track_pool(&archetype, &policy);
        }
        let tag = self.pools.next_tag();
        info!(
            "Registered archetype {} as pool {} ({}..{} slots)",
            archetype, tag, policy.initial_size, policy.max_size
        );
        let pool = Pool::new(tag, archetype, policy, behavior, self.automatic_reset);
        Ok(self.pools.insert(pool))
    }

    /// Registers every archetype of `settings` in order, asking `behaviors`
    /// for each one's behavior.
    pub fn register_settings<F>(
        &mut self,
        settings: &PoolSettings,
        mut behaviors: F,
    ) -> Result<(), PoolError>
    where
        F: FnMut(&Archetype) -> Box<dyn ArchetypeBehavior<H>>,
    {
        settings.validate()?;
        self.automatic_reset = settings.automatic_reset;
        for entry in &settings.archetypes {
            let behavior = behaviors(&entry.name);
            self.register_archetype(entry.name.clone(), entry.policy.clone(), behavior)?;
        }
        Ok(())
    }

    /// Pre-constructs each pool's initial instances.
    pub fn start_session(&mut self) {
        let mut constructed = 0;
        for pool in self.pools.iter_mut() {
            constructed += pool.preallocate();
        }
        self.session_active = true;
        info!(
            "Pool session started on the {} side: {} pools, {} instances constructed",
            self.host_type(),
            self.pools.len(),
            constructed
        );
    }

    /// Releases every slot in use, forcing outstanding resets.
    pub fn end_session(&mut self) -> usize {
        let released = match &mut self.coordinator {
            Coordinator::Server(role) => role.end_session(&mut self.pools, &mut self.events),
            Coordinator::Client(role) => role.end_session(&mut self.pools, &mut self.events),
        };
        self.session_active = false;
        info!("Pool session ended, {} slots force-released", released);
        released
    }

    // Gameplay

    /// Acquires a slot on the authority for `owner`.
    pub fn acquire(
        &mut self,
        archetype: &Archetype,
        owner: OwnerAuthority,
        context: SpawnContext,
    ) -> Result<SlotKey, PoolError> {
        match &mut self.coordinator {
            Coordinator::Server(role) => {
                role.acquire(&mut self.pools, &mut self.events, archetype, owner, context)
            }
            Coordinator::Client(_) => Err(wrong_role("acquire", HostType::Client)),
        }
    }

    /// Acquires for the local side: directly on the server, as a prediction
    /// plus request on a client.
    pub fn request_acquire(
        &mut self,
        archetype: &Archetype,
        context: SpawnContext,
    ) -> Result<AcquireTicket, PoolError> {
        match &mut self.coordinator {
            Coordinator::Server(role) => role
                .acquire(
                    &mut self.pools,
                    &mut self.events,
                    archetype,
                    OwnerAuthority::Server,
                    context,
                )
                .map(AcquireTicket::Granted),
            Coordinator::Client(role) => {
                role.acquire(&mut self.pools, &mut self.events, archetype, context)
            }
        }
    }

    pub fn release(&mut self, key: SlotKey) -> Result<ReleaseProgress, PoolError> {
        match &mut self.coordinator {
            Coordinator::Server(role) => role.release(&mut self.pools, &mut self.events, key),
            Coordinator::Client(role) => role.release(&mut self.pools, &mut self.events, key),
        }
    }

    /// Signals that the reset hook of a Releasing slot finished.
    pub fn complete_reset(&mut self, slot: SlotId) -> Result<(), PoolError> {
        match &mut self.coordinator {
            Coordinator::Server(role) => role.complete_reset(&mut self.pools, &mut self.events, slot),
            Coordinator::Client(role) => role.complete_reset(&mut self.pools, &mut self.events, slot),
        }
    }

    pub fn slot(&self, slot: SlotId) -> Result<SlotView, PoolError> {
        self.pools.by_slot(slot)?.view(slot)
    }

    pub fn handle(&self, slot: SlotId) -> Option<&H> {
        self.pools.by_slot(slot).ok()?.handle(slot)
    }

    pub fn handle_mut(&mut self, slot: SlotId) -> Option<&mut H> {
        self.pools.by_slot_mut(slot).ok()?.handle_mut(slot)
    }

    pub fn is_active(&self, key: SlotKey) -> bool {
        self.pools
            .by_slot(key.slot())
            .is_ok_and(|pool| pool.is_active(key))
    }

    pub fn pool_counts(&self, archetype: &Archetype) -> Result<PoolCounts, PoolError> {
        Ok(self.pools.try_get(archetype)?.counts())
    }

    pub fn take_events(&mut self) -> PoolEvents {
        mem::take(&mut self.events)
    }

    // Server side

    pub fn receive_client_message(
        &mut self,
        client: ClientId,
        message: ClientMessage,
    ) -> Result<(), PoolError> {
        let Coordinator::Server(role) = &mut self.coordinator else {
            return Err(wrong_role("receive client message", HostType::Client));
        };
        role.receive(&mut self.pools, &mut self.events, client, message);
        Ok(())
    }

    /// Sends a joining client a snapshot of every pool.
    pub fn client_connected(&mut self, client: ClientId) -> Result<(), PoolError> {
        let Coordinator::Server(role) = &mut self.coordinator else {
            return Err(wrong_role("client connected", HostType::Client));
        };
        for archetype in self.pools.archetypes() {
            role.send_snapshot(&self.pools, client, &archetype)?;
        }
        Ok(())
    }

    /// Releases every slot the departed client owned.
    pub fn client_disconnected(&mut self, client: ClientId) -> Result<usize, PoolError> {
        let Coordinator::Server(role) = &mut self.coordinator else {
            return Err(wrong_role("client disconnected", HostType::Client));
        };
        let released = role.release_owned_by(&mut self.pools, &mut self.events, client);
        info!("{} disconnected, released {} slots", client, released);
        Ok(released)
    }

    /// Answers a request the shell refused before it reached a pool.
    pub fn deny_request(
        &mut self,
        client: ClientId,
        request_id: RequestId,
        reason: DenyReason,
    ) -> Result<(), PoolError> {
        let Coordinator::Server(role) = &mut self.coordinator else {
            return Err(wrong_role("deny request", HostType::Client));
        };
        role.deny(client, request_id, reason);
        Ok(())
    }

    pub fn snapshot(&self, archetype: &Archetype) -> Result<Vec<SnapshotChunk>, PoolError> {
        match &self.coordinator {
            Coordinator::Server(role) => role.snapshot(&self.pools, archetype),
            Coordinator::Client(_) => Err(wrong_role("snapshot", HostType::Client)),
        }
    }

    pub fn take_server_outgoing(&mut self) -> Vec<Outgoing> {
        match &mut self.coordinator {
            Coordinator::Server(role) => role.take_outgoing(),
            Coordinator::Client(_) => Vec::new(),
        }
    }

    // Client side

    pub fn receive_server_message(&mut self, message: ServerMessage) -> Result<(), PoolError> {
        match &mut self.coordinator {
            Coordinator::Client(role) => {
                role.receive(&mut self.pools, &mut self.events, message);
                Ok(())
            }
            Coordinator::Server(_) => Err(wrong_role("receive server message", HostType::Server)),
        }
    }

    pub fn take_client_outgoing(&mut self) -> Vec<ClientMessage> {
        match &mut self.coordinator {
            Coordinator::Client(role) => role.take_outgoing(),
            Coordinator::Server(_) => Vec::new(),
        }
    }

    pub fn is_resyncing(&self, archetype: &Archetype) -> bool {
        match &self.coordinator {
            Coordinator::Client(role) => role.is_resyncing(archetype),
            Coordinator::Server(_) => false,
        }
    }

    /// Ends a simulation step; on a client this ages outstanding resyncs.
    pub fn advance_step(&mut self) {
        if let Coordinator::Client(role) = &mut self.coordinator {
            role.advance_step();
        }
    }
}

impl<H> GameplayPoolAccess for PoolManager<H> {
    fn is_authority(&self) -> bool {
        self.coordinator.is_authority()
    }

    fn request_acquire(
        &mut self,
        archetype: &Archetype,
        context: SpawnContext,
    ) -> Result<AcquireTicket, PoolError> {
        PoolManager::request_acquire(self, archetype, context)
    }

    fn request_release(&mut self, key: SlotKey) -> Result<(), PoolError> {
        self.release(key).map(|_| ())
    }
}

fn wrong_role(operation: &'static str, host: HostType) -> PoolError {
    PoolError::WrongRole {
        operation,
        host: host.name(),
    }
}
