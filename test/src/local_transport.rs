/// In-memory transport for end-to-end tests
/// Routes packets between one server and any number of clients without
/// network I/O. Packets stay queued until the receiving side polls.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use netpool_client::transport::{
    PacketReceiver as ClientPacketReceiver, PacketSender as ClientPacketSender,
};
use netpool_server::transport::{
    PacketReceiver as ServerPacketReceiver, PacketSender as ServerPacketSender,
};
use netpool_shared::{ClientId, RecvError, SendError};

#[derive(Default)]
struct HubState {
    to_server: VecDeque<(ClientId, Box<[u8]>)>,
    to_clients: HashMap<ClientId, VecDeque<Box<[u8]>>>,
}

/// Shared packet queues between a server and its clients
#[derive(Clone, Default)]
pub struct LocalTransportHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalTransportHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_transport(&self) -> (Box<dyn ServerPacketSender>, Box<dyn ServerPacketReceiver>) {
        let sender = LocalServerSender {
            state: self.state.clone(),
        };
        let receiver = LocalServerReceiver {
            state: self.state.clone(),
            current: None,
        };
        (Box::new(sender), Box::new(receiver))
    }

    pub fn client_transport(
        &self,
        client: ClientId,
    ) -> (Box<dyn ClientPacketSender>, Box<dyn ClientPacketReceiver>) {
        if let Ok(mut state) = self.state.lock() {
            state.to_clients.entry(client).or_default();
        }
        let sender = LocalClientSender {
            state: self.state.clone(),
            client,
        };
        let receiver = LocalClientReceiver {
            state: self.state.clone(),
            client,
            current: None,
        };
        (Box::new(sender), Box::new(receiver))
    }

    /// Packets waiting for `client`
    pub fn queued_for(&self, client: ClientId) -> usize {
        self.state
            .lock()
            .map(|state| state.to_clients.get(&client).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Packets waiting for the server
    pub fn queued_for_server(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.to_server.len())
            .unwrap_or(0)
    }

    /// Reverses the packets waiting for `client`, delivering the newest first
    pub fn reverse_queue_for(&self, client: ClientId) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(queue) = state.to_clients.get_mut(&client) {
                queue.make_contiguous().reverse();
            }
        }
    }

    /// Drops every packet waiting for `client`, returning how many were lost
    pub fn drop_queue_for(&self, client: ClientId) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|mut state| state.to_clients.get_mut(&client).map(|queue| {
                let dropped = queue.len();
                queue.clear();
                dropped
            }))
            .unwrap_or(0)
    }

    /// Stops routing to `client`; later sends to it fail
    pub fn disconnect(&self, client: ClientId) {
        if let Ok(mut state) = self.state.lock() {
            state.to_clients.remove(&client);
        }
    }
}

// Server Transport Components

struct LocalServerSender {
    state: Arc<Mutex<HubState>>,
}

impl ServerPacketSender for LocalServerSender {
    fn send(&self, client: &ClientId, payload: &[u8]) -> Result<(), SendError> {
        let mut state = self.state.lock().map_err(|_| SendError)?;
        let queue = state.to_clients.get_mut(client).ok_or(SendError)?;
        queue.push_back(payload.into());
        Ok(())
    }
}

struct LocalServerReceiver {
    state: Arc<Mutex<HubState>>,
    current: Option<Box<[u8]>>,
}

impl ServerPacketReceiver for LocalServerReceiver {
    fn receive(&mut self) -> Result<Option<(ClientId, &[u8])>, RecvError> {
        let next = self
            .state
            .lock()
            .map_err(|_| RecvError)?
            .to_server
            .pop_front();
        match next {
            Some((client, payload)) => {
                let payload: &[u8] = self.current.insert(payload);
                Ok(Some((client, payload)))
            }
            None => Ok(None),
        }
    }
}

// Client Transport Components

struct LocalClientSender {
    state: Arc<Mutex<HubState>>,
    client: ClientId,
}

impl ClientPacketSender for LocalClientSender {
    fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        let mut state = self.state.lock().map_err(|_| SendError)?;
        if !state.to_clients.contains_key(&self.client) {
            return Err(SendError);
        }
        state.to_server.push_back((self.client, payload.into()));
        Ok(())
    }
}

struct LocalClientReceiver {
    state: Arc<Mutex<HubState>>,
    client: ClientId,
    current: Option<Box<[u8]>>,
}

impl ClientPacketReceiver for LocalClientReceiver {
    fn receive(&mut self) -> Result<Option<&[u8]>, RecvError> {
        let next = self
            .state
            .lock()
            .map_err(|_| RecvError)?
            .to_clients
            .get_mut(&self.client)
            .and_then(VecDeque::pop_front);
        match next {
            Some(payload) => {
                let payload: &[u8] = self.current.insert(payload);
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}
