use crate::{
    replication::{ClientRole, ServerRole},
    types::{ClientId, HostType},
};

/// Which side of the session a manager plays.
pub enum Coordinator {
    Server(ServerRole),
    Client(ClientRole),
}

impl Coordinator {
    pub fn server() -> Self {
        Self::Server(ServerRole::new())
    }

    pub fn client(client_id: ClientId, resync_timeout_steps: u32) -> Self {
        Self::Client(ClientRole::new(client_id, resync_timeout_steps))
    }

    pub fn host_type(&self) -> HostType {
        match self {
            Self::Server(_) => HostType::Server,
            Self::Client(_) => HostType::Client,
        }
    }

    pub fn is_authority(&self) -> bool {
        self.host_type() == HostType::Server
    }
}
