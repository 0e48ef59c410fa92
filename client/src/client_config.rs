use std::default::Default;

use netpool_shared::ClientId;

/// Contains Config properties which will be used by a Server or Client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Identity the server knows this client by
    pub client_id: ClientId,
    /// Steps to wait for a requested snapshot before asking again
    pub resync_timeout_steps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: ClientId::new(0),
            resync_timeout_steps: 30,
        }
    }
}
