use netpool_shared::{ClientId, ServerMessage};

/// A connected client, its per-step request budget and its queued messages.
pub struct User {
    client_id: ClientId,
    requests_this_step: u32,
    outbox: Vec<ServerMessage>,
}

impl User {
    pub(crate) fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            requests_this_step: 0,
            outbox: Vec::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn requests_this_step(&self) -> u32 {
        self.requests_this_step
    }

    pub fn queued_messages(&self) -> usize {
        self.outbox.len()
    }

    /// Counts one acquire request; false once the step's budget is spent.
    pub(crate) fn spend_request(&mut self, max_requests_per_step: u32) -> bool {
        if self.requests_this_step >= max_requests_per_step {
            return false;
        }
        self.requests_this_step += 1;
        true
    }

    pub(crate) fn reset_step(&mut self) {
        self.requests_this_step = 0;
    }

    pub(crate) fn queue(&mut self, message: ServerMessage) {
        self.outbox.push(message);
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.outbox)
    }
}
