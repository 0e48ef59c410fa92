use std::default::Default;

/// Contains Config properties which will be used by the Server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Acquire requests accepted from one client per step. Requests past the
    /// cap are denied as rate limited.
    pub max_requests_per_step: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_requests_per_step: 16,
        }
    }
}
