mod pool_policy;
mod pool_settings;

pub use pool_policy::PoolPolicy;
pub use pool_settings::{ArchetypeSettings, PoolSettings, MAX_ARCHETYPES};

pub(crate) use pool_settings::validate_name;
