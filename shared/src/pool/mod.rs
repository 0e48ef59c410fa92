mod pool;
mod pool_set;

pub use pool::{Pool, PoolCounts, ReleaseProgress};
pub use pool_set::PoolSet;
