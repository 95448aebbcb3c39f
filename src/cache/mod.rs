//! Cache subsystem: key construction (A), in-process tier (B), remote tier
//! (C), the multi-tier facade (D), and the warming controller (E).

pub mod key;
pub mod local;
pub mod multi_tier;
pub mod remote;
pub mod warming;

pub use local::{LocalCache, SharedLocalCache};
pub use multi_tier::MultiTierCache;
pub use remote::{RedisCache, RemoteCachePort, RemoteInfo};
pub use warming::{DataProviderPort, HttpDataProvider, MockDataProvider, WarmingController, WarmingStats};
