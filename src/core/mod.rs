pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigSource, FlattenConfig, SharedConfig};
pub use error::{ConfigError, DecodeError, FlattenError, Result};
pub use types::{Aabb, EntityBody, EntityId, ObjectId, Tick, TICKS_PER_SECOND};
