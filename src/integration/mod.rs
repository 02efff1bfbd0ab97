//! Seams to the host game
//!
//! Damage, rendering scales and persistence are owned by the host. The core
//! talks to them only through the traits defined here.

pub mod damage;
pub mod persistence;
pub mod scale_sink;

pub use damage::{DamageLog, DamageSink};
pub use persistence::{FlattenRecord, PersistenceCodec, RecordCodec, RECORD_VERSION};
pub use scale_sink::{ScaleProvider, ScaleProviderRegistry, ScaleSink, ScaleTable};
