//! Contact detection layer
//!
//! Turns world geometry (and custom triggers) into contact signals for the
//! phase state machine.

pub mod detector;
pub mod probe;
pub mod triggers;
pub mod world;

pub use detector::{Contact, ContactDetector, ContactKind, ContactSignal};
pub use probe::WorldProbe;
pub use triggers::{ContactTrigger, TriggerHit, TriggerRegistry};
pub use world::{HeavyObject, WorldQuery};
