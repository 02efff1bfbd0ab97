//! Flattening lifecycle
//!
//! Per-entity phase snapshots, the pure transition logic that produces them,
//! and the calculators and gates the transitions depend on.

pub mod machine;
pub mod reformation;
pub mod scale;
pub mod state;
pub mod store;
pub mod timer;

pub use machine::{Arrival, PhaseStateMachine, Step};
pub use reformation::{ReformDenial, ReformPermit, ReformationGate, ReformationProbe};
pub use scale::ScaleTriple;
pub use state::{FlattenPhase, FlattenState, FrozenPose};
pub use store::{PhaseCensus, PhaseStateStore};
