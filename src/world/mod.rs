//! World representations the flattening core can run against

pub mod grid;

pub use grid::{BlockWorld, FallingObject, Landing};
