//! Flattening - compression lifecycle for entities crushed by heavy objects

pub mod contact;
pub mod core;
pub mod flatten;
pub mod integration;
pub mod simulation;
pub mod world;
