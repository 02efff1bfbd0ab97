pub mod tick;

pub use tick::{FlattenEvent, FlattenService};
