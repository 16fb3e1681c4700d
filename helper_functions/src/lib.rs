pub mod beacon_state_accessors;
pub mod beacon_state_mutators;
pub mod crypto;
pub mod error;
pub mod math;
pub mod misc;
pub mod predicates;

pub use crate::error::Error;
