pub mod attestations;
pub mod block_processing;
pub mod epochs;
pub mod error;
pub mod genesis;
pub mod process_slot;
pub mod rewards_and_penalties;

pub use crate::error::Error;
pub use crate::process_slot::{process_slots, state_transition, Phase};
