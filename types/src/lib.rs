pub mod beacon_state;
pub mod bitfields;
pub mod config;
pub mod consts;
pub mod primitives;
pub mod types;

pub use crate::beacon_state::BeaconState;
