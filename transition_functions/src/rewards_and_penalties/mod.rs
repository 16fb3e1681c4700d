pub mod rewards_and_penalties;

pub use rewards_and_penalties::*;
