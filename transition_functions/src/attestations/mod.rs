pub mod attestations;

pub use attestations::*;
