pub mod process_epoch;

pub use process_epoch::process_epoch;
