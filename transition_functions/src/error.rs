use thiserror::Error;

use crate::process_slot::Phase;

/// Failures of the state transition.
///
/// `AssertionFailed` marks invalid input data (the block or operation is
/// discarded, the committed state is untouched). `IllegalTransition` marks a
/// caller bug in the ordering of slot, epoch and block processing.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    AssertionFailed(&'static str),
    #[error("illegal transition from {from:?} to {to:?}")]
    IllegalTransition { from: Phase, to: Phase },
    #[error(transparent)]
    Helper(#[from] helper_functions::Error),
}

/// Result-returning counterpart of `assert!`.
pub fn ensure(condition: bool, message: &'static str) -> Result<(), Error> {
    if condition {
        Ok(())
    } else {
        Err(Error::AssertionFailed(message))
    }
}
