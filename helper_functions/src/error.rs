use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("index is out of range")]
    IndexOutOfRange,
    #[error("slot is out of range")]
    SlotOutOfRange,
    #[error("aggregation bitfield length does not match committee size")]
    AttestationBitsInvalid,
    #[error("attesting indices are not sorted and unique")]
    IndicesNotSortedAndUnique,
    #[error("signature does not verify")]
    SignatureInvalid,
    #[error("there are no active validators")]
    NoActiveValidators,
    #[error("proposer sampling did not converge")]
    ProposerSamplingDidNotConverge,
}
