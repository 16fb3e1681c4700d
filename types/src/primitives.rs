use core::ops::Index;

use serde::{Deserialize, Serialize};

pub use bls::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature};
pub use ethereum_types::H256;

use hashing::TreeHash;

pub type Epoch = u64;
pub type Gwei = u64;
pub type Slot = u64;
pub type CommitteeIndex = u64;
pub type ValidatorIndex = u64;
pub type Domain = u64;
pub type DomainType = u32;
pub type UnixSeconds = u64;

type VersionAsArray = [u8; 4];

/// A fork version. Kept as a wrapper so the domain computation can treat it as
/// four raw bytes while serde sees it as a single value.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
pub struct Version(VersionAsArray);

impl Version {
    pub fn as_array(&self) -> &VersionAsArray {
        &self.0
    }
}

impl From<VersionAsArray> for Version {
    fn from(array: VersionAsArray) -> Self {
        Self(array)
    }
}

impl From<Version> for VersionAsArray {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl Index<usize> for Version {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        self.0.index(index)
    }
}

impl TreeHash for Version {
    fn tree_hash_root(&self) -> H256 {
        self.0.tree_hash_root()
    }
}
