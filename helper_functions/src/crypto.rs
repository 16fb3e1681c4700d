use hashing::{SignedRoot, TreeHash};
use types::primitives::H256;

pub use bls::{bls_aggregate_pubkeys, bls_verify, bls_verify_multiple};

pub fn hash(input: &[u8]) -> H256 {
    hashing::hash(input)
}

pub fn hash_concat(left: H256, right: H256) -> H256 {
    hashing::hash_concat(left, right)
}

pub fn hash_tree_root<T: TreeHash>(value: &T) -> H256 {
    value.tree_hash_root()
}

pub fn signed_root<T: SignedRoot>(value: &T) -> H256 {
    value.signed_root()
}
