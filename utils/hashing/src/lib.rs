//! Hashing collaborator for the state transition.
//!
//! Provides the SHA-256 primitive, a compact binary merkleization over 32-byte
//! chunks, and the `TreeHash`/`SignedRoot` traits used to derive roots of
//! structured values. The merkleization here is deterministic and stable but
//! makes no attempt at wire compatibility with any external serialization
//! format; only root stability and domain separation matter to the core.

use ethereum_types::H256;
use ring::digest::{digest, SHA256};

pub const BYTES_PER_CHUNK: usize = 32;

pub fn hash(input: &[u8]) -> H256 {
    H256::from_slice(digest(&SHA256, input).as_ref())
}

pub fn hash_concat(left: H256, right: H256) -> H256 {
    let mut input = [0; BYTES_PER_CHUNK * 2];
    input[..BYTES_PER_CHUNK].copy_from_slice(left.as_bytes());
    input[BYTES_PER_CHUNK..].copy_from_slice(right.as_bytes());
    hash(&input)
}

/// Root of a list of chunks, padded with zero chunks to the next power of two.
/// An empty list hashes to the zero chunk.
pub fn merkleize(chunks: &[H256]) -> H256 {
    if chunks.is_empty() {
        return H256::zero();
    }
    let mut layer = chunks.to_vec();
    if layer.len() % 2 == 1 {
        layer.push(H256::zero());
    }
    while layer.len() > 1 {
        if layer.len() % 2 == 1 {
            layer.push(H256::zero());
        }
        layer = layer
            .chunks(2)
            .map(|pair| hash_concat(pair[0], pair[1]))
            .collect();
    }
    layer[0]
}

/// Mixes a length into a root so that lists of different lengths with the same
/// contents produce different roots.
pub fn mix_in_length(root: H256, length: usize) -> H256 {
    let mut length_chunk = H256::zero();
    length_chunk.as_bytes_mut()[..8].copy_from_slice(&(length as u64).to_le_bytes());
    hash_concat(root, length_chunk)
}

pub trait TreeHash {
    fn tree_hash_root(&self) -> H256;
}

/// Root of a container with its trailing signature field left out. Used as the
/// message for every signature over a container.
pub trait SignedRoot: TreeHash {
    fn signed_root(&self) -> H256;
}

impl TreeHash for u64 {
    fn tree_hash_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk.as_bytes_mut()[..8].copy_from_slice(&self.to_le_bytes());
        chunk
    }
}

impl TreeHash for u32 {
    fn tree_hash_root(&self) -> H256 {
        u64::from(*self).tree_hash_root()
    }
}

impl TreeHash for bool {
    fn tree_hash_root(&self) -> H256 {
        u64::from(*self).tree_hash_root()
    }
}

impl TreeHash for H256 {
    fn tree_hash_root(&self) -> H256 {
        *self
    }
}

impl TreeHash for [u8; 4] {
    fn tree_hash_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk.as_bytes_mut()[..4].copy_from_slice(self);
        chunk
    }
}

impl TreeHash for [u8; 32] {
    fn tree_hash_root(&self) -> H256 {
        H256::from_slice(self)
    }
}

impl<T: TreeHash> TreeHash for Vec<T> {
    fn tree_hash_root(&self) -> H256 {
        let chunks = self
            .iter()
            .map(TreeHash::tree_hash_root)
            .collect::<Vec<_>>();
        mix_in_length(merkleize(&chunks), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_sha256_vector() {
        // SHA-256 of the empty string.
        let expected = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(hash(&[]), H256::from_slice(&hex_literal(expected)));
    }

    #[test]
    fn merkleize_pads_to_power_of_two() {
        let chunks = [hash(b"a"), hash(b"b"), hash(b"c")];
        let expected = hash_concat(
            hash_concat(chunks[0], chunks[1]),
            hash_concat(chunks[2], H256::zero()),
        );
        assert_eq!(merkleize(&chunks), expected);
    }

    #[test]
    fn merkleize_of_nothing_is_the_zero_chunk() {
        assert_eq!(merkleize(&[]), H256::zero());
    }

    #[test]
    fn length_mix_distinguishes_prefixes() {
        let full = vec![1_u64, 2, 3];
        let truncated = vec![1_u64, 2, 3, 0];
        assert_ne!(full.tree_hash_root(), truncated.tree_hash_root());
    }

    fn hex_literal(digits: &str) -> Vec<u8> {
        (0..digits.len())
            .step_by(2)
            .map(|position| u8::from_str_radix(&digits[position..position + 2], 16))
            .collect::<Result<_, _>>()
            .expect("the digits are valid hexadecimal")
    }
}
