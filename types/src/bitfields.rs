use core::ops::Range;

use ethereum_types::H256;
use hashing::{mix_in_length, TreeHash};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::consts::JUSTIFICATION_BITS_LENGTH;

/// A variable-length bitfield recording which committee members signed an
/// attestation. The length is fixed at construction to the committee size.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct BitList {
    bytes: Vec<u8>,
    length: usize,
}

impl BitList {
    pub fn with_length(length: usize) -> Self {
        Self {
            bytes: vec![0; (length + 7) / 8],
            length,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.length {
            return None;
        }
        let byte = self.bytes.get(index / 8)?;
        Some(byte >> (index % 8) & 1 == 1)
    }

    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.length, "bit index out of bounds");
        if value {
            self.bytes[index / 8] |= 1 << (index % 8);
        } else {
            self.bytes[index / 8] &= !(1 << (index % 8));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.length).map(move |index| self.get(index).unwrap_or(false))
    }

    pub fn count_ones(&self) -> usize {
        self.iter().filter(|bit| *bit).count()
    }
}

impl<'de> Deserialize<'de> for BitList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Fields {
            bytes: Vec<u8>,
            length: usize,
        }

        let Fields { bytes, length } = Fields::deserialize(deserializer)?;
        let expected_bytes = length / 8 + usize::from(length % 8 != 0);
        if bytes.len() != expected_bytes {
            return Err(de::Error::custom(
                "bit list byte count does not match its declared length",
            ));
        }
        Ok(Self { bytes, length })
    }
}

impl TreeHash for BitList {
    fn tree_hash_root(&self) -> H256 {
        let chunks = self
            .bytes
            .chunks(32)
            .map(|chunk| {
                let mut padded = H256::zero();
                padded.as_bytes_mut()[..chunk.len()].copy_from_slice(chunk);
                padded
            })
            .collect::<Vec<_>>();
        mix_in_length(hashing::merkleize(&chunks), self.length)
    }
}

/// The rolling record of the last few epochs' justification outcomes.
/// Bit 0 refers to the most recent epoch.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct JustificationBits(u8);

impl JustificationBits {
    pub fn get(self, index: usize) -> bool {
        assert!(index < JUSTIFICATION_BITS_LENGTH);
        self.0 >> index & 1 == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < JUSTIFICATION_BITS_LENGTH);
        if value {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    /// Makes room for the current epoch's outcome: every bit moves one epoch
    /// further into the past and the newest bit starts out unset.
    pub fn shift_up(&mut self) {
        self.0 = self.0 << 1 & 0b1111;
    }

    pub fn all(self, range: Range<usize>) -> bool {
        range.into_iter().all(|index| self.get(index))
    }
}

impl TreeHash for JustificationBits {
    fn tree_hash_root(&self) -> H256 {
        u64::from(self.0).tree_hash_root()
    }
}
