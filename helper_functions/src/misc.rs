use std::cmp::max;

use types::config::Config;
use types::primitives::*;

use crate::{
    crypto::hash,
    error::Error,
    math::{bytes_to_int, int_to_bytes, int_to_bytes_32},
};

pub fn compute_epoch_at_slot<C: Config>(slot: Slot) -> Epoch {
    slot / C::slots_per_epoch()
}

pub fn compute_start_slot_at_epoch<C: Config>(epoch: Epoch) -> Slot {
    epoch * C::slots_per_epoch()
}

pub fn compute_activation_exit_epoch<C: Config>(epoch: Epoch) -> Epoch {
    epoch + 1 + C::activation_exit_delay()
}

pub fn compute_domain(domain_type: DomainType, fork_version: Option<&Version>) -> Domain {
    let default_version = Version::default();
    let version = fork_version.unwrap_or(&default_version);

    let mut bytes = [0_u8; 8];
    bytes[0..4].copy_from_slice(&domain_type.to_le_bytes());
    bytes[4..8].copy_from_slice(version.as_array());
    bytes_to_int(bytes)
}

/// The swap-or-not shuffle applied to a single index.
pub fn compute_shuffled_index<C: Config>(
    mut index: ValidatorIndex,
    index_count: u64,
    seed: H256,
) -> Result<ValidatorIndex, Error> {
    if index >= index_count {
        return Err(Error::IndexOutOfRange);
    }
    for current_round in 0..C::shuffle_round_count() {
        let pivot = round_pivot(seed, current_round) % index_count;
        let flip = (pivot + index_count - index) % index_count;
        let position = max(index, flip);
        let source = source_hash(seed, current_round, position / 256);
        let byte = source[((position % 256) / 8) as usize];
        let bit = (byte >> (position % 8)) % 2;
        index = if bit == 0 { index } else { flip };
    }
    Ok(index)
}

/// The whole-range form of the shuffle: entry `i` of the result equals
/// `compute_shuffled_index(i, index_count, seed)`. Applies each round to every
/// index while reusing the round pivot and the per-256-position source hashes,
/// so the equality holds by construction.
pub fn compute_shuffled_indices<C: Config>(index_count: u64, seed: H256) -> Vec<ValidatorIndex> {
    let mut indices = (0..index_count).collect::<Vec<_>>();
    if index_count == 0 {
        return indices;
    }
    let source_count = (index_count + 255) / 256;
    for current_round in 0..C::shuffle_round_count() {
        let pivot = round_pivot(seed, current_round) % index_count;
        let mut sources: Vec<Option<H256>> = vec![None; source_count as usize];
        for index in indices.iter_mut() {
            let flip = (pivot + index_count - *index) % index_count;
            let position = max(*index, flip);
            let source = sources[(position / 256) as usize].get_or_insert_with(|| {
                source_hash(seed, current_round, position / 256)
            });
            let byte = source[((position % 256) / 8) as usize];
            let bit = (byte >> (position % 8)) % 2;
            if bit == 1 {
                *index = flip;
            }
        }
    }
    indices
}

fn round_pivot(seed: H256, current_round: u8) -> u64 {
    let mut input = seed.as_bytes().to_vec();
    input.append(&mut int_to_bytes(u64::from(current_round), 1));
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&hash(&input)[..8]);
    bytes_to_int(bytes)
}

fn source_hash(seed: H256, current_round: u8, chunk: u64) -> H256 {
    let mut input = seed.as_bytes().to_vec();
    input.append(&mut int_to_bytes(u64::from(current_round), 1));
    input.append(&mut int_to_bytes_32(chunk as u32, 4));
    hash(&input)
}

/// Slices committee `index` out of the shuffled ordering of `indices`.
pub fn compute_committee<C: Config>(
    indices: &[ValidatorIndex],
    seed: H256,
    index: u64,
    count: u64,
) -> Result<Vec<ValidatorIndex>, Error> {
    if count == 0 || index >= count {
        return Err(Error::IndexOutOfRange);
    }
    let total = indices.len() as u64;
    let start = total * index / count;
    let end = total * (index + 1) / count;
    (start..end)
        .map(|position| {
            let shuffled = compute_shuffled_index::<C>(position, total, seed)?;
            Ok(indices[shuffled as usize])
        })
        .collect()
}
