//! Attestation matching for epoch processing.
//!
//! All of these look at the pending attestations accumulated for an epoch and
//! narrow them down by how much of the attestation data turned out to lie on
//! the canonical chain.

use std::collections::BTreeSet;
use std::convert::TryFrom;

use helper_functions::beacon_state_accessors::{
    get_attesting_indices, get_block_root, get_block_root_at_slot, get_current_epoch,
    get_previous_epoch, get_total_balance,
};
use types::{
    beacon_state::BeaconState,
    config::Config,
    primitives::{Epoch, Gwei, ValidatorIndex},
    types::PendingAttestation,
};

use crate::error::{ensure, Error};

pub fn get_matching_source_attestations<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
) -> Result<&[PendingAttestation], Error> {
    if epoch == get_current_epoch(state) {
        Ok(&state.current_epoch_attestations)
    } else if epoch == get_previous_epoch(state) {
        Ok(&state.previous_epoch_attestations)
    } else {
        Err(Error::AssertionFailed(
            "attestations are only accumulated for the current and previous epochs",
        ))
    }
}

pub fn get_matching_target_attestations<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
) -> Result<Vec<PendingAttestation>, Error> {
    let epoch_boundary_root = get_block_root(state, epoch)?;
    Ok(get_matching_source_attestations(state, epoch)?
        .iter()
        .filter(|attestation| attestation.data.target.root == epoch_boundary_root)
        .cloned()
        .collect())
}

pub fn get_matching_head_attestations<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
) -> Result<Vec<PendingAttestation>, Error> {
    let mut matching = Vec::new();
    for attestation in get_matching_source_attestations(state, epoch)? {
        if attestation.data.beacon_block_root
            == get_block_root_at_slot(state, attestation.data.slot)?
        {
            matching.push(attestation.clone());
        }
    }
    Ok(matching)
}

pub fn get_unslashed_attesting_indices<C: Config>(
    state: &BeaconState<C>,
    attestations: &[PendingAttestation],
) -> Result<BTreeSet<ValidatorIndex>, Error> {
    let mut indices = BTreeSet::new();
    for attestation in attestations {
        indices.extend(get_attesting_indices(
            state,
            &attestation.data,
            &attestation.aggregation_bits,
        )?);
    }
    for index in &indices {
        let id = usize::try_from(*index)
            .map_err(|_| helper_functions::Error::IndexOutOfRange)?;
        ensure(
            id < state.validators.len(),
            "attesting index is not a known validator",
        )?;
    }
    Ok(indices
        .into_iter()
        .filter(|index| !state.validators[*index as usize].slashed)
        .collect())
}

pub fn get_attesting_balance<C: Config>(
    state: &BeaconState<C>,
    attestations: &[PendingAttestation],
) -> Result<Gwei, Error> {
    let indices = get_unslashed_attesting_indices(state, attestations)?
        .into_iter()
        .collect::<Vec<_>>();
    Ok(get_total_balance(state, &indices)?)
}
