use std::convert::TryFrom;

use integer_sqrt::IntegerSquareRoot;
use types::{
    beacon_state::BeaconState,
    config::Config,
    consts::{BASE_REWARDS_PER_EPOCH, GENESIS_EPOCH},
    primitives::{Gwei, ValidatorIndex},
};

use helper_functions::{
    beacon_state_accessors::{
        get_attesting_indices, get_current_epoch, get_previous_epoch, get_total_active_balance,
        get_total_balance,
    },
    beacon_state_mutators::{decrease_balance, increase_balance},
    predicates::is_active_validator,
};

use crate::attestations::{
    get_matching_head_attestations, get_matching_source_attestations,
    get_matching_target_attestations, get_unslashed_attesting_indices,
};
use crate::error::Error;

pub fn get_base_reward<C: Config>(
    state: &BeaconState<C>,
    index: ValidatorIndex,
    total_balance: Gwei,
) -> Result<Gwei, Error> {
    let id = usize::try_from(index).map_err(|_| helper_functions::Error::IndexOutOfRange)?;
    let effective_balance = state
        .validators
        .get(id)
        .ok_or(helper_functions::Error::IndexOutOfRange)?
        .effective_balance;
    // The division order matters bit for bit. Simplifying this expression
    // algebraically changes the truncation points.
    Ok(effective_balance * C::base_reward_factor()
        / total_balance.integer_sqrt()
        / BASE_REWARDS_PER_EPOCH)
}

/// Per-validator balance deltas for the previous epoch, computed from the
/// source, target and head matching sets, inclusion-delay micro-rewards and
/// the inactivity leak.
pub fn get_attestation_deltas<C: Config>(
    state: &BeaconState<C>,
) -> Result<(Vec<Gwei>, Vec<Gwei>), Error> {
    let previous_epoch = get_previous_epoch(state);
    let total_balance = get_total_active_balance(state)?;
    let mut rewards = vec![0; state.validators.len()];
    let mut penalties = vec![0; state.validators.len()];

    let eligible_validator_indices = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            is_active_validator(validator, previous_epoch)
                || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
        })
        .map(|(index, _)| index as ValidatorIndex)
        .collect::<Vec<_>>();

    // Micro-incentives for matching source, target and head.
    let source_attestations = get_matching_source_attestations(state, previous_epoch)?.to_vec();
    let target_attestations = get_matching_target_attestations(state, previous_epoch)?;
    let head_attestations = get_matching_head_attestations(state, previous_epoch)?;

    let matching_sets: [&[_]; 3] = [
        &source_attestations,
        &target_attestations,
        &head_attestations,
    ];
    for attestations in matching_sets.iter().copied() {
        let unslashed_attesting_indices = get_unslashed_attesting_indices(state, attestations)?;
        let attesting_balance = get_total_balance(
            state,
            &unslashed_attesting_indices
                .iter()
                .copied()
                .collect::<Vec<_>>(),
        )?;
        for index in &eligible_validator_indices {
            let base_reward = get_base_reward(state, *index, total_balance)?;
            if unslashed_attesting_indices.contains(index) {
                rewards[*index as usize] += base_reward * attesting_balance / total_balance;
            } else {
                penalties[*index as usize] += base_reward;
            }
        }
    }

    // Proposer and inclusion-delay micro-rewards, paid for the earliest
    // inclusion of each attester's vote.
    for index in get_unslashed_attesting_indices(state, &source_attestations)? {
        let attestation = source_attestations
            .iter()
            .filter(|attestation| {
                get_attesting_indices(state, &attestation.data, &attestation.aggregation_bits)
                    .map(|indices| indices.contains(&index))
                    .unwrap_or(false)
            })
            .min_by_key(|attestation| attestation.inclusion_delay)
            .ok_or(Error::AssertionFailed(
                "an attesting index must come from some attestation",
            ))?;
        let base_reward = get_base_reward(state, index, total_balance)?;
        let proposer_reward = base_reward / C::proposer_reward_quotient();
        rewards[attestation.proposer_index as usize] += proposer_reward;
        let max_attester_reward = base_reward - proposer_reward;
        rewards[index as usize] += max_attester_reward / attestation.inclusion_delay;
    }

    // Inactivity penalty, once finality has been delayed for too long.
    let finality_delay = previous_epoch - state.finalized_checkpoint.epoch;
    if finality_delay > C::min_epochs_to_inactivity_penalty() {
        let matching_target_attesting_indices =
            get_unslashed_attesting_indices(state, &target_attestations)?;
        for index in &eligible_validator_indices {
            let base_reward = get_base_reward(state, *index, total_balance)?;
            penalties[*index as usize] += BASE_REWARDS_PER_EPOCH * base_reward;
            if !matching_target_attesting_indices.contains(index) {
                penalties[*index as usize] += state.validators[*index as usize].effective_balance
                    * finality_delay
                    / C::inactivity_penalty_quotient();
            }
        }
    }

    Ok((rewards, penalties))
}

pub fn process_rewards_and_penalties<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    if get_current_epoch(state) == GENESIS_EPOCH {
        return Ok(());
    }
    let (rewards, penalties) = get_attestation_deltas(state)?;
    for (index, reward) in rewards.into_iter().enumerate() {
        increase_balance(state, index as ValidatorIndex, reward)?;
    }
    for (index, penalty) in penalties.into_iter().enumerate() {
        decrease_balance(state, index as ValidatorIndex, penalty)?;
    }
    Ok(())
}
