use std::cmp;
use std::convert::TryFrom;

use types::{beacon_state::BeaconState, config::Config, consts::FAR_FUTURE_EPOCH, primitives::*};

use crate::{
    beacon_state_accessors::{
        get_beacon_proposer_index, get_current_epoch, get_validator_churn_limit,
    },
    error::Error,
    misc::compute_activation_exit_epoch,
};

pub fn increase_balance<C: Config>(
    state: &mut BeaconState<C>,
    index: ValidatorIndex,
    delta: Gwei,
) -> Result<(), Error> {
    let id = checked_index(state, index)?;
    state.balances[id] += delta;
    Ok(())
}

/// Saturating: a delta larger than the balance leaves exactly zero.
pub fn decrease_balance<C: Config>(
    state: &mut BeaconState<C>,
    index: ValidatorIndex,
    delta: Gwei,
) -> Result<(), Error> {
    let id = checked_index(state, index)?;
    state.balances[id] = state.balances[id].saturating_sub(delta);
    Ok(())
}

/// Assigns the validator an exit epoch in the earliest epoch whose exit queue
/// has room under the churn limit. Does nothing if an exit epoch is already
/// set.
pub fn initiate_validator_exit<C: Config>(
    state: &mut BeaconState<C>,
    index: ValidatorIndex,
) -> Result<(), Error> {
    let id = checked_index(state, index)?;
    if state.validators[id].exit_epoch != FAR_FUTURE_EPOCH {
        return Ok(());
    }

    let max_exit_epoch = state
        .validators
        .iter()
        .map(|validator| validator.exit_epoch)
        .filter(|exit_epoch| *exit_epoch != FAR_FUTURE_EPOCH)
        .max()
        .unwrap_or(0);
    let mut exit_queue_epoch = cmp::max(
        max_exit_epoch,
        compute_activation_exit_epoch::<C>(get_current_epoch(state)),
    );
    let exit_queue_churn = state
        .validators
        .iter()
        .filter(|validator| validator.exit_epoch == exit_queue_epoch)
        .count() as u64;
    if exit_queue_churn >= get_validator_churn_limit(state) {
        exit_queue_epoch += 1;
    }

    let validator = &mut state.validators[id];
    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch = exit_queue_epoch + C::min_validator_withdrawability_delay();
    Ok(())
}

/// Exits and penalizes the validator, crediting the whistleblower (the block
/// proposer when none is named).
pub fn slash_validator<C: Config>(
    state: &mut BeaconState<C>,
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
) -> Result<(), Error> {
    let id = checked_index(state, slashed_index)?;
    let epoch = get_current_epoch(state);

    initiate_validator_exit(state, slashed_index)?;

    let effective_balance = {
        let validator = &mut state.validators[id];
        validator.slashed = true;
        validator.withdrawable_epoch = cmp::max(
            validator.withdrawable_epoch,
            epoch + C::epochs_per_slashings_vector(),
        );
        validator.effective_balance
    };

    state.slashings[(epoch % C::epochs_per_slashings_vector()) as usize] += effective_balance;
    decrease_balance(
        state,
        slashed_index,
        effective_balance / C::min_slashing_penalty_quotient(),
    )?;

    let proposer_index = get_beacon_proposer_index(state)?;
    let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward = effective_balance / C::whistleblower_reward_quotient();
    let proposer_reward = whistleblower_reward / C::proposer_reward_quotient();
    increase_balance(state, proposer_index, proposer_reward)?;
    increase_balance(
        state,
        whistleblower_index,
        whistleblower_reward - proposer_reward,
    )?;
    Ok(())
}

fn checked_index<C: Config>(
    state: &BeaconState<C>,
    index: ValidatorIndex,
) -> Result<usize, Error> {
    let id = usize::try_from(index).map_err(|_| Error::IndexOutOfRange)?;
    if id >= state.validators.len() || id >= state.balances.len() {
        return Err(Error::IndexOutOfRange);
    }
    Ok(id)
}
