use std::{cmp, mem};

use itertools::{Either, Itertools};
use log::info;
use types::{
    beacon_state::BeaconState,
    config::Config,
    consts::GENESIS_EPOCH,
    primitives::{Epoch, Gwei, ValidatorIndex},
    types::{Checkpoint, HistoricalBatch},
};

use helper_functions::{
    beacon_state_accessors::{
        compute_active_index_root, get_block_root, get_current_epoch, get_previous_epoch,
        get_randao_mix, get_total_active_balance, get_validator_churn_limit,
    },
    beacon_state_mutators::{decrease_balance, initiate_validator_exit},
    crypto::hash_tree_root,
    misc::compute_activation_exit_epoch,
    predicates::{is_active_validator, is_eligible_for_activation, is_eligible_for_activation_queue},
};

use crate::attestations::{get_attesting_balance, get_matching_target_attestations};
use crate::error::Error;
use crate::rewards_and_penalties::process_rewards_and_penalties;

pub fn process_epoch<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    process_justification_and_finalization(state)?;
    process_rewards_and_penalties(state)?;
    process_registry_updates(state)?;
    process_slashings(state)?;
    process_final_updates(state)?;
    Ok(())
}

pub fn process_justification_and_finalization<C: Config>(
    state: &mut BeaconState<C>,
) -> Result<(), Error> {
    let current_epoch = get_current_epoch(state);
    if current_epoch <= GENESIS_EPOCH + 1 {
        return Ok(());
    }
    let previous_epoch = get_previous_epoch(state);
    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;

    // Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.justification_bits.shift_up();
    let total_active_balance = get_total_active_balance(state)?;

    let previous_target_balance =
        get_attesting_balance(state, &get_matching_target_attestations(state, previous_epoch)?)?;
    if previous_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: get_block_root(state, previous_epoch)?,
        };
        state.justification_bits.set(1, true);
    }
    let current_target_balance =
        get_attesting_balance(state, &get_matching_target_attestations(state, current_epoch)?)?;
    if current_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: get_block_root(state, current_epoch)?,
        };
        state.justification_bits.set(0, true);
    }

    // Process finalizations
    let old_finalized_checkpoint = state.finalized_checkpoint;
    let bits = state.justification_bits;
    // The 2nd/3rd/4th most recent epochs are justified, the 4th was the source
    if bits.all(1..4) && old_previous_justified_checkpoint.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 2nd/3rd most recent epochs are justified, the 3rd was the source
    if bits.all(1..3) && old_previous_justified_checkpoint.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 1st/2nd/3rd most recent epochs are justified, the 3rd was the source
    if bits.all(0..3) && old_current_justified_checkpoint.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }
    // The 1st/2nd most recent epochs are justified, the 2nd was the source
    if bits.all(0..2) && old_current_justified_checkpoint.epoch + 1 == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    if state.finalized_checkpoint != old_finalized_checkpoint {
        info!("checkpoint {:?} finalized", state.finalized_checkpoint);
    }
    Ok(())
}

pub fn process_registry_updates<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    let current_epoch = get_current_epoch(state);

    let (newly_eligible, ejected): (Vec<_>, Vec<_>) = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            is_eligible_for_activation_queue::<C>(validator)
                || (is_active_validator(validator, current_epoch)
                    && validator.effective_balance <= C::ejection_balance())
        })
        .partition_map(|(index, validator)| {
            if is_eligible_for_activation_queue::<C>(validator) {
                Either::Left(index)
            } else {
                Either::Right(index)
            }
        });

    for index in newly_eligible {
        state.validators[index].activation_eligibility_epoch = current_epoch + 1;
    }
    for index in ejected {
        initiate_validator_exit(state, index as ValidatorIndex)?;
    }

    // Dequeue in (eligibility epoch, index) order up to the churn limit.
    let activation_queue = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| is_eligible_for_activation(state, validator))
        .sorted_by_key(|(index, validator)| (validator.activation_eligibility_epoch, *index))
        .map(|(index, _)| index)
        .collect_vec();

    let churn_limit = get_validator_churn_limit(state) as usize;
    let activation_epoch = compute_activation_exit_epoch::<C>(current_epoch);
    for index in activation_queue.into_iter().take(churn_limit) {
        state.validators[index].activation_epoch = activation_epoch;
    }
    Ok(())
}

pub fn process_slashings<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    let epoch = get_current_epoch(state);
    let total_balance = get_total_active_balance(state)?;
    let slashings_sum = state.slashings.iter().sum::<Gwei>();
    let adjusted_slashings = cmp::min(slashings_sum * 3, total_balance);

    let due: Vec<(ValidatorIndex, Gwei)> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            validator.slashed
                && epoch + C::epochs_per_slashings_vector() / 2 == validator.withdrawable_epoch
        })
        .map(|(index, validator)| (index as ValidatorIndex, validator.effective_balance))
        .collect();

    for (index, effective_balance) in due {
        let increment = C::effective_balance_increment();
        let penalty_numerator = effective_balance / increment * adjusted_slashings;
        let penalty = penalty_numerator / total_balance * increment;
        decrease_balance(state, index, penalty)?;
    }
    Ok(())
}

pub fn process_final_updates<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    let current_epoch = get_current_epoch(state);
    let next_epoch: Epoch = current_epoch + 1;

    // Reset eth1 data votes at the end of each voting period
    if (state.slot + 1) % C::slots_per_eth1_voting_period() == 0 {
        state.eth1_data_votes.clear();
    }

    // Update effective balances with hysteresis
    for (index, validator) in state.validators.iter_mut().enumerate() {
        let balance = state.balances[index];
        let half_increment = C::effective_balance_increment() / 2;
        if balance < validator.effective_balance
            || validator.effective_balance + 3 * half_increment < balance
        {
            validator.effective_balance = cmp::min(
                balance - balance % C::effective_balance_increment(),
                C::max_effective_balance(),
            );
        }
    }

    // Reset slashings for the slot the vector is about to wrap onto
    state.slashings[(next_epoch % C::epochs_per_slashings_vector()) as usize] = 0;

    // Set randao mix
    state.randao_mixes[(next_epoch % C::epochs_per_historical_vector()) as usize] =
        get_randao_mix(state, current_epoch);

    // Cache the active index root for the next epoch
    state.active_index_roots[(next_epoch % C::epochs_per_historical_vector()) as usize] =
        compute_active_index_root(state, next_epoch);

    // Set historical root accumulator
    if next_epoch % (C::slots_per_historical_root() / C::slots_per_epoch()) == 0 {
        let historical_batch = HistoricalBatch {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };
        state.historical_roots.push(hash_tree_root(&historical_batch));
    }

    // Rotate current/previous epoch attestations
    state.previous_epoch_attestations =
        mem::replace(&mut state.current_epoch_attestations, vec![]);
    Ok(())
}

#[cfg(test)]
mod process_epoch_tests {
    use types::bitfields::BitList;
    use types::config::MinimalConfig;
    use types::consts::FAR_FUTURE_EPOCH;
    use types::primitives::H256;
    use types::types::{AttestationData, Eth1Data, PendingAttestation, Validator};

    use helper_functions::beacon_state_accessors::get_beacon_committee;

    use super::*;

    fn active_validator() -> Validator {
        Validator {
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            effective_balance: MinimalConfig::max_effective_balance(),
            ..Validator::default()
        }
    }

    fn state_at_slot(slot: u64, validator_count: usize) -> BeaconState<MinimalConfig> {
        BeaconState {
            slot,
            validators: vec![active_validator(); validator_count],
            balances: vec![MinimalConfig::max_effective_balance(); validator_count],
            ..BeaconState::default()
        }
    }

    /// Pending attestations with full participation for every slot of `epoch`,
    /// targeting the epoch boundary root recorded in the state.
    fn full_participation_attestations(
        state: &BeaconState<MinimalConfig>,
        epoch: Epoch,
    ) -> Vec<PendingAttestation> {
        let start = epoch * MinimalConfig::slots_per_epoch();
        let target_root = get_block_root(state, epoch).expect("the boundary root is in range");
        let mut attestations = Vec::new();
        for slot in start..start + MinimalConfig::slots_per_epoch() {
            let committee =
                get_beacon_committee(state, slot, 0).expect("the committee exists");
            let mut bits = BitList::with_length(committee.len());
            for position in 0..committee.len() {
                bits.set(position, true);
            }
            attestations.push(PendingAttestation {
                aggregation_bits: bits,
                data: AttestationData {
                    slot,
                    index: 0,
                    target: Checkpoint {
                        epoch,
                        root: target_root,
                    },
                    ..AttestationData::default()
                },
                inclusion_delay: 1,
                proposer_index: 0,
            });
        }
        attestations
    }

    #[test]
    fn supermajority_justifies_and_rule_four_finalizes() {
        // Current epoch 3, with epoch 2 already justified in the newest bit.
        let mut state = state_at_slot(4 * MinimalConfig::slots_per_epoch() - 1, 8);
        let justified = Checkpoint {
            epoch: 2,
            root: H256::repeat_byte(2),
        };
        state.current_justified_checkpoint = justified;
        state.previous_justified_checkpoint = justified;
        state.justification_bits.set(0, true);
        state.current_epoch_attestations = full_participation_attestations(&state, 3);

        process_justification_and_finalization(&mut state)
            .expect("the state is well formed");

        assert_eq!(state.current_justified_checkpoint.epoch, 3);
        assert!(state.justification_bits.get(0));
        assert!(state.justification_bits.get(1));
        // Rule: the 1st/2nd most recent epochs are justified and the 2nd was
        // the source, so epoch 2 is finalized.
        assert_eq!(state.finalized_checkpoint, justified);
    }

    #[test]
    fn a_previous_epoch_supermajority_finalizes_by_rule_two() {
        // Current epoch 4. Epoch 2 is justified, epoch 3's attestations only
        // arrive now, as previous-epoch attestations.
        let mut state = state_at_slot(5 * MinimalConfig::slots_per_epoch() - 1, 8);
        let justified = Checkpoint {
            epoch: 2,
            root: H256::repeat_byte(2),
        };
        state.previous_justified_checkpoint = justified;
        state.current_justified_checkpoint = justified;
        state.justification_bits.set(1, true);
        state.previous_epoch_attestations = full_participation_attestations(&state, 3);

        process_justification_and_finalization(&mut state)
            .expect("the state is well formed");

        assert_eq!(state.current_justified_checkpoint.epoch, 3);
        assert!(!state.justification_bits.get(0));
        // Rule: the 2nd/3rd most recent epochs are justified and the 3rd was
        // the source, so epoch 2 is finalized.
        assert_eq!(state.finalized_checkpoint, justified);
    }

    #[test]
    fn a_double_justification_finalizes_by_rule_three() {
        // Current epoch 4. Epochs 1 and 2 are justified; the attestations of
        // epochs 3 and 4 both arrive in epoch 4's accumulators.
        let mut state = state_at_slot(5 * MinimalConfig::slots_per_epoch() - 1, 8);
        let source = Checkpoint {
            epoch: 2,
            root: H256::repeat_byte(2),
        };
        state.previous_justified_checkpoint = Checkpoint {
            epoch: 1,
            root: H256::repeat_byte(1),
        };
        state.current_justified_checkpoint = source;
        state.justification_bits.set(1, true);
        state.previous_epoch_attestations = full_participation_attestations(&state, 3);
        state.current_epoch_attestations = full_participation_attestations(&state, 4);

        process_justification_and_finalization(&mut state)
            .expect("the state is well formed");

        assert_eq!(state.current_justified_checkpoint.epoch, 4);
        // Rule: the 1st/2nd/3rd most recent epochs are justified and the 3rd
        // was the source, so epoch 2 is finalized.
        assert_eq!(state.finalized_checkpoint, source);
    }

    #[test]
    fn a_four_epoch_chain_finalizes_by_rule_one() {
        // Current epoch 5. Epochs 2 and 3 are justified, epoch 4's
        // attestations arrive as previous-epoch attestations, epoch 5 has
        // none yet.
        let mut state = state_at_slot(6 * MinimalConfig::slots_per_epoch() - 1, 8);
        let source = Checkpoint {
            epoch: 2,
            root: H256::repeat_byte(2),
        };
        state.previous_justified_checkpoint = source;
        state.current_justified_checkpoint = Checkpoint {
            epoch: 3,
            root: H256::repeat_byte(3),
        };
        state.justification_bits.set(1, true);
        state.justification_bits.set(2, true);
        state.previous_epoch_attestations = full_participation_attestations(&state, 4);

        process_justification_and_finalization(&mut state)
            .expect("the state is well formed");

        assert_eq!(state.current_justified_checkpoint.epoch, 4);
        // Rule: the 2nd/3rd/4th most recent epochs are justified and the 4th
        // was the source, so epoch 2 is finalized.
        assert_eq!(state.finalized_checkpoint, source);
    }

    #[test]
    fn no_finalization_without_a_supermajority() {
        let mut state = state_at_slot(4 * MinimalConfig::slots_per_epoch() - 1, 8);
        let justified = Checkpoint {
            epoch: 2,
            root: H256::repeat_byte(2),
        };
        state.current_justified_checkpoint = justified;
        state.justification_bits.set(0, true);
        // No attestations at all this epoch.

        process_justification_and_finalization(&mut state)
            .expect("the state is well formed");

        assert_eq!(state.current_justified_checkpoint, justified);
        assert!(!state.justification_bits.get(0));
        assert_eq!(state.finalized_checkpoint, Checkpoint::default());
    }

    #[test]
    fn registry_updates_queue_and_eject() {
        let mut state = state_at_slot(MinimalConfig::slots_per_epoch(), 8);
        // A fully funded deposit that has not been queued yet.
        state.validators.push(Validator {
            effective_balance: MinimalConfig::max_effective_balance(),
            ..Validator::default()
        });
        state.balances.push(MinimalConfig::max_effective_balance());
        // An active validator whose stake has leaked away.
        state.validators[0].effective_balance = MinimalConfig::ejection_balance();

        process_registry_updates(&mut state).expect("the state is well formed");

        assert_eq!(state.validators[8].activation_eligibility_epoch, 2);
        assert_ne!(state.validators[0].exit_epoch, FAR_FUTURE_EPOCH);
    }

    #[test]
    fn registry_updates_activate_eligible_validators_after_finality() {
        let mut state = state_at_slot(MinimalConfig::slots_per_epoch(), 8);
        state.finalized_checkpoint.epoch = 1;
        state.validators.push(Validator {
            effective_balance: MinimalConfig::max_effective_balance(),
            activation_eligibility_epoch: 1,
            ..Validator::default()
        });
        state.balances.push(MinimalConfig::max_effective_balance());

        process_registry_updates(&mut state).expect("the state is well formed");

        assert_eq!(
            state.validators[8].activation_epoch,
            compute_activation_exit_epoch::<MinimalConfig>(1),
        );
    }

    #[test]
    fn slashing_decay_penalizes_at_the_halfway_point() {
        let mut state = state_at_slot(0, 8);
        let halfway = MinimalConfig::epochs_per_slashings_vector() / 2;
        state.validators[0].slashed = true;
        state.validators[0].withdrawable_epoch = halfway;
        state.slashings[0] = MinimalConfig::max_effective_balance();

        process_slashings(&mut state).expect("the state is well formed");

        let total = 8 * MinimalConfig::max_effective_balance();
        let adjusted = cmp::min(3 * MinimalConfig::max_effective_balance(), total);
        let increment = MinimalConfig::effective_balance_increment();
        let expected_penalty = MinimalConfig::max_effective_balance() / increment * adjusted
            / total
            * increment;
        assert_eq!(
            state.balances[0],
            MinimalConfig::max_effective_balance() - expected_penalty,
        );
        // Nobody else is due.
        assert_eq!(state.balances[1], MinimalConfig::max_effective_balance());
    }

    #[test]
    fn final_updates_apply_hysteresis_and_rotate_accumulators() {
        let mut state = state_at_slot(MinimalConfig::slots_per_epoch() - 1, 8);
        let increment = MinimalConfig::effective_balance_increment();
        state.validators[0].effective_balance = MinimalConfig::max_effective_balance() - increment;
        // Up by less than one and a half increments: no update.
        state.balances[1] += increment;
        state.current_epoch_attestations = vec![PendingAttestation::default()];

        process_final_updates(&mut state).expect("the state is well formed");

        // Validator 0's balance sits a whole increment above its effective
        // balance, within the hysteresis band, so it stays put.
        assert_eq!(
            state.validators[0].effective_balance,
            MinimalConfig::max_effective_balance() - increment,
        );
        assert_eq!(
            state.validators[1].effective_balance,
            MinimalConfig::max_effective_balance(),
        );
        assert!(state.current_epoch_attestations.is_empty());
        assert_eq!(state.previous_epoch_attestations.len(), 1);
        assert_ne!(state.active_index_roots[1], H256::zero());
    }

    #[test]
    fn final_updates_clear_eth1_votes_at_the_period_boundary() {
        let last_slot_of_period = MinimalConfig::slots_per_eth1_voting_period() - 1;
        let mut state = state_at_slot(last_slot_of_period, 8);
        state.eth1_data_votes = vec![Eth1Data::default(); 3];

        process_final_updates(&mut state).expect("the state is well formed");

        assert!(state.eth1_data_votes.is_empty());
    }

    #[test]
    fn final_updates_keep_eth1_votes_mid_period() {
        let mut state = state_at_slot(MinimalConfig::slots_per_eth1_voting_period(), 8);
        state.eth1_data_votes = vec![Eth1Data::default(); 3];

        process_final_updates(&mut state).expect("the state is well formed");

        assert_eq!(state.eth1_data_votes.len(), 3);
    }
}
