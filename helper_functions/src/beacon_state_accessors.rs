use std::cmp;
use std::collections::BTreeSet;
use std::convert::TryFrom;

use types::{beacon_state::BeaconState, config::*, consts::GENESIS_EPOCH, primitives::*, types::*};

use crate::{
    crypto::{hash, hash_tree_root},
    error::Error,
    math::{int_to_bytes, int_to_bytes_32},
    misc::*,
    predicates::is_active_validator,
};

pub fn get_current_epoch<C: Config>(state: &BeaconState<C>) -> Epoch {
    compute_epoch_at_slot::<C>(state.slot)
}

pub fn get_previous_epoch<C: Config>(state: &BeaconState<C>) -> Epoch {
    let current_epoch = get_current_epoch(state);
    if current_epoch > GENESIS_EPOCH {
        current_epoch - 1
    } else {
        GENESIS_EPOCH
    }
}

pub fn get_block_root<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> Result<H256, Error> {
    get_block_root_at_slot(state, compute_start_slot_at_epoch::<C>(epoch))
}

pub fn get_block_root_at_slot<C: Config>(
    state: &BeaconState<C>,
    slot: Slot,
) -> Result<H256, Error> {
    if !(slot < state.slot && state.slot <= slot + C::slots_per_historical_root()) {
        return Err(Error::SlotOutOfRange);
    }
    Ok(state.block_roots[(slot % C::slots_per_historical_root()) as usize])
}

pub fn get_randao_mix<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> H256 {
    state.randao_mixes[(epoch % C::epochs_per_historical_vector()) as usize]
}

pub fn get_active_validator_indices<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
) -> Vec<ValidatorIndex> {
    state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| is_active_validator(validator, epoch))
        .map(|(index, _)| index as u64)
        .collect()
}

pub fn get_validator_churn_limit<C: Config>(state: &BeaconState<C>) -> u64 {
    let active = get_active_validator_indices(state, get_current_epoch(state));
    cmp::max(
        C::min_per_epoch_churn_limit(),
        active.len() as u64 / C::churn_limit_quotient(),
    )
}

pub fn get_seed<C: Config>(state: &BeaconState<C>, epoch: Epoch, domain_type: DomainType) -> H256 {
    let mix = get_randao_mix(
        state,
        epoch + C::epochs_per_historical_vector() - C::min_seed_lookahead() - 1,
    );

    let mut input = [0_u8; 44];
    input[0..4].copy_from_slice(&int_to_bytes_32(domain_type, 4));
    input[4..12].copy_from_slice(&int_to_bytes(epoch, 8));
    input[12..44].copy_from_slice(mix.as_bytes());
    hash(&input)
}

/// Number of committees in each slot of the epoch containing `slot`.
pub fn get_committee_count_at_slot<C: Config>(state: &BeaconState<C>, slot: Slot) -> u64 {
    let epoch = compute_epoch_at_slot::<C>(slot);
    let active = get_active_validator_indices(state, epoch).len() as u64;
    cmp::max(
        1,
        cmp::min(
            C::max_committees_per_slot(),
            active / C::slots_per_epoch() / C::target_committee_size(),
        ),
    )
}

pub fn get_beacon_committee<C: Config>(
    state: &BeaconState<C>,
    slot: Slot,
    index: CommitteeIndex,
) -> Result<Vec<ValidatorIndex>, Error> {
    let epoch = compute_epoch_at_slot::<C>(slot);
    let committees_per_slot = get_committee_count_at_slot(state, slot);
    if index >= committees_per_slot {
        return Err(Error::IndexOutOfRange);
    }
    compute_committee::<C>(
        &get_active_validator_indices(state, epoch),
        get_seed(state, epoch, DOMAIN_BEACON_ATTESTER),
        (slot % C::slots_per_epoch()) * committees_per_slot + index,
        committees_per_slot * C::slots_per_epoch(),
    )
}

/// Weighted-by-effective-balance rejection sampling over the active set.
pub fn get_beacon_proposer_index<C: Config>(
    state: &BeaconState<C>,
) -> Result<ValidatorIndex, Error> {
    let epoch = get_current_epoch(state);
    let seed = get_seed(state, epoch, DOMAIN_BEACON_PROPOSER);
    let indices = get_active_validator_indices(state, epoch);
    if indices.is_empty() {
        return Err(Error::NoActiveValidators);
    }

    let total = indices.len() as u64;
    // Acceptance is overwhelmingly likely within a few iterations for honest
    // configurations. The cap exists so malformed states with every effective
    // balance at zero fail instead of spinning.
    let max_iterations = cmp::max(1_024, total * 32);
    for i in 0..max_iterations {
        let candidate = indices[compute_shuffled_index::<C>(i % total, total, seed)? as usize];
        let mut input = seed.as_bytes().to_vec();
        input.append(&mut int_to_bytes(i / 32, 8));
        let random_byte = hash(&input)[(i % 32) as usize];
        let effective_balance = state.validators[candidate as usize].effective_balance;
        if effective_balance * 255 >= C::max_effective_balance() * u64::from(random_byte) {
            return Ok(candidate);
        }
    }
    Err(Error::ProposerSamplingDidNotConverge)
}

pub fn get_total_balance<C: Config>(
    state: &BeaconState<C>,
    indices: &[ValidatorIndex],
) -> Result<Gwei, Error> {
    let mut sum: Gwei = 0;
    for index in indices {
        let id = usize::try_from(*index).map_err(|_| Error::IndexOutOfRange)?;
        if id >= state.validators.len() {
            return Err(Error::IndexOutOfRange);
        }
        sum += state.validators[id].effective_balance;
    }
    // Floored at one so callers can divide by it.
    Ok(cmp::max(1, sum))
}

pub fn get_total_active_balance<C: Config>(state: &BeaconState<C>) -> Result<Gwei, Error> {
    get_total_balance(
        state,
        &get_active_validator_indices(state, get_current_epoch(state)),
    )
}

pub fn get_domain<C: Config>(
    state: &BeaconState<C>,
    domain_type: DomainType,
    message_epoch: Option<Epoch>,
) -> Domain {
    let epoch = message_epoch.unwrap_or_else(|| get_current_epoch(state));
    let fork_version = if epoch < state.fork.epoch {
        &state.fork.previous_version
    } else {
        &state.fork.current_version
    };
    compute_domain(domain_type, Some(fork_version))
}

pub fn get_indexed_attestation<C: Config>(
    state: &BeaconState<C>,
    attestation: &Attestation,
) -> Result<IndexedAttestation, Error> {
    let attesting_indices =
        get_attesting_indices(state, &attestation.data, &attestation.aggregation_bits)?;

    Ok(IndexedAttestation {
        attesting_indices: attesting_indices.into_iter().collect(),
        data: attestation.data.clone(),
        signature: attestation.signature,
    })
}

pub fn get_attesting_indices<C: Config>(
    state: &BeaconState<C>,
    data: &AttestationData,
    bits: &types::bitfields::BitList,
) -> Result<BTreeSet<ValidatorIndex>, Error> {
    let committee = get_beacon_committee(state, data.slot, data.index)?;
    if bits.len() != committee.len() {
        return Err(Error::AttestationBitsInvalid);
    }
    Ok(committee
        .iter()
        .enumerate()
        .filter_map(|(i, index)| match bits.get(i) {
            Some(true) => Some(*index),
            _ => None,
        })
        .collect())
}

/// Root of the active validator set at `epoch`, cached in the state once per
/// epoch during final updates.
pub fn get_active_index_root<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> H256 {
    state.active_index_roots[(epoch % C::epochs_per_historical_vector()) as usize]
}

pub fn compute_active_index_root<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> H256 {
    hash_tree_root(&get_active_validator_indices(state, epoch))
}

#[cfg(test)]
mod tests {
    use types::types::{Fork, Validator};

    use super::*;

    fn state_with_validators(validators: Vec<Validator>) -> BeaconState<MainnetConfig> {
        BeaconState {
            validators,
            ..BeaconState::default()
        }
    }

    #[test]
    fn test_get_current_epoch() {
        let state: BeaconState<MainnetConfig> = BeaconState {
            slot: 33,
            ..BeaconState::default()
        };
        assert_eq!(get_current_epoch(&state), 1);
    }

    #[test]
    fn test_get_previous_epoch() {
        let state: BeaconState<MainnetConfig> = BeaconState {
            slot: 65,
            ..BeaconState::default()
        };
        assert_eq!(get_previous_epoch(&state), 1);
    }

    #[test]
    fn test_get_previous_epoch_genesis() {
        let state: BeaconState<MainnetConfig> = BeaconState::default();
        assert_eq!(get_previous_epoch(&state), GENESIS_EPOCH);
    }

    #[test]
    fn test_get_block_root() {
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            slot: 33,
            ..BeaconState::default()
        };
        state.block_roots[32] = H256::from([7; 32]);
        assert_eq!(get_block_root(&state, 1), Ok(H256::from([7; 32])));
    }

    #[test]
    fn test_get_block_root_at_slot() {
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            slot: 2,
            ..BeaconState::default()
        };
        state.block_roots[1] = H256::from([1; 32]);
        assert_eq!(get_block_root_at_slot(&state, 1), Ok(H256::from([1; 32])));
    }

    #[test]
    fn test_get_block_root_at_slot_slot_equals_beacon_state_slot() {
        let state: BeaconState<MainnetConfig> = BeaconState::default();
        assert_eq!(
            get_block_root_at_slot(&state, 0),
            Err(Error::SlotOutOfRange),
        );
    }

    #[test]
    fn test_get_randao_mix() {
        let mut state: BeaconState<MainnetConfig> = BeaconState::default();
        state.randao_mixes[2] = H256::from([5; 32]);
        assert_eq!(get_randao_mix(&state, 2), H256::from([5; 32]));
    }

    #[test]
    fn test_get_seed() {
        let state: BeaconState<MainnetConfig> = BeaconState::default();

        let actual = get_seed(&state, 1, 1);

        let expected = H256::from([
            0x14, 0x81, 0x4a, 0x14, 0x7c, 0x51, 0x6b, 0x2a, 0xc3, 0xda, 0xe0, 0x72, 0xea, 0xf9,
            0xd5, 0xca, 0x2e, 0x3a, 0xbd, 0xca, 0x96, 0x96, 0xd2, 0x44, 0x31, 0x3c, 0x35, 0x12,
            0x99, 0x33, 0xe3, 0x36,
        ]);

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_get_active_validator_indices() {
        let v1 = Validator {
            activation_epoch: 1,
            exit_epoch: 2,
            ..Validator::default()
        };
        let v2 = Validator {
            activation_epoch: 0,
            exit_epoch: 1,
            ..Validator::default()
        };
        let state = state_with_validators(vec![v1, v2]);
        assert_eq!(get_active_validator_indices(&state, 0), vec![1]);
    }

    #[test]
    fn test_get_validator_churn_limit() {
        let v1 = Validator {
            activation_epoch: 0,
            exit_epoch: 2,
            ..Validator::default()
        };
        let state = state_with_validators(vec![v1]);
        assert_eq!(
            get_validator_churn_limit(&state),
            MainnetConfig::min_per_epoch_churn_limit(),
        );
    }

    #[test]
    fn small_validator_sets_get_one_committee_per_slot() {
        let validator = Validator {
            activation_epoch: 0,
            exit_epoch: types::consts::FAR_FUTURE_EPOCH,
            ..Validator::default()
        };
        let state = state_with_validators(vec![validator; 60]);
        assert_eq!(get_committee_count_at_slot(&state, 0), 1);
    }

    #[test]
    fn committees_at_a_slot_partition_the_active_set() {
        let validator = Validator {
            activation_epoch: 0,
            exit_epoch: types::consts::FAR_FUTURE_EPOCH,
            effective_balance: MainnetConfig::max_effective_balance(),
            ..Validator::default()
        };
        let state: BeaconState<MinimalConfig> = BeaconState {
            slot: 8,
            validators: vec![validator; 33],
            ..BeaconState::default()
        };

        let committees_per_slot = get_committee_count_at_slot(&state, 8);
        let mut members = Vec::new();
        for index in 0..committees_per_slot {
            members.extend(
                get_beacon_committee(&state, 8, index).expect("committee exists at this slot"),
            );
        }
        assert!(!members.is_empty());
        let unique = members.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), members.len());
    }

    #[test]
    fn test_get_total_balance() {
        let v1 = Validator {
            effective_balance: 11,
            activation_epoch: 0,
            exit_epoch: 2,
            ..Validator::default()
        };
        let v2 = Validator {
            effective_balance: 7,
            activation_epoch: 0,
            exit_epoch: 1,
            ..Validator::default()
        };
        let v3 = Validator {
            effective_balance: 5,
            activation_epoch: 0,
            exit_epoch: 1,
            ..Validator::default()
        };
        let state = state_with_validators(vec![v1, v2, v3]);
        assert_eq!(get_total_balance(&state, &[0, 2]), Ok(16));
    }

    #[test]
    fn total_balance_of_nobody_is_floored_at_one() {
        let state: BeaconState<MainnetConfig> = BeaconState::default();
        assert_eq!(get_total_balance(&state, &[]), Ok(1));
    }

    #[test]
    fn test_get_total_active_balance() {
        let v1 = Validator {
            effective_balance: 10,
            activation_epoch: 0,
            exit_epoch: 2,
            ..Validator::default()
        };
        let v2 = Validator {
            effective_balance: 2,
            activation_epoch: 0,
            exit_epoch: 1,
            ..Validator::default()
        };
        let state = state_with_validators(vec![v1, v2]);
        assert_eq!(get_total_active_balance(&state), Ok(12));
    }

    #[test]
    fn test_get_domain_previous_version() {
        let state: BeaconState<MainnetConfig> = BeaconState {
            fork: Fork {
                previous_version: Version::from([0, 0, 0, 1]),
                current_version: Version::from([0, 0, 1, 0]),
                epoch: 2,
            },
            ..BeaconState::default()
        };
        assert_eq!(get_domain(&state, 2, Some(1)), 0x0100_0000_0000_0002_u64);
    }

    #[test]
    fn test_get_domain_current_version() {
        let state: BeaconState<MainnetConfig> = BeaconState {
            fork: Fork {
                previous_version: Version::from([0, 0, 0, 1]),
                current_version: Version::from([0, 0, 1, 0]),
                epoch: 1,
            },
            ..BeaconState::default()
        };
        assert_eq!(get_domain(&state, 2, Some(1)), 0x0001_0000_0000_0002_u64);
    }

    #[test]
    fn proposer_is_drawn_from_the_active_set() {
        let validator = Validator {
            activation_epoch: 0,
            exit_epoch: types::consts::FAR_FUTURE_EPOCH,
            effective_balance: MainnetConfig::max_effective_balance(),
            ..Validator::default()
        };
        let state = state_with_validators(vec![validator; 8]);
        let proposer = get_beacon_proposer_index(&state).expect("a proposer is found");
        assert!(proposer < 8);
    }

    #[test]
    fn proposer_selection_fails_without_active_validators() {
        let state: BeaconState<MainnetConfig> = BeaconState::default();
        assert_eq!(
            get_beacon_proposer_index(&state),
            Err(Error::NoActiveValidators),
        );
    }
}
