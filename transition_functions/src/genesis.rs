//! Genesis state construction.
//!
//! Deposits collected from the deposit contract before genesis are applied
//! without Merkle proofs: the state is built from the full deposit list, so
//! the list itself is the authority.

use helper_functions::{
    beacon_state_accessors::{compute_active_index_root, get_active_validator_indices},
    crypto::hash_tree_root,
};
use types::{
    beacon_state::BeaconState,
    config::Config,
    consts::GENESIS_EPOCH,
    primitives::{UnixSeconds, H256},
    types::{BeaconBlock, BeaconBlockBody, BeaconBlockHeader, Deposit, Eth1Data},
};

use crate::block_processing::apply_deposit;
use crate::error::Error;

pub fn initialize_beacon_state_from_eth1<C: Config>(
    eth1_block_hash: H256,
    genesis_time: UnixSeconds,
    deposits: &[Deposit],
) -> Result<BeaconState<C>, Error> {
    let mut state = BeaconState {
        genesis_time,
        latest_block_header: BeaconBlockHeader {
            body_root: hash_tree_root(&BeaconBlockBody::default()),
            ..BeaconBlockHeader::default()
        },
        eth1_data: Eth1Data {
            deposit_root: hash_tree_root(
                &deposits
                    .iter()
                    .map(|deposit| deposit.data.clone())
                    .collect::<Vec<_>>(),
            ),
            deposit_count: deposits.len() as u64,
            block_hash: eth1_block_hash,
        },
        ..BeaconState::default()
    };

    // Seed the randomness accumulator with the eth1 block hash
    for mix in state.randao_mixes.iter_mut() {
        *mix = eth1_block_hash;
    }

    for deposit in deposits {
        state.eth1_deposit_index += 1;
        apply_deposit(&mut state, deposit, true)?;
    }

    // Process activations
    for validator in state.validators.iter_mut() {
        if validator.effective_balance == C::max_effective_balance() {
            validator.activation_eligibility_epoch = GENESIS_EPOCH;
            validator.activation_epoch = GENESIS_EPOCH;
        }
    }

    let genesis_active_index_root = compute_active_index_root(&state, GENESIS_EPOCH);
    for root in state.active_index_roots.iter_mut() {
        *root = genesis_active_index_root;
    }

    Ok(state)
}

pub fn is_valid_genesis_state<C: Config>(state: &BeaconState<C>) -> bool {
    state.genesis_time >= C::min_genesis_time()
        && get_active_validator_indices(state, GENESIS_EPOCH).len() as u64
            >= C::min_genesis_active_validator_count()
}

/// The block every chain starts from. It commits to the genesis state and has
/// no signature; its root anchors the fork choice.
pub fn genesis_block<C: Config>(state: &BeaconState<C>) -> BeaconBlock {
    BeaconBlock {
        state_root: hash_tree_root(state),
        ..BeaconBlock::default()
    }
}
