use std::convert::TryFrom;

use types::{
    beacon_state::BeaconState,
    config::{Config, DOMAIN_BEACON_ATTESTER},
    consts::FAR_FUTURE_EPOCH,
    primitives::*,
    types::{AttestationData, IndexedAttestation, Validator},
};

use crate::{
    beacon_state_accessors::get_domain,
    crypto::{bls_verify_multiple, hash_concat, hash_tree_root},
    error::Error,
};

pub fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.is_active_validator(epoch)
}

pub fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.is_slashable_validator(epoch)
}

pub fn is_slashable_attestation_data(data_1: &AttestationData, data_2: &AttestationData) -> bool {
    data_1.is_slashable_attestation_data(data_2)
}

/// The validator may join the activation queue once fully funded.
pub fn is_eligible_for_activation_queue<C: Config>(validator: &Validator) -> bool {
    validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH
        && validator.effective_balance == C::max_effective_balance()
}

/// The validator may be dequeued once its eligibility has been finalized.
pub fn is_eligible_for_activation<C: Config>(
    state: &BeaconState<C>,
    validator: &Validator,
) -> bool {
    validator.activation_eligibility_epoch <= state.finalized_checkpoint.epoch
        && validator.activation_epoch == FAR_FUTURE_EPOCH
}

/// Checks that the indices are sorted and unique and that the aggregate
/// signature covers the attestation data under the attester domain of the
/// target epoch.
pub fn validate_indexed_attestation<C: Config>(
    state: &BeaconState<C>,
    indexed_attestation: &IndexedAttestation,
    verify_signature: bool,
) -> Result<(), Error> {
    let indices = &indexed_attestation.attesting_indices;

    let sorted_and_unique = indices.windows(2).all(|pair| pair[0] < pair[1]);
    if !sorted_and_unique {
        return Err(Error::IndicesNotSortedAndUnique);
    }

    let mut pubkeys = Vec::with_capacity(indices.len());
    for index in indices {
        let id = usize::try_from(*index).map_err(|_| Error::IndexOutOfRange)?;
        let validator = state.validators.get(id).ok_or(Error::IndexOutOfRange)?;
        pubkeys.push(validator.pubkey);
    }

    if verify_signature {
        let message = hash_tree_root(&indexed_attestation.data);
        let messages = vec![message; pubkeys.len()];
        let domain = get_domain(
            state,
            DOMAIN_BEACON_ATTESTER,
            Some(indexed_attestation.data.target.epoch),
        );
        if !bls_verify_multiple(&pubkeys, &messages, &indexed_attestation.signature, domain) {
            return Err(Error::SignatureInvalid);
        }
    }

    Ok(())
}

/// Standard binary Merkle inclusion proof: the bit of `index` at each depth
/// picks which side the sibling hashes in on.
pub fn is_valid_merkle_branch(
    leaf: H256,
    branch: &[H256],
    depth: u64,
    index: u64,
    root: H256,
) -> bool {
    if (branch.len() as u64) < depth {
        return false;
    }
    let mut value = leaf;
    for i in 0..depth {
        if index >> i & 1 == 1 {
            value = hash_concat(branch[i as usize], value);
        } else {
            value = hash_concat(value, branch[i as usize]);
        }
    }
    value == root
}
