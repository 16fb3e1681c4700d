//! Validation and application of a single block.
//!
//! Every step returns `Err` instead of mutating further; callers work on a
//! disposable copy of the state and discard it when any step fails.

use std::cmp;
use std::collections::BTreeSet;
use std::convert::TryFrom;

use helper_functions::beacon_state_accessors::{
    get_beacon_committee, get_beacon_proposer_index, get_committee_count_at_slot,
    get_current_epoch, get_domain, get_indexed_attestation, get_previous_epoch, get_randao_mix,
};
use helper_functions::beacon_state_mutators::{
    decrease_balance, increase_balance, initiate_validator_exit, slash_validator,
};
use helper_functions::crypto::{bls_verify, hash, hash_tree_root, signed_root};
use helper_functions::math::xor;
use helper_functions::misc::{compute_domain, compute_epoch_at_slot};
use helper_functions::predicates::{
    is_active_validator, is_slashable_attestation_data, is_slashable_validator,
    is_valid_merkle_branch, validate_indexed_attestation,
};
use types::{
    beacon_state::BeaconState,
    config::*,
    consts::{BLS_WITHDRAWAL_PREFIX, DEPOSIT_CONTRACT_TREE_DEPTH, FAR_FUTURE_EPOCH},
    primitives::{Gwei, ValidatorIndex, H256},
    types::{
        Attestation, AttesterSlashing, BeaconBlock, BeaconBlockBody, BeaconBlockHeader, Deposit,
        PendingAttestation, ProposerSlashing, Transfer, Validator, VoluntaryExit,
    },
};

use crate::error::{ensure, Error};

pub fn process_block<C: Config>(
    state: &mut BeaconState<C>,
    block: &BeaconBlock,
    verify_signatures: bool,
) -> Result<(), Error> {
    process_block_header(state, block, verify_signatures)?;
    process_randao(state, &block.body, verify_signatures)?;
    process_eth1_data(state, &block.body);
    process_operations(state, &block.body, verify_signatures)
}

pub fn process_block_header<C: Config>(
    state: &mut BeaconState<C>,
    block: &BeaconBlock,
    verify_signature: bool,
) -> Result<(), Error> {
    ensure(block.slot == state.slot, "block slot does not match the state slot")?;
    ensure(
        block.parent_root == signed_root(&state.latest_block_header),
        "block parent root does not match the latest block header",
    )?;

    let proposer_index = get_beacon_proposer_index(state)?;
    let proposer = &state.validators[proposer_index as usize];
    ensure(!proposer.slashed, "block proposer is slashed")?;
    if verify_signature {
        ensure(
            bls_verify(
                &proposer.pubkey,
                signed_root(block),
                &block.signature,
                get_domain(state, DOMAIN_BEACON_PROPOSER, None),
            ),
            "block signature is invalid",
        )?;
    }

    // The state root stays zeroed until the next slot transition fills it in.
    state.latest_block_header = BeaconBlockHeader {
        slot: block.slot,
        parent_root: block.parent_root,
        state_root: H256::zero(),
        body_root: block.body_root(),
        ..BeaconBlockHeader::default()
    };
    Ok(())
}

pub fn process_randao<C: Config>(
    state: &mut BeaconState<C>,
    body: &BeaconBlockBody,
    verify_signature: bool,
) -> Result<(), Error> {
    let epoch = get_current_epoch(state);
    if verify_signature {
        let proposer = &state.validators[get_beacon_proposer_index(state)? as usize];
        ensure(
            bls_verify(
                &proposer.pubkey,
                hash_tree_root(&epoch),
                &body.randao_reveal,
                get_domain(state, DOMAIN_RANDAO, None),
            ),
            "randao reveal signature is invalid",
        )?;
    }
    let mix = xor(
        &get_randao_mix(state, epoch),
        &hash(body.randao_reveal.as_bytes()),
    );
    state.randao_mixes[(epoch % C::epochs_per_historical_vector()) as usize] = mix;
    Ok(())
}

pub fn process_eth1_data<C: Config>(state: &mut BeaconState<C>, body: &BeaconBlockBody) {
    state.eth1_data_votes.push(body.eth1_data.clone());
    let num_votes = state
        .eth1_data_votes
        .iter()
        .filter(|vote| **vote == body.eth1_data)
        .count() as u64;
    if num_votes * 2 > C::slots_per_eth1_voting_period() {
        state.eth1_data = body.eth1_data.clone();
    }
}

fn process_operations<C: Config>(
    state: &mut BeaconState<C>,
    body: &BeaconBlockBody,
    verify_signatures: bool,
) -> Result<(), Error> {
    ensure(
        state.eth1_deposit_index + body.deposits.len() as u64 <= state.eth1_data.deposit_count,
        "block contains more deposits than the deposit contract has",
    )?;

    for proposer_slashing in &body.proposer_slashings {
        process_proposer_slashing(state, proposer_slashing, verify_signatures)?;
    }
    for attester_slashing in &body.attester_slashings {
        process_attester_slashing(state, attester_slashing, verify_signatures)?;
    }
    for attestation in &body.attestations {
        process_attestation(state, attestation, verify_signatures)?;
    }
    for deposit in &body.deposits {
        process_deposit(state, deposit)?;
    }
    for voluntary_exit in &body.voluntary_exits {
        process_voluntary_exit(state, voluntary_exit, verify_signatures)?;
    }
    for transfer in &body.transfers {
        process_transfer(state, transfer, verify_signatures)?;
    }
    Ok(())
}

pub fn process_proposer_slashing<C: Config>(
    state: &mut BeaconState<C>,
    proposer_slashing: &ProposerSlashing,
    verify_signatures: bool,
) -> Result<(), Error> {
    let id = usize::try_from(proposer_slashing.proposer_index)
        .map_err(|_| helper_functions::Error::IndexOutOfRange)?;
    let proposer = state
        .validators
        .get(id)
        .ok_or(helper_functions::Error::IndexOutOfRange)?;

    ensure(
        compute_epoch_at_slot::<C>(proposer_slashing.header_1.slot)
            == compute_epoch_at_slot::<C>(proposer_slashing.header_2.slot),
        "slashing headers are from different epochs",
    )?;
    ensure(
        proposer_slashing.header_1 != proposer_slashing.header_2,
        "slashing headers are identical",
    )?;
    ensure(
        is_slashable_validator(proposer, get_current_epoch(state)),
        "proposer is not slashable",
    )?;
    if verify_signatures {
        for header in &[&proposer_slashing.header_1, &proposer_slashing.header_2] {
            let domain = get_domain(
                state,
                DOMAIN_BEACON_PROPOSER,
                Some(compute_epoch_at_slot::<C>(header.slot)),
            );
            ensure(
                bls_verify(&proposer.pubkey, signed_root(*header), &header.signature, domain),
                "slashing header signature is invalid",
            )?;
        }
    }

    slash_validator(state, proposer_slashing.proposer_index, None)?;
    Ok(())
}

pub fn process_attester_slashing<C: Config>(
    state: &mut BeaconState<C>,
    attester_slashing: &AttesterSlashing,
    verify_signatures: bool,
) -> Result<(), Error> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;
    ensure(
        is_slashable_attestation_data(&attestation_1.data, &attestation_2.data),
        "attestation data is not slashable",
    )?;
    validate_indexed_attestation(state, attestation_1, verify_signatures)?;
    validate_indexed_attestation(state, attestation_2, verify_signatures)?;

    let indices_1 = attestation_1
        .attesting_indices
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();
    let indices_2 = attestation_2
        .attesting_indices
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();

    let mut slashed_any = false;
    for index in &indices_1 & &indices_2 {
        let validator = &state.validators[index as usize];
        if is_slashable_validator(validator, get_current_epoch(state)) {
            slash_validator(state, index, None)?;
            slashed_any = true;
        }
    }
    ensure(slashed_any, "no validator was slashable")?;
    Ok(())
}

pub fn process_attestation<C: Config>(
    state: &mut BeaconState<C>,
    attestation: &Attestation,
    verify_signature: bool,
) -> Result<(), Error> {
    let data = &attestation.data;
    ensure(
        data.index < get_committee_count_at_slot(state, data.slot),
        "committee index is out of range for the slot",
    )?;
    ensure(
        data.target.epoch == get_previous_epoch(state)
            || data.target.epoch == get_current_epoch(state),
        "attestation targets neither the current nor the previous epoch",
    )?;
    ensure(
        data.target.epoch == compute_epoch_at_slot::<C>(data.slot),
        "attestation target epoch does not contain the attestation slot",
    )?;
    ensure(
        data.slot + C::min_attestation_inclusion_delay() <= state.slot
            && state.slot <= data.slot + C::slots_per_epoch(),
        "attestation is outside its inclusion window",
    )?;

    let committee = get_beacon_committee(state, data.slot, data.index)?;
    ensure(
        attestation.aggregation_bits.len() == committee.len(),
        "aggregation bits do not cover the committee",
    )?;

    let pending_attestation = PendingAttestation {
        data: data.clone(),
        aggregation_bits: attestation.aggregation_bits.clone(),
        inclusion_delay: state.slot - data.slot,
        proposer_index: get_beacon_proposer_index(state)?,
    };

    if data.target.epoch == get_current_epoch(state) {
        ensure(
            data.source == state.current_justified_checkpoint,
            "attestation source does not match the current justified checkpoint",
        )?;
        state.current_epoch_attestations.push(pending_attestation);
    } else {
        ensure(
            data.source == state.previous_justified_checkpoint,
            "attestation source does not match the previous justified checkpoint",
        )?;
        state.previous_epoch_attestations.push(pending_attestation);
    }

    validate_indexed_attestation(
        state,
        &get_indexed_attestation(state, attestation)?,
        verify_signature,
    )?;
    Ok(())
}

pub fn process_deposit<C: Config>(
    state: &mut BeaconState<C>,
    deposit: &Deposit,
) -> Result<(), Error> {
    ensure(
        is_valid_merkle_branch(
            hash_tree_root(&deposit.data),
            &deposit.proof,
            DEPOSIT_CONTRACT_TREE_DEPTH + 1,
            state.eth1_deposit_index,
            state.eth1_data.deposit_root,
        ),
        "deposit proof is invalid",
    )?;

    // Deposits must be processed in order.
    state.eth1_deposit_index += 1;

    apply_deposit(state, deposit, true)
}

/// The part of deposit processing shared with genesis construction, which
/// skips the proof because it builds the deposit tree itself.
pub(crate) fn apply_deposit<C: Config>(
    state: &mut BeaconState<C>,
    deposit: &Deposit,
    verify_proof_of_possession: bool,
) -> Result<(), Error> {
    let pubkey = deposit.data.pubkey;
    let amount = deposit.data.amount;

    if let Some(index) = state
        .validators
        .iter()
        .position(|validator| validator.pubkey == pubkey)
    {
        return increase_balance(state, index as ValidatorIndex, amount).map_err(Error::from);
    }

    // The deposit contract does not check signatures, so an invalid proof of
    // possession skips the deposit instead of failing the block.
    if verify_proof_of_possession {
        let domain = compute_domain(DOMAIN_DEPOSIT, None);
        if !bls_verify(&pubkey, signed_root(&deposit.data), &deposit.data.signature, domain) {
            return Ok(());
        }
    }

    state.validators.push(Validator {
        pubkey,
        withdrawal_credentials: deposit.data.withdrawal_credentials,
        effective_balance: cmp::min(
            amount - amount % C::effective_balance_increment(),
            C::max_effective_balance(),
        ),
        slashed: false,
        activation_eligibility_epoch: FAR_FUTURE_EPOCH,
        activation_epoch: FAR_FUTURE_EPOCH,
        exit_epoch: FAR_FUTURE_EPOCH,
        withdrawable_epoch: FAR_FUTURE_EPOCH,
    });
    state.balances.push(amount);
    Ok(())
}

pub fn process_voluntary_exit<C: Config>(
    state: &mut BeaconState<C>,
    exit: &VoluntaryExit,
    verify_signature: bool,
) -> Result<(), Error> {
    let id = usize::try_from(exit.validator_index)
        .map_err(|_| helper_functions::Error::IndexOutOfRange)?;
    let validator = state
        .validators
        .get(id)
        .ok_or(helper_functions::Error::IndexOutOfRange)?;
    let current_epoch = get_current_epoch(state);

    ensure(
        is_active_validator(validator, current_epoch),
        "exiting validator is not active",
    )?;
    ensure(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        "validator has already initiated an exit",
    )?;
    ensure(current_epoch >= exit.epoch, "exit is not yet valid")?;
    ensure(
        current_epoch >= validator.activation_epoch + C::persistent_committee_period(),
        "validator has not been active long enough",
    )?;
    if verify_signature {
        let domain = get_domain(state, DOMAIN_VOLUNTARY_EXIT, Some(exit.epoch));
        ensure(
            bls_verify(&validator.pubkey, signed_root(exit), &exit.signature, domain),
            "exit signature is invalid",
        )?;
    }

    initiate_validator_exit(state, exit.validator_index)?;
    Ok(())
}

pub fn process_transfer<C: Config>(
    state: &mut BeaconState<C>,
    transfer: &Transfer,
    verify_signature: bool,
) -> Result<(), Error> {
    let sender = usize::try_from(transfer.sender)
        .map_err(|_| helper_functions::Error::IndexOutOfRange)?;
    let recipient = usize::try_from(transfer.recipient)
        .map_err(|_| helper_functions::Error::IndexOutOfRange)?;
    ensure(
        sender < state.validators.len() && recipient < state.validators.len(),
        "transfer references an unknown validator",
    )?;

    let amount_and_fee = transfer
        .amount
        .checked_add(transfer.fee)
        .ok_or(Error::AssertionFailed("transfer amount overflows"))?;
    let sender_balance = state.balances[sender];
    ensure(
        sender_balance >= amount_and_fee,
        "sender balance does not cover the transfer",
    )?;
    ensure(state.slot == transfer.slot, "transfer is not valid in this slot")?;

    let sender_validator = &state.validators[sender];
    let withdrawable = get_current_epoch(state) >= sender_validator.withdrawable_epoch
        || sender_validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH;
    ensure(
        withdrawable
            || amount_and_fee + C::max_effective_balance() <= sender_balance,
        "sender stake is not transferable",
    )?;

    let mut expected_credentials = hash(transfer.pubkey.as_bytes());
    expected_credentials.as_bytes_mut()[0] = BLS_WITHDRAWAL_PREFIX;
    ensure(
        sender_validator.withdrawal_credentials == expected_credentials,
        "transfer pubkey does not match the withdrawal credentials",
    )?;
    if verify_signature {
        let domain = get_domain(state, DOMAIN_TRANSFER, None);
        ensure(
            bls_verify(&transfer.pubkey, signed_root(transfer), &transfer.signature, domain),
            "transfer signature is invalid",
        )?;
    }

    decrease_balance(state, transfer.sender, amount_and_fee)?;
    increase_balance(state, transfer.recipient, transfer.amount)?;
    let proposer_index = get_beacon_proposer_index(state)?;
    increase_balance(state, proposer_index, transfer.fee)?;

    let dust = |balance: Gwei| 0 < balance && balance < C::min_deposit_amount();
    ensure(
        !dust(state.balances[sender]),
        "transfer leaves a dust balance on the sender",
    )?;
    ensure(
        !dust(state.balances[recipient]),
        "transfer leaves a dust balance on the recipient",
    )?;
    Ok(())
}
