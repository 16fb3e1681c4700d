//! Slot advancement and the state transition as a whole.
//!
//! Transitions run on a working copy of the committed state. A phase tracker
//! on the working copy enforces the legal ordering of slot, epoch and block
//! processing, so a caller cannot, say, run epoch processing twice in a row or
//! apply a block without an intervening slot transition. On any failure the
//! working copy is dropped and the committed state stays untouched.

use helper_functions::crypto::{hash_tree_root, signed_root};
use types::{
    beacon_state::BeaconState,
    config::Config,
    primitives::{Slot, H256},
    types::BeaconBlock,
};

use crate::block_processing::process_block;
use crate::epochs::process_epoch;
use crate::error::{ensure, Error};

/// The kind of processing step last applied to a working state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Initial,
    Slot,
    Epoch,
    Block,
}

/// A disposable copy of a committed state, tracking which processing phase it
/// is in.
pub struct WorkingState<C: Config> {
    state: BeaconState<C>,
    phase: Phase,
}

impl<C: Config> WorkingState<C> {
    pub fn new(committed: &BeaconState<C>) -> Self {
        Self {
            state: committed.clone(),
            phase: Phase::Initial,
        }
    }

    pub fn state(&self) -> &BeaconState<C> {
        &self.state
    }

    pub fn into_state(self) -> BeaconState<C> {
        self.state
    }

    /// Moves to the next processing phase, failing on orderings the
    /// transition does not allow.
    pub fn transition(&mut self, to: Phase) -> Result<(), Error> {
        let legal = match (self.phase, to) {
            (Phase::Initial, Phase::Slot)
            | (Phase::Slot, Phase::Slot)
            | (Phase::Slot, Phase::Epoch)
            | (Phase::Slot, Phase::Block)
            | (Phase::Epoch, Phase::Slot)
            | (Phase::Block, Phase::Slot) => true,
            _ => false,
        };
        if !legal {
            return Err(Error::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

/// Advances the state to `slot`, running epoch processing at every epoch
/// boundary crossed on the way. A target at or before the current slot is a
/// no-op.
pub fn process_slots<C: Config>(
    state: &BeaconState<C>,
    slot: Slot,
) -> Result<BeaconState<C>, Error> {
    let mut working = WorkingState::new(state);
    advance_slots(&mut working, slot)?;
    Ok(working.into_state())
}

fn advance_slots<C: Config>(working: &mut WorkingState<C>, slot: Slot) -> Result<(), Error> {
    while working.state.slot < slot {
        working.transition(Phase::Slot)?;
        process_slot(&mut working.state);
        // Process the epoch on the start slot of the next epoch
        if (working.state.slot + 1) % C::slots_per_epoch() == 0 {
            working.transition(Phase::Epoch)?;
            process_epoch(&mut working.state)?;
        }
        working.state.slot += 1;
    }
    Ok(())
}

fn process_slot<C: Config>(state: &mut BeaconState<C>) {
    // Cache the state root
    let previous_state_root = hash_tree_root(state);
    state.state_roots[(state.slot % C::slots_per_historical_root()) as usize] =
        previous_state_root;
    // The header of the block applied last slot left its state root zeroed
    if state.latest_block_header.state_root == H256::zero() {
        state.latest_block_header.state_root = previous_state_root;
    }
    // Cache the block root
    state.block_roots[(state.slot % C::slots_per_historical_root()) as usize] =
        signed_root(&state.latest_block_header);
}

/// Applies one block on top of the committed state, returning the post-state.
///
/// With `validate` set, the block signature is checked and the resulting state
/// root must match the root the block committed to.
pub fn state_transition<C: Config>(
    state: &BeaconState<C>,
    block: &BeaconBlock,
    validate: bool,
) -> Result<BeaconState<C>, Error> {
    ensure(state.slot < block.slot, "block is not newer than the state")?;

    let mut working = WorkingState::new(state);
    advance_slots(&mut working, block.slot)?;

    working.transition(Phase::Block)?;
    process_block(&mut working.state, block, validate)?;

    if validate {
        ensure(
            block.state_root == hash_tree_root(&working.state),
            "block state root does not match the post-state",
        )?;
    }
    Ok(working.into_state())
}
