//! LMD GHOST fork choice.
//!
//! The [`Store`] holds every block and post-state the node has validated,
//! together with the latest attestation seen from each validator. Blocks,
//! attestations and clock ticks are fed in through [`Store::on_block`],
//! [`Store::on_attestation`] and [`Store::on_tick`]; [`Store::get_head`]
//! walks the block tree from the justified checkpoint, at each branch picking
//! the child whose subtree carries the most attesting balance.
//!
//! Objects that reference data the store has not seen yet are rejected with
//! an error for which [`Error::refers_to_missing_data`] returns `true`. The
//! caller is expected to hold on to such objects and deliver them again once
//! the missing block arrives. The store itself never queues anything.

use core::convert::TryFrom;
use std::collections::HashMap;

use anyhow::{ensure, Result};
use log::info;
use maplit::hashmap;
use thiserror::Error;

use helper_functions::{
    beacon_state_accessors::{
        get_active_validator_indices, get_current_epoch, get_indexed_attestation,
    },
    crypto::signed_root,
    misc::{compute_epoch_at_slot, compute_start_slot_at_epoch},
    predicates::validate_indexed_attestation,
};
use transition_functions::{process_slots, state_transition};
use types::{
    beacon_state::BeaconState,
    config::Config,
    consts::GENESIS_EPOCH,
    primitives::{Epoch, Gwei, Slot, UnixSeconds, ValidatorIndex, H256},
    types::{Attestation, BeaconBlock, Checkpoint},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("the parent {parent_root} of the block is not in the store")]
    UnknownParent { parent_root: H256 },
    #[error("the block {root} is not in the store")]
    UnknownBlock { root: H256 },
    #[error("the attestation target {root} is not in the store")]
    UnknownAttestationTarget { root: H256 },
    #[error("block slot {block_slot} is later than the current slot {current_slot}")]
    BlockFromFuture { block_slot: Slot, current_slot: Slot },
    #[error("block slot {block_slot} is not after the finalized slot {finalized_slot}")]
    BlockBeforeFinalizedSlot {
        block_slot: Slot,
        finalized_slot: Slot,
    },
    #[error("the block does not descend from the finalized checkpoint {finalized:?}")]
    BlockConflictsWithFinalized { finalized: Checkpoint },
    #[error(
        "attestation target epoch {target_epoch} is neither the current epoch \
         {current_epoch} nor the previous one"
    )]
    AttestationTargetsWrongEpoch {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error("attestation slot {slot} is not in target epoch {target_epoch}")]
    AttestationSlotOutsideTargetEpoch { slot: Slot, target_epoch: Epoch },
    #[error("attestation slot {slot} is earlier than the slot of block {root}")]
    AttestationForFutureBlock { root: H256, slot: Slot },
    #[error("attestation slot {slot} has not passed at the current slot {current_slot}")]
    AttestationSlotNotPast { slot: Slot, current_slot: Slot },
    #[error("time {time} is earlier than the store time {store_time}")]
    TimeMovedBackwards {
        time: UnixSeconds,
        store_time: UnixSeconds,
    },
    #[error("the justified checkpoint state is not cached")]
    JustifiedStateNotCached,
}

impl Error {
    /// `true` for errors caused by data the store has not seen rather than by
    /// invalid data. The caller should retry the rejected object once the
    /// missing block arrives.
    pub fn refers_to_missing_data(self) -> bool {
        match self {
            Error::UnknownParent { .. }
            | Error::UnknownBlock { .. }
            | Error::UnknownAttestationTarget { .. } => true,
            _ => false,
        }
    }
}

/// The latest attestation accepted from a validator, reduced to what the fork
/// choice needs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LatestMessage {
    pub epoch: Epoch,
    pub root: H256,
}

pub struct Store<C: Config> {
    time: UnixSeconds,
    genesis_time: UnixSeconds,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    best_justified_checkpoint: Checkpoint,
    blocks: HashMap<H256, BeaconBlock>,
    block_states: HashMap<H256, BeaconState<C>>,
    checkpoint_states: HashMap<Checkpoint, BeaconState<C>>,
    latest_messages: HashMap<ValidatorIndex, LatestMessage>,
}

impl<C: Config> Store<C> {
    /// Builds a store anchored at a trusted block and its post-state, normally
    /// the genesis block or a finalized block obtained out of band. The anchor
    /// serves as both the justified and the finalized checkpoint until blocks
    /// justify newer ones.
    pub fn new(anchor_state: BeaconState<C>, anchor_block: BeaconBlock) -> Self {
        let root = signed_root(&anchor_block);
        let checkpoint = Checkpoint {
            epoch: compute_epoch_at_slot::<C>(anchor_state.slot),
            root,
        };
        Self {
            time: anchor_state.genesis_time + anchor_state.slot * C::seconds_per_slot(),
            genesis_time: anchor_state.genesis_time,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            best_justified_checkpoint: checkpoint,
            blocks: hashmap! {root => anchor_block},
            block_states: hashmap! {root => anchor_state.clone()},
            checkpoint_states: hashmap! {checkpoint => anchor_state},
            latest_messages: hashmap! {},
        }
    }

    pub fn slot(&self) -> Slot {
        (self.time - self.genesis_time) / C::seconds_per_slot()
    }

    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    pub fn contains_block(&self, root: H256) -> bool {
        self.blocks.contains_key(&root)
    }

    /// Advances the store clock. On crossing into the first slot of an epoch
    /// the justified checkpoint catches up with the best one seen, undoing
    /// any adoption deferred by the anti-bouncing guard.
    pub fn on_tick(&mut self, time: UnixSeconds) -> Result<()> {
        ensure!(
            self.time <= time,
            Error::TimeMovedBackwards {
                time,
                store_time: self.time,
            }
        );

        let previous_slot = self.slot();
        self.time = time;
        let current_slot = self.slot();

        if current_slot > previous_slot
            && Self::slots_since_epoch_start(current_slot) == 0
            && self.best_justified_checkpoint.epoch > self.justified_checkpoint.epoch
        {
            info!(
                "justified checkpoint updated to {:?} at the epoch start",
                self.best_justified_checkpoint,
            );
            self.justified_checkpoint = self.best_justified_checkpoint;
            self.ensure_checkpoint_state(self.justified_checkpoint)?;
        }

        Ok(())
    }

    /// Validates a block through the full state transition and records it
    /// together with its post-state, adopting any newer checkpoints the
    /// post-state has justified or finalized.
    pub fn on_block(&mut self, block: BeaconBlock) -> Result<()> {
        let current_slot = self.slot();
        ensure!(
            block.slot <= current_slot,
            Error::BlockFromFuture {
                block_slot: block.slot,
                current_slot,
            }
        );

        let finalized_slot = compute_start_slot_at_epoch::<C>(self.finalized_checkpoint.epoch);
        ensure!(
            block.slot > finalized_slot,
            Error::BlockBeforeFinalizedSlot {
                block_slot: block.slot,
                finalized_slot,
            }
        );

        let parent_state =
            self.block_states
                .get(&block.parent_root)
                .ok_or(Error::UnknownParent {
                    parent_root: block.parent_root,
                })?;
        ensure!(
            self.ancestor(block.parent_root, finalized_slot)
                == Some(self.finalized_checkpoint.root),
            Error::BlockConflictsWithFinalized {
                finalized: self.finalized_checkpoint,
            }
        );

        let state = state_transition(parent_state, &block, true)?;
        let justified = state.current_justified_checkpoint;
        let finalized = state.finalized_checkpoint;

        let block_root = signed_root(&block);
        self.blocks.insert(block_root, block);
        self.block_states.insert(block_root, state);

        if justified.epoch > self.justified_checkpoint.epoch {
            if justified.epoch > self.best_justified_checkpoint.epoch {
                self.best_justified_checkpoint = justified;
            }
            if self.should_update_justified_checkpoint(justified) {
                info!("justified checkpoint updated to {:?}", justified);
                self.justified_checkpoint = justified;
            }
        }
        if finalized.epoch > self.finalized_checkpoint.epoch {
            info!("finalized checkpoint updated to {:?}", finalized);
            self.finalized_checkpoint = finalized;
        }

        // Head computation reads the justified state without mutable access.
        self.ensure_checkpoint_state(self.justified_checkpoint)?;

        Ok(())
    }

    /// Validates an attestation against the committee derived from the target
    /// checkpoint's state and records it as the latest message of every
    /// attester it covers, unless a message from a later epoch is already
    /// recorded.
    pub fn on_attestation(&mut self, attestation: &Attestation) -> Result<()> {
        let data = &attestation.data;
        let target = data.target;

        let current_slot = self.slot();
        let current_epoch = compute_epoch_at_slot::<C>(current_slot);
        let previous_epoch = if current_epoch > GENESIS_EPOCH {
            current_epoch - 1
        } else {
            GENESIS_EPOCH
        };
        ensure!(
            target.epoch == current_epoch || target.epoch == previous_epoch,
            Error::AttestationTargetsWrongEpoch {
                target_epoch: target.epoch,
                current_epoch,
            }
        );
        ensure!(
            target.epoch == compute_epoch_at_slot::<C>(data.slot),
            Error::AttestationSlotOutsideTargetEpoch {
                slot: data.slot,
                target_epoch: target.epoch,
            }
        );
        ensure!(
            self.blocks.contains_key(&target.root),
            Error::UnknownAttestationTarget { root: target.root }
        );

        let beacon_block =
            self.blocks
                .get(&data.beacon_block_root)
                .ok_or(Error::UnknownBlock {
                    root: data.beacon_block_root,
                })?;
        ensure!(
            beacon_block.slot <= data.slot,
            Error::AttestationForFutureBlock {
                root: data.beacon_block_root,
                slot: data.slot,
            }
        );
        // Attestations only affect the fork choice of later slots.
        ensure!(
            data.slot < current_slot,
            Error::AttestationSlotNotPast {
                slot: data.slot,
                current_slot,
            }
        );

        self.ensure_checkpoint_state(target)?;
        let target_state = &self.checkpoint_states[&target];
        let indexed_attestation = get_indexed_attestation(target_state, attestation)?;
        validate_indexed_attestation(target_state, &indexed_attestation, true)?;

        let message = LatestMessage {
            epoch: target.epoch,
            root: data.beacon_block_root,
        };
        for index in indexed_attestation.attesting_indices {
            self.latest_messages
                .entry(index)
                .and_modify(|latest| {
                    if latest.epoch < message.epoch {
                        *latest = message;
                    }
                })
                .or_insert(message);
        }

        Ok(())
    }

    /// Walks the block tree from the justified checkpoint, at each branch
    /// following the child with the most attesting balance. Roots break ties
    /// so the result does not depend on delivery order.
    pub fn get_head(&self) -> Result<H256> {
        let justified_state = self
            .checkpoint_states
            .get(&self.justified_checkpoint)
            .ok_or(Error::JustifiedStateNotCached)?;
        let justified_slot = compute_start_slot_at_epoch::<C>(self.justified_checkpoint.epoch);

        let mut head = self.justified_checkpoint.root;
        loop {
            let best_child = self
                .blocks
                .iter()
                .filter(|(_, block)| block.parent_root == head && block.slot > justified_slot)
                .map(|(root, _)| *root)
                .max_by_key(|root| (self.latest_attesting_balance(justified_state, *root), *root));
            match best_child {
                Some(child) => head = child,
                None => return Ok(head),
            }
        }
    }

    fn latest_attesting_balance(&self, justified_state: &BeaconState<C>, root: H256) -> Gwei {
        let block_slot = match self.blocks.get(&root) {
            Some(block) => block.slot,
            None => return 0,
        };
        let mut balance = 0;
        for index in
            get_active_validator_indices(justified_state, get_current_epoch(justified_state))
        {
            let attests_to_root = self.latest_messages.get(&index).map_or(false, |message| {
                self.ancestor(message.root, block_slot) == Some(root)
            });
            if attests_to_root {
                if let Ok(position) = usize::try_from(index) {
                    balance += justified_state.validators[position].effective_balance;
                }
            }
        }
        balance
    }

    /// The ancestor of `root` at exactly `slot`, or `None` if the chain skips
    /// that slot or leaves the store. Iterative so deep reorgs cannot
    /// overflow the stack.
    fn ancestor(&self, mut root: H256, slot: Slot) -> Option<H256> {
        loop {
            let block = self.blocks.get(&root)?;
            if block.slot == slot {
                return Some(root);
            }
            if block.slot < slot {
                return None;
            }
            root = block.parent_root;
        }
    }

    /// The anti-bouncing guard: a newly justified checkpoint is adopted
    /// immediately only early in the epoch or when it descends from the
    /// checkpoint it replaces. Deferred adoptions happen at the next epoch
    /// start in [`Store::on_tick`].
    fn should_update_justified_checkpoint(&self, new_justified: Checkpoint) -> bool {
        if Self::slots_since_epoch_start(self.slot()) < C::safe_slots_to_update_justified() {
            return true;
        }
        let justified_block = match self.blocks.get(&self.justified_checkpoint.root) {
            Some(block) => block,
            None => return false,
        };
        match self.blocks.get(&new_justified.root) {
            Some(block)
                if block.slot
                    > compute_start_slot_at_epoch::<C>(self.justified_checkpoint.epoch) =>
            {
                self.ancestor(new_justified.root, justified_block.slot)
                    == Some(self.justified_checkpoint.root)
            }
            _ => false,
        }
    }

    fn ensure_checkpoint_state(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if self.checkpoint_states.contains_key(&checkpoint) {
            return Ok(());
        }
        let base = self
            .block_states
            .get(&checkpoint.root)
            .ok_or(Error::UnknownBlock {
                root: checkpoint.root,
            })?;
        let state = process_slots(base, compute_start_slot_at_epoch::<C>(checkpoint.epoch))?;
        self.checkpoint_states.insert(checkpoint, state);
        Ok(())
    }

    fn slots_since_epoch_start(slot: Slot) -> Slot {
        slot - compute_start_slot_at_epoch::<C>(compute_epoch_at_slot::<C>(slot))
    }
}
