use core::marker::PhantomData;

use hashing::TreeHash;
use serde::{Deserialize, Serialize};

use crate::{bitfields::JustificationBits, config::*, primitives::*, types::*};

/// The canonical chain state at a slot boundary.
///
/// Rotating buffers (`block_roots`, `state_roots`, `randao_mixes`,
/// `active_index_roots`, `slashings`) are sized by the configuration at
/// construction and indexed modulo their length; each entry is written exactly
/// once per period, so wraparound evicts stale values.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BeaconState<C: Config> {
    pub genesis_time: UnixSeconds,
    pub slot: Slot,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vec<H256>,
    pub state_roots: Vec<H256>,
    pub historical_roots: Vec<H256>,

    // Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: Vec<Eth1Data>,
    pub eth1_deposit_index: u64,

    // Registry
    pub validators: Vec<Validator>,
    pub balances: Vec<Gwei>,

    // Shuffling
    pub randao_mixes: Vec<H256>,
    pub active_index_roots: Vec<H256>,

    // Slashings
    pub slashings: Vec<Gwei>,

    // Attestations
    pub previous_epoch_attestations: Vec<PendingAttestation>,
    pub current_epoch_attestations: Vec<PendingAttestation>,

    // Finality
    pub justification_bits: JustificationBits,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    pub phantom: PhantomData<C>,
}

impl<C: Config> Default for BeaconState<C> {
    fn default() -> Self {
        Self {
            genesis_time: 0,
            slot: crate::consts::GENESIS_SLOT,
            fork: Fork::default(),
            latest_block_header: BeaconBlockHeader::default(),
            block_roots: vec![H256::zero(); C::slots_per_historical_root() as usize],
            state_roots: vec![H256::zero(); C::slots_per_historical_root() as usize],
            historical_roots: vec![],
            eth1_data: Eth1Data::default(),
            eth1_data_votes: vec![],
            eth1_deposit_index: 0,
            validators: vec![],
            balances: vec![],
            randao_mixes: vec![H256::zero(); C::epochs_per_historical_vector() as usize],
            active_index_roots: vec![H256::zero(); C::epochs_per_historical_vector() as usize],
            slashings: vec![0; C::epochs_per_slashings_vector() as usize],
            previous_epoch_attestations: vec![],
            current_epoch_attestations: vec![],
            justification_bits: JustificationBits::default(),
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            phantom: PhantomData,
        }
    }
}

impl<C: Config> TreeHash for BeaconState<C> {
    fn tree_hash_root(&self) -> H256 {
        hashing::merkleize(&[
            self.genesis_time.tree_hash_root(),
            self.slot.tree_hash_root(),
            self.fork.tree_hash_root(),
            self.latest_block_header.tree_hash_root(),
            self.block_roots.tree_hash_root(),
            self.state_roots.tree_hash_root(),
            self.historical_roots.tree_hash_root(),
            self.eth1_data.tree_hash_root(),
            self.eth1_data_votes.tree_hash_root(),
            self.eth1_deposit_index.tree_hash_root(),
            self.validators.tree_hash_root(),
            self.balances.tree_hash_root(),
            self.randao_mixes.tree_hash_root(),
            self.active_index_roots.tree_hash_root(),
            self.slashings.tree_hash_root(),
            self.previous_epoch_attestations.tree_hash_root(),
            self.current_epoch_attestations.tree_hash_root(),
            self.justification_bits.tree_hash_root(),
            self.previous_justified_checkpoint.tree_hash_root(),
            self.current_justified_checkpoint.tree_hash_root(),
            self.finalized_checkpoint.tree_hash_root(),
        ])
    }
}
