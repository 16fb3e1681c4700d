use hashing::{SignedRoot, TreeHash};
use serde::{Deserialize, Serialize};

use crate::bitfields::BitList;
use crate::primitives::*;

/// Implements `TreeHash` (and optionally `SignedRoot`) for a container as the
/// merkleization of its field roots. The `signed` form leaves the trailing
/// signature field out of the signed root.
macro_rules! impl_roots {
    ($type:ty { $($field:ident),+ $(,)? }) => {
        impl TreeHash for $type {
            fn tree_hash_root(&self) -> H256 {
                hashing::merkleize(&[$(self.$field.tree_hash_root()),+])
            }
        }
    };
    ($type:ty { $($field:ident),+ $(,)? } signed { $($signed_field:ident),+ $(,)? }) => {
        impl_roots!($type { $($field),+ });

        impl SignedRoot for $type {
            fn signed_root(&self) -> H256 {
                hashing::merkleize(&[$(self.$signed_field.tree_hash_root()),+])
            }
        }
    };
}

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash, Deserialize, Serialize,
)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: H256,
}

impl_roots!(Checkpoint { epoch, root });

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct Fork {
    pub previous_version: Version,
    pub current_version: Version,
    pub epoch: Epoch,
}

impl_roots!(Fork {
    previous_version,
    current_version,
    epoch,
});

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Validator {
    pub pubkey: PublicKey,
    pub withdrawal_credentials: H256,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_eligibility_epoch: Epoch,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            pubkey: PublicKey::default(),
            withdrawal_credentials: H256::zero(),
            effective_balance: 0,
            slashed: false,
            activation_eligibility_epoch: crate::consts::FAR_FUTURE_EPOCH,
            activation_epoch: crate::consts::FAR_FUTURE_EPOCH,
            exit_epoch: crate::consts::FAR_FUTURE_EPOCH,
            withdrawable_epoch: crate::consts::FAR_FUTURE_EPOCH,
        }
    }
}

impl Validator {
    pub fn is_active_validator(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    pub fn is_slashable_validator(&self, epoch: Epoch) -> bool {
        !self.slashed && self.activation_epoch <= epoch && epoch < self.withdrawable_epoch
    }
}

impl_roots!(Validator {
    pubkey,
    withdrawal_credentials,
    effective_balance,
    slashed,
    activation_eligibility_epoch,
    activation_epoch,
    exit_epoch,
    withdrawable_epoch,
});

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub beacon_block_root: H256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

impl AttestationData {
    pub fn is_slashable_attestation_data(&self, data: &Self) -> bool {
        // Double vote
        (self != data && self.target.epoch == data.target.epoch) ||
        // Surround vote
        (self.source.epoch < data.source.epoch && data.target.epoch < self.target.epoch)
    }
}

impl_roots!(AttestationData {
    slot,
    index,
    beacon_block_root,
    source,
    target,
});

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Attestation {
    pub aggregation_bits: BitList,
    pub data: AttestationData,
    pub signature: AggregateSignature,
}

impl_roots!(Attestation {
    aggregation_bits,
    data,
    signature,
});

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct IndexedAttestation {
    pub attesting_indices: Vec<ValidatorIndex>,
    pub data: AttestationData,
    pub signature: AggregateSignature,
}

impl_roots!(IndexedAttestation {
    attesting_indices,
    data,
    signature,
});

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct PendingAttestation {
    pub aggregation_bits: BitList,
    pub data: AttestationData,
    pub inclusion_delay: Slot,
    pub proposer_index: ValidatorIndex,
}

impl_roots!(PendingAttestation {
    aggregation_bits,
    data,
    inclusion_delay,
    proposer_index,
});

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct Eth1Data {
    pub deposit_root: H256,
    pub deposit_count: u64,
    pub block_hash: H256,
}

impl_roots!(Eth1Data {
    deposit_root,
    deposit_count,
    block_hash,
});

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct DepositData {
    pub pubkey: PublicKey,
    pub withdrawal_credentials: H256,
    pub amount: Gwei,
    pub signature: Signature,
}

impl_roots!(
    DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
    }
    signed {
        pubkey,
        withdrawal_credentials,
        amount,
    }
);

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Deposit {
    /// Branch of length `DEPOSIT_CONTRACT_TREE_DEPTH + 1` (the extra node
    /// carries the deposit-count length mix).
    pub proof: Vec<H256>,
    pub data: DepositData,
}

impl_roots!(Deposit { proof, data });

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub parent_root: H256,
    pub state_root: H256,
    pub body_root: H256,
    pub signature: Signature,
}

impl_roots!(
    BeaconBlockHeader {
        slot,
        parent_root,
        state_root,
        body_root,
        signature,
    }
    signed {
        slot,
        parent_root,
        state_root,
        body_root,
    }
);

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct ProposerSlashing {
    pub proposer_index: ValidatorIndex,
    pub header_1: BeaconBlockHeader,
    pub header_2: BeaconBlockHeader,
}

impl_roots!(ProposerSlashing {
    proposer_index,
    header_1,
    header_2,
});

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct AttesterSlashing {
    pub attestation_1: IndexedAttestation,
    pub attestation_2: IndexedAttestation,
}

impl_roots!(AttesterSlashing {
    attestation_1,
    attestation_2,
});

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct VoluntaryExit {
    pub epoch: Epoch,
    pub validator_index: ValidatorIndex,
    pub signature: Signature,
}

impl_roots!(
    VoluntaryExit {
        epoch,
        validator_index,
        signature,
    }
    signed {
        epoch,
        validator_index,
    }
);

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct Transfer {
    pub sender: ValidatorIndex,
    pub recipient: ValidatorIndex,
    pub amount: Gwei,
    pub fee: Gwei,
    pub slot: Slot,
    pub pubkey: PublicKey,
    pub signature: Signature,
}

impl_roots!(
    Transfer {
        sender,
        recipient,
        amount,
        fee,
        slot,
        pubkey,
        signature,
    }
    signed {
        sender,
        recipient,
        amount,
        fee,
        slot,
        pubkey,
    }
);

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct BeaconBlockBody {
    pub randao_reveal: Signature,
    pub eth1_data: Eth1Data,
    pub graffiti: [u8; 32],
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attester_slashings: Vec<AttesterSlashing>,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
    pub voluntary_exits: Vec<VoluntaryExit>,
    pub transfers: Vec<Transfer>,
}

impl_roots!(BeaconBlockBody {
    randao_reveal,
    eth1_data,
    graffiti,
    proposer_slashings,
    attester_slashings,
    attestations,
    deposits,
    voluntary_exits,
    transfers,
});

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct BeaconBlock {
    pub slot: Slot,
    pub parent_root: H256,
    pub state_root: H256,
    pub body: BeaconBlockBody,
    pub signature: Signature,
}

impl BeaconBlock {
    pub fn body_root(&self) -> H256 {
        self.body.tree_hash_root()
    }
}

impl_roots!(
    BeaconBlock {
        slot,
        parent_root,
        state_root,
        body,
        signature,
    }
    signed {
        slot,
        parent_root,
        state_root,
        body,
    }
);

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct HistoricalBatch {
    pub block_roots: Vec<H256>,
    pub state_roots: Vec<H256>,
}

impl_roots!(HistoricalBatch {
    block_roots,
    state_roots,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_slashable_validator() {
        let v = Validator {
            slashed: false,
            activation_epoch: 0,
            withdrawable_epoch: 1,
            ..Validator::default()
        };
        assert_eq!(v.is_slashable_validator(0), true);
    }

    #[test]
    fn is_slashable_validator_already_slashed() {
        let v = Validator {
            slashed: true,
            activation_epoch: 0,
            withdrawable_epoch: 1,
            ..Validator::default()
        };
        assert_eq!(v.is_slashable_validator(0), false);
    }

    #[test]
    fn is_slashable_validator_activation_epoch_greater_than_epoch() {
        let v = Validator {
            slashed: false,
            activation_epoch: 1,
            withdrawable_epoch: 2,
            ..Validator::default()
        };
        assert_eq!(v.is_slashable_validator(0), false);
    }

    #[test]
    fn is_slashable_validator_withdrawable_epoch_equals_epoch() {
        let v = Validator {
            slashed: false,
            activation_epoch: 0,
            withdrawable_epoch: 1,
            ..Validator::default()
        };
        assert_eq!(v.is_slashable_validator(1), false);
    }

    #[test]
    fn is_active_validator() {
        let v = Validator {
            activation_epoch: 0,
            exit_epoch: 1,
            ..Validator::default()
        };
        assert_eq!(v.is_active_validator(0), true);
    }

    #[test]
    fn is_active_validator_activation_epoch_greater_than_epoch() {
        let v = Validator {
            activation_epoch: 1,
            exit_epoch: 2,
            ..Validator::default()
        };
        assert_eq!(v.is_active_validator(0), false);
    }

    #[test]
    fn is_active_validator_exit_epoch_equals_epoch() {
        let v = Validator {
            activation_epoch: 0,
            exit_epoch: 1,
            ..Validator::default()
        };
        assert_eq!(v.is_active_validator(1), false);
    }

    #[test]
    fn is_slashable_attestation_data_double_vote_false() {
        let attestation_data_1 = AttestationData {
            target: Checkpoint {
                epoch: 1,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        let attestation_data_2 = AttestationData {
            target: Checkpoint {
                epoch: 1,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        assert_eq!(
            attestation_data_1.is_slashable_attestation_data(&attestation_data_2),
            false
        );
    }

    #[test]
    fn is_slashable_attestation_data_double_vote_true() {
        let attestation_data_1 = AttestationData {
            target: Checkpoint {
                epoch: 1,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        let attestation_data_2 = AttestationData {
            target: Checkpoint {
                epoch: 1,
                root: H256::from([1; 32]),
            },
            ..AttestationData::default()
        };
        assert_eq!(
            attestation_data_1.is_slashable_attestation_data(&attestation_data_2),
            true
        );
    }

    #[test]
    fn is_slashable_attestation_data_surround_vote_true() {
        let attestation_data_1 = AttestationData {
            source: Checkpoint {
                epoch: 0,
                root: H256::from([0; 32]),
            },
            target: Checkpoint {
                epoch: 3,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        let attestation_data_2 = AttestationData {
            source: Checkpoint {
                epoch: 1,
                root: H256::from([1; 32]),
            },
            target: Checkpoint {
                epoch: 2,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        assert_eq!(
            attestation_data_1.is_slashable_attestation_data(&attestation_data_2),
            true
        );
    }

    #[test]
    fn signed_root_ignores_the_signature() {
        let mut block = BeaconBlock::default();
        let unsigned_root = block.signed_root();
        block.signature = Signature::from_bytes([3; 96]);
        assert_eq!(block.signed_root(), unsigned_root);
        assert_ne!(block.tree_hash_root(), unsigned_root);
    }
}
