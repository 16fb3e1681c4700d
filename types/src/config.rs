use core::fmt::Debug;

use crate::primitives::{DomainType, Epoch, Gwei, Slot, UnixSeconds, ValidatorIndex};

pub const DOMAIN_BEACON_PROPOSER: DomainType = 0;
pub const DOMAIN_BEACON_ATTESTER: DomainType = 1;
pub const DOMAIN_RANDAO: DomainType = 2;
pub const DOMAIN_DEPOSIT: DomainType = 3;
pub const DOMAIN_VOLUNTARY_EXIT: DomainType = 4;
pub const DOMAIN_TRANSFER: DomainType = 5;

/// Deployment configuration. Injected into every component as a type
/// parameter; the provided methods carry the mainnet values and presets
/// override what differs. Nothing in the transition code may hard-code any of
/// these.
pub trait Config: Clone + Copy + PartialEq + Eq + Debug + Default {
    // Time
    fn slots_per_epoch() -> u64 {
        32
    }
    fn seconds_per_slot() -> UnixSeconds {
        12
    }
    fn min_attestation_inclusion_delay() -> Slot {
        1
    }
    fn min_seed_lookahead() -> Epoch {
        1
    }
    fn activation_exit_delay() -> Epoch {
        4
    }
    fn min_validator_withdrawability_delay() -> Epoch {
        256
    }
    fn persistent_committee_period() -> Epoch {
        2_048
    }
    fn min_epochs_to_inactivity_penalty() -> Epoch {
        4
    }

    // Committees
    fn max_committees_per_slot() -> u64 {
        64
    }
    fn target_committee_size() -> u64 {
        128
    }
    fn shuffle_round_count() -> u8 {
        90
    }

    // Registry
    fn min_per_epoch_churn_limit() -> u64 {
        4
    }
    fn churn_limit_quotient() -> u64 {
        65_536
    }
    fn min_genesis_active_validator_count() -> ValidatorIndex {
        65_536
    }
    fn min_genesis_time() -> UnixSeconds {
        1_578_009_600
    }

    // Balances
    fn min_deposit_amount() -> Gwei {
        1_000_000_000
    }
    fn max_effective_balance() -> Gwei {
        32_000_000_000
    }
    fn ejection_balance() -> Gwei {
        16_000_000_000
    }
    fn effective_balance_increment() -> Gwei {
        1_000_000_000
    }

    // Rewards and penalties
    fn base_reward_factor() -> u64 {
        64
    }
    fn proposer_reward_quotient() -> u64 {
        8
    }
    fn whistleblower_reward_quotient() -> u64 {
        512
    }
    fn min_slashing_penalty_quotient() -> u64 {
        32
    }
    fn inactivity_penalty_quotient() -> u64 {
        1 << 25
    }

    // Rotating buffer lengths
    fn epochs_per_historical_vector() -> u64 {
        65_536
    }
    fn epochs_per_slashings_vector() -> u64 {
        8_192
    }
    fn slots_per_historical_root() -> u64 {
        8_192
    }
    fn slots_per_eth1_voting_period() -> u64 {
        1_024
    }

    // Fork choice
    fn safe_slots_to_update_justified() -> Slot {
        8
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct MainnetConfig;

impl Config for MainnetConfig {}

/// The small preset used for interop and testing. Only the values that differ
/// from mainnet are overridden.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct MinimalConfig;

impl Config for MinimalConfig {
    fn slots_per_epoch() -> u64 {
        8
    }
    fn seconds_per_slot() -> UnixSeconds {
        6
    }
    fn max_committees_per_slot() -> u64 {
        4
    }
    fn target_committee_size() -> u64 {
        4
    }
    fn shuffle_round_count() -> u8 {
        10
    }
    fn min_genesis_active_validator_count() -> ValidatorIndex {
        64
    }
    fn persistent_committee_period() -> Epoch {
        128
    }
    fn epochs_per_historical_vector() -> u64 {
        64
    }
    fn epochs_per_slashings_vector() -> u64 {
        64
    }
    fn slots_per_historical_root() -> u64 {
        64
    }
    fn slots_per_eth1_voting_period() -> u64 {
        16
    }
    fn safe_slots_to_update_justified() -> Slot {
        2
    }
}
