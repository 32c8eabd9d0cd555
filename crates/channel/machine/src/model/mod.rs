//! Channel state model.
//!
//! All types are immutable snapshots: mutators return the next value and the
//! executor swaps it in on commit.

pub mod app_instance;
pub mod channel;
pub mod free_balance;

use std::collections::BTreeMap;

use channel_types::Address;

pub use app_instance::{AppInstance, AppInstanceSpec};
pub use channel::{virtual_channel_address, ChannelState, VirtualAgreement};
pub use free_balance::{FreeBalance, FREE_BALANCE_TIMEOUT};

/// Channels keyed by multisig address.
pub type ChannelStates = BTreeMap<Address, ChannelState>;

/// The non-virtual channel owned by exactly `a` and `b`.
pub fn channel_between<'a>(
    channels: &'a ChannelStates,
    a: &Address,
    b: &Address,
) -> Option<&'a ChannelState> {
    channels
        .values()
        .find(|ch| !ch.is_virtual && ch.has_owners(a, b))
}

/// Every installed app instance across all channels.
pub fn all_app_instances(channels: &ChannelStates) -> Vec<&AppInstance> {
    channels
        .values()
        .flat_map(|ch| ch.app_instances.values())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_channel_by_owner_pair() {
        let a = Address::new([1; 20]);
        let b = Address::new([2; 20]);
        let c = Address::new([3; 20]);
        let mut channels = ChannelStates::new();
        channels.insert(Address::new([7; 20]), ChannelState::new(Address::new([7; 20]), vec![a, b]));
        channels.insert(Address::new([8; 20]), ChannelState::new(Address::new([8; 20]), vec![b, c]));
        channels.insert(
            Address::new([9; 20]),
            ChannelState::new_virtual(Address::new([9; 20]), vec![a, c]),
        );

        assert_eq!(
            channel_between(&channels, &b, &a).map(|ch| ch.multisig_address),
            Some(Address::new([7; 20]))
        );
        assert!(channel_between(&channels, &a, &c).is_none());
        assert!(all_app_instances(&channels).is_empty());
    }
}
