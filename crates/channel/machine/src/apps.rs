//! Off-chain app logic consulted by the Update and Uninstall proposers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use channel_types::{Address, Terms};

use crate::error::AppError;

/// Rules of one app definition, mirroring its on-chain contract.
pub trait AppDefinition: Send + Sync {
    /// Whether no further updates are allowed from `state`.
    fn is_state_terminal(&self, state: &[u8]) -> Result<bool, AppError>;

    /// Participant whose move it is in `state`.
    fn turn_taker(&self, state: &[u8], participants: &[Address]) -> Result<Address, AppError>;

    /// Payout per participant if the app were resolved at `state`.
    fn resolve(
        &self,
        state: &[u8],
        participants: &[Address],
        terms: &Terms,
    ) -> Result<BTreeMap<Address, u128>, AppError>;
}

/// App definitions keyed by contract address.
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: HashMap<Address, Arc<dyn AppDefinition>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, addr: Address, app: Arc<dyn AppDefinition>) {
        self.apps.insert(addr, app);
    }

    pub fn get(&self, addr: &Address) -> Option<&Arc<dyn AppDefinition>> {
        self.apps.get(addr)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.apps.keys().collect::<Vec<_>>())
            .finish()
    }
}
