//! Connected-client registry.
//!
//! Tracks the set of associated client hardware addresses and computes
//! set-changed diffs. Equality is order-independent: the driver may
//! report the same membership in any order and that must not count as a
//! change, or listeners would see spurious notifications and the idle
//! timer would churn.

use std::collections::BTreeSet;

use crate::mac::MacAddress;

/// The set of associated clients, keyed by hardware address.
///
/// A `BTreeSet` gives order-independent equality and deterministic
/// iteration for notifications and dumps.
pub type ClientSet = BTreeSet<MacAddress>;

/// Registry over the current [`ClientSet`].
///
/// The set is replaced wholesale on each accepted update; callers only
/// ever observe complete snapshots.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: ClientSet,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a raw client report from the driver.
    ///
    /// `None` means "no report" and is ignored. Duplicate addresses in
    /// the report collapse. Returns the new snapshot only when the
    /// resulting set differs from the current one; a permutation of the
    /// current membership returns `None`.
    pub fn update<I>(&mut self, raw: Option<I>) -> Option<ClientSet>
    where
        I: IntoIterator<Item = MacAddress>,
    {
        let incoming: ClientSet = raw?.into_iter().collect();
        if incoming == self.clients {
            return None;
        }
        self.clients = incoming;
        Some(self.clients.clone())
    }

    /// Resets the registry to empty without producing a diff.
    ///
    /// Used on Started-entry, where the reset is part of establishing
    /// initial state rather than an observable change.
    pub fn clear(&mut self) {
        self.clients.clear();
    }

    /// Returns the current snapshot.
    #[must_use]
    pub const fn clients(&self) -> &ClientSet {
        &self.clients
    }

    /// Returns the number of associated clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` when no clients are associated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
