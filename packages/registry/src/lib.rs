//! Alias registry for the Peerline signaling relay.
//!
//! Maps human-chosen aliases ("usernames" on the wire) to the connection that
//! currently owns them. The registry owns all entries: callers can only read
//! or request a transition through its operations, and every transition either
//! applies fully or leaves the map untouched.
//!
//! # Main Components
//!
//! * [`AliasRegistry`] - Concurrency-safe alias-to-connection mapping
//! * [`ClaimError`] and [`ReleaseError`] - Per-operation failure kinds
//!
//! # Example
//!
//! ```rust
//! use peerline_registry::AliasRegistry;
//!
//! let registry = AliasRegistry::new();
//! registry.claim("alice", "connection-1").unwrap();
//! assert_eq!(registry.resolve("alice").as_deref(), Some("connection-1"));
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

/// Opaque identifier for a live connection, issued by the transport layer.
///
/// Not guaranteed unique across time: the transport may reuse an identifier
/// after its connection closes, so entries must not outlive their connection.
pub type ConnectionId = String;

/// Errors that can occur when claiming an alias.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    /// The alias is already owned by a connection
    #[error("Alias {0:?} is already taken")]
    AliasTaken(String),
}

/// Errors that can occur when releasing an alias.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReleaseError {
    /// No entry exists for the alias
    #[error("Alias {0:?} is not registered")]
    NotFound(String),
    /// The alias is owned by a different connection
    #[error("Alias {0:?} is owned by another connection")]
    NotOwner(String),
}

/// Mapping from alias to owning connection.
///
/// At most one entry exists per alias; an alias with no entry is available.
/// The claim check-and-set happens inside a single write-lock critical
/// section, so exactly one of any set of concurrent claimants wins.
#[derive(Debug, Default)]
pub struct AliasRegistry {
    entries: RwLock<BTreeMap<String, ConnectionId>>,
}

impl AliasRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `alias` for `owner`.
    ///
    /// # Errors
    ///
    /// * If the alias already has an owner
    pub fn claim(&self, alias: &str, owner: &str) -> Result<(), ClaimError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        match entries.entry(alias.to_string()) {
            Entry::Occupied(_) => Err(ClaimError::AliasTaken(alias.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(owner.to_string());
                Ok(())
            }
        }
    }

    /// Releases `alias`, succeeding only if `requester` owns it.
    ///
    /// # Errors
    ///
    /// * If no entry exists for the alias
    /// * If the entry is owned by a different connection
    pub fn release(&self, alias: &str, requester: &str) -> Result<(), ReleaseError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        match entries.entry(alias.to_string()) {
            Entry::Vacant(_) => Err(ReleaseError::NotFound(alias.to_string())),
            Entry::Occupied(entry) => {
                if entry.get() == requester {
                    entry.remove();
                    Ok(())
                } else {
                    Err(ReleaseError::NotOwner(alias.to_string()))
                }
            }
        }
    }

    /// Looks up the connection that owns `alias`, if any.
    #[must_use]
    pub fn resolve(&self, alias: &str) -> Option<ConnectionId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(alias)
            .cloned()
    }

    /// Releases every alias owned by `owner` and returns the released
    /// aliases.
    ///
    /// Entries are leases bounded by their connection's lifetime; the
    /// disconnect hook calls this so a reused connection id can never be
    /// resolved from a stale alias.
    pub fn release_owner(&self, owner: &str) -> Vec<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let mut released = Vec::new();
        entries.retain(|alias, entry_owner| {
            if entry_owner.as_str() == owner {
                released.push(alias.clone());
                false
            } else {
                true
            }
        });

        released
    }

    /// Number of currently-claimed aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
