//! Voter Identity Tracking
//!
//! Resolves raw senders into canonical voter keys and maintains the
//! who-voted-for-what map for one session, migrating entries when a voter
//! renames or logs into an account mid-vote.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Normalize a name for case-insensitive comparison (CASEMAPPING=ascii).
pub fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// A voter as seen on the wire: always a nickname, plus the account name
/// once the network has resolved one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Current nickname.
    pub nickname: String,
    /// Account name, if logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl Identity {
    /// Create an identity with no known account.
    pub fn nick(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            account: None,
        }
    }

    /// Attach an account name.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// The canonical key used to deduplicate one vote per person:
    /// the account name if known, else the nickname, case-folded.
    pub fn key(&self) -> String {
        fold(self.account.as_deref().unwrap_or(&self.nickname))
    }
}

/// Per-session map from identity key to the normalized choice key that
/// identity voted for. Presence of an entry means "has voted".
#[derive(Debug, Default)]
pub struct VoterRegistry {
    entries: HashMap<String, String>,
}

impl VoterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this identity has already cast a counted vote.
    pub fn has_voted(&self, identity_key: &str) -> bool {
        self.entries.contains_key(identity_key)
    }

    /// Record a cast vote for an identity.
    pub fn record(&mut self, identity_key: impl Into<String>, choice_key: impl Into<String>) {
        self.entries.insert(identity_key.into(), choice_key.into());
    }

    /// Re-key an entry from `old_name` to `new_name`, preserving the cast
    /// choice. No-op when `old_name` has no entry. An existing entry under
    /// the new key is overwritten (last-writer-wins re-keying).
    pub fn migrate(&mut self, old_name: &str, new_name: &str) {
        let old_key = fold(old_name);
        if let Some(choice) = self.entries.remove(&old_key) {
            self.entries.insert(fold(new_name), choice);
        }
    }

    /// Remove an identity's entry, returning the choice key that must be
    /// un-counted, if any.
    pub fn retract(&mut self, name: &str) -> Option<String> {
        self.entries.remove(&fold(name))
    }

    /// Number of identities with a counted vote.
    pub fn counted_voters(&self) -> usize {
        self.entries.len()
    }
}
