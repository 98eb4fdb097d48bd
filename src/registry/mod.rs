//! Session Registry
//!
//! Single-slot-per-channel authority map. The registry is the one source
//! of truth for "is this session still authoritative": every session task
//! re-reads its slot on each resumption, and every timer callback re-reads
//! it at fire time. Cancellation (abort, early end, supersede) works only
//! by mutating the slot here.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Opaque identifier distinguishing a session instance from any session
/// that supersedes it in the same channel. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state of a channel's slot. Absence of a slot means no session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSlot {
    /// A live session identified by its token.
    Active(SessionToken),
    /// An `end` command was issued: the session must report with current
    /// tallies on its next resumption, then release the slot itself.
    EndingEarly,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("channel already has an ongoing vote")]
    Conflict,

    #[error("channel has no ongoing vote")]
    NotFound,
}

/// Channel -> slot map plus the token allocator.
#[derive(Debug)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, SessionSlot>>,
    next_token: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            // Tokens start at 1; zero never identifies a session.
            next_token: AtomicU64::new(1),
        }
    }

    /// Claim the channel for a new session, allocating its token.
    /// Fails without mutation if any slot exists, active or ending.
    pub fn claim(&self, channel: &str) -> Result<SessionToken, RegistryError> {
        let mut slots = self.slots.lock();
        if slots.contains_key(channel) {
            return Err(RegistryError::Conflict);
        }
        let token = SessionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        slots.insert(channel.to_string(), SessionSlot::Active(token));
        Ok(token)
    }

    /// Remove the slot. The session task sees absence on its next
    /// resumption and exits without reporting.
    pub fn abort(&self, channel: &str) -> Result<(), RegistryError> {
        match self.slots.lock().remove(channel) {
            Some(_) => Ok(()),
            None => Err(RegistryError::NotFound),
        }
    }

    /// Overwrite the slot with `EndingEarly`. The slot stays until the
    /// session task releases it after reporting.
    pub fn end_early(&self, channel: &str) -> Result<(), RegistryError> {
        match self.slots.lock().get_mut(channel) {
            Some(slot) => {
                *slot = SessionSlot::EndingEarly;
                Ok(())
            }
            None => Err(RegistryError::NotFound),
        }
    }

    pub fn lookup(&self, channel: &str) -> Option<SessionSlot> {
        self.slots.lock().get(channel).copied()
    }

    /// Remove the slot on session termination, but never a slot belonging
    /// to a different, newer session.
    pub fn release(&self, channel: &str, token: SessionToken) {
        let mut slots = self.slots.lock();
        match slots.get(channel) {
            Some(SessionSlot::Active(current)) if *current == token => {
                slots.remove(channel);
            }
            Some(SessionSlot::EndingEarly) => {
                slots.remove(channel);
            }
            _ => {}
        }
    }

    /// Number of registered slots (active or ending).
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
