//! Occurrence Model
//!
//! Typed external events delivered to the engine by the surrounding
//! transport: chat messages, identity changes, departures, and timer fires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::registry::SessionToken;
use crate::reminders::Reminder;

/// Permission ladder as reported by the transport. Ordering matters:
/// `only_registered_may_vote` compares against `Registered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Anyone on the network, registered or not.
    #[default]
    Anyone,
    /// Logged into a services account.
    Registered,
    /// Channel operator.
    Operator,
}

/// A chat line in a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub sender: Identity,
    #[serde(default)]
    pub permission: PermissionLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(channel: impl Into<String>, sender: Identity, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            sender,
            permission: PermissionLevel::default(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_permission(mut self, permission: PermissionLevel) -> Self {
        self.permission = permission;
        self
    }
}

/// A nickname change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rename {
    pub old_nickname: String,
    pub new_nickname: String,
    pub timestamp: DateTime<Utc>,
}

impl Rename {
    pub fn new(old_nickname: impl Into<String>, new_nickname: impl Into<String>) -> Self {
        Self {
            old_nickname: old_nickname.into(),
            new_nickname: new_nickname.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A nickname logging into a services account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResolved {
    pub nickname: String,
    pub account: String,
    pub timestamp: DateTime<Utc>,
}

impl AccountResolved {
    pub fn new(nickname: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            account: account.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A part (carries the channel) or quit (does not).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Departure {
    pub identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Departure {
    /// A quit: the voter left the network entirely.
    pub fn quit(identity: Identity) -> Self {
        Self {
            identity,
            channel: None,
            timestamp: Utc::now(),
        }
    }

    /// A part from one channel.
    pub fn part(identity: Identity, channel: impl Into<String>) -> Self {
        Self {
            identity,
            channel: Some(channel.into()),
            timestamp: Utc::now(),
        }
    }
}

/// A scheduled one-shot timer firing back into a session's queue.
/// `reminder` is present for time-remaining reminders; absent for the
/// final deadline (which triggers reporting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerFire {
    pub channel: String,
    pub token: SessionToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<Reminder>,
}

/// Any externally-delivered event relevant to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Occurrence {
    Chat(ChatMessage),
    Rename(Rename),
    Account(AccountResolved),
    Departure(Departure),
    Timer(TimerFire),
}
