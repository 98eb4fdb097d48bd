//! tallybot engine library
//!
//! A per-channel vote/poll session engine for chat networks: timed
//! multi-choice ballots tallied from plain-text messages, with voter
//! identity tracked across renames and account logins, time-remaining
//! reminders, and cooperative cancellation through a shared session
//! registry.
//!
//! The chat transport, command authorization and output formatting are
//! external collaborators: occurrences come in typed, lines go out as
//! plain text through [`outbound::ChannelSink`].

pub mod commands;
pub mod config;
pub mod engine;
pub mod identity;
pub mod logging;
pub mod occurrences;
pub mod outbound;
pub mod registry;
pub mod reminders;
pub mod session;
pub mod tally;
