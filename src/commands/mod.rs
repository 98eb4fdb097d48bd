//! Command Validation
//!
//! Errors for the start/abort/end command surface and the abbreviated
//! duration grammar. Every variant's Display text is what the user sees
//! in the channel; nothing here escalates past a text line.

use std::time::Duration;

use crate::tally::TallyError;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("usage: {prefix}start <duration> <choice1> <choice2> ...")]
    Usage { prefix: String },

    #[error("at least two distinct choices are required")]
    TooFewChoices,

    #[error("duplicate choice: {0}")]
    DuplicateChoice(String),

    #[error("choice may not start with the command prefix: {0}")]
    PrefixedChoice(String),

    #[error("malformed duration: {0}")]
    MalformedDuration(String),

    #[error("the vote duration must be positive")]
    NonPositiveDuration,

    #[error("there is already an ongoing vote in this channel")]
    Conflict,

    #[error("there is no ongoing vote in this channel")]
    NoOngoingVote,
}

impl From<TallyError> for CommandError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::DuplicateChoice(display) => CommandError::DuplicateChoice(display),
            TallyError::TooFewChoices => CommandError::TooFewChoices,
        }
    }
}

/// Parse an abbreviated duration: bare seconds (`"300"`) or descending
/// unit groups (`"1d12h39m40s"`, any subset). Zero is not a duration.
pub fn parse_duration(text: &str) -> Result<Duration, CommandError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CommandError::MalformedDuration(text.to_string()));
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = trimmed
            .parse()
            .map_err(|_| CommandError::MalformedDuration(text.to_string()))?;
        if secs == 0 {
            return Err(CommandError::NonPositiveDuration);
        }
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    // Units must appear at most once, in d > h > m > s order.
    let mut last_rank = 0u8;
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let (rank, secs_per_unit) = match c.to_ascii_lowercase() {
            'd' => (1, 86_400),
            'h' => (2, 3_600),
            'm' => (3, 60),
            's' => (4, 1),
            _ => return Err(CommandError::MalformedDuration(text.to_string())),
        };
        if digits.is_empty() || rank <= last_rank {
            return Err(CommandError::MalformedDuration(text.to_string()));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| CommandError::MalformedDuration(text.to_string()))?;
        total = total.saturating_add(value.saturating_mul(secs_per_unit));
        digits.clear();
        last_rank = rank;
    }
    if !digits.is_empty() {
        // Trailing number with no unit, e.g. "1h30".
        return Err(CommandError::MalformedDuration(text.to_string()));
    }
    if total == 0 {
        return Err(CommandError::NonPositiveDuration);
    }
    Ok(Duration::from_secs(total))
}
