//! Tally & Report Engine
//!
//! Holds the per-choice counters for one session, computes sorted results
//! with percentages, and renders the human-readable outcome lines.

use std::collections::BTreeMap;

/// Errors building a choice set from start-command words.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TallyError {
    #[error("duplicate choice: {0}")]
    DuplicateChoice(String),

    #[error("at least two distinct choices are required")]
    TooFewChoices,
}

/// Strip a raw choice word down to its display form: trimmed, with any
/// trailing commas removed (choices are often given as "red, blue, green").
pub fn display_form(raw: &str) -> String {
    let mut s = raw.trim();
    while let Some(stripped) = s.strip_suffix(',') {
        s = stripped.trim_end();
    }
    s.to_string()
}

/// Case-fold a display form into the normalized lookup key.
pub fn normalize(display: &str) -> String {
    display.to_ascii_lowercase()
}

/// One choice on the ballot.
#[derive(Debug, Clone)]
pub struct Choice {
    /// Original casing, shown in output.
    pub display: String,
    /// Votes counted so far.
    pub tally: u32,
}

/// One line of the computed results.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceResult {
    pub display: String,
    pub votes: u32,
    /// Present only for nonzero tallies.
    pub percentage: Option<f64>,
}

/// The choice set and counters for one session. Keyed by normalized choice
/// key; BTreeMap keeps iteration (and therefore tie-breaking and reminder
/// listings) deterministic.
#[derive(Debug, Default)]
pub struct TallyBoard {
    choices: BTreeMap<String, Choice>,
}

impl TallyBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from raw start-command words. Words that normalize to
    /// nothing are skipped; duplicates and fewer than two distinct choices
    /// are errors.
    pub fn build(words: &[&str]) -> Result<Self, TallyError> {
        let mut board = Self::new();
        for raw in words {
            let display = display_form(raw);
            if display.is_empty() {
                continue;
            }
            board.insert(display)?;
        }
        if board.len() < 2 {
            return Err(TallyError::TooFewChoices);
        }
        Ok(board)
    }

    /// Insert one choice by display form.
    pub fn insert(&mut self, display: String) -> Result<(), TallyError> {
        let key = normalize(&display);
        if self.choices.contains_key(&key) {
            return Err(TallyError::DuplicateChoice(display));
        }
        self.choices.insert(key, Choice { display, tally: 0 });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Whether a normalized key names a choice on this ballot.
    pub fn contains(&self, key: &str) -> bool {
        self.choices.contains_key(key)
    }

    /// Count one vote for a normalized key. Returns false on a miss.
    pub fn record(&mut self, key: &str) -> bool {
        match self.choices.get_mut(key) {
            Some(choice) => {
                choice.tally += 1;
                true
            }
            None => false,
        }
    }

    /// Un-count one vote for a normalized key (departed voter).
    pub fn retract(&mut self, key: &str) {
        if let Some(choice) = self.choices.get_mut(key) {
            choice.tally = choice.tally.saturating_sub(1);
        }
    }

    /// Sum of all counted votes.
    pub fn total(&self) -> u32 {
        self.choices.values().map(|c| c.tally).sum()
    }

    /// Display names in deterministic (key) order, for reminders and the
    /// start confirmation.
    pub fn display_names(&self) -> Vec<&str> {
        self.choices.values().map(|c| c.display.as_str()).collect()
    }

    /// Results sorted ascending by tally, so the most-voted choice comes
    /// last (and is reported most prominently). Ties keep key order.
    pub fn results(&self) -> Vec<ChoiceResult> {
        let total = self.total();
        let mut results: Vec<ChoiceResult> = self
            .choices
            .values()
            .map(|c| ChoiceResult {
                display: c.display.clone(),
                votes: c.tally,
                percentage: (c.tally > 0)
                    .then(|| 100.0 * f64::from(c.tally) / f64::from(total)),
            })
            .collect();
        results.sort_by_key(|r| r.votes);
        results
    }
}

/// Render the final report as plain text lines. `*...*` is the emphasis
/// marker; colouring it is the formatting collaborator's job.
pub fn render_report(board: &TallyBoard) -> Vec<String> {
    if board.total() == 0 {
        return vec!["Voting complete! No one voted.".to_string()];
    }

    let mut lines = vec!["Voting complete, results:".to_string()];
    for result in board.results() {
        let line = match result.percentage {
            None => format!("*{}* : 0 votes", result.display),
            Some(pct) => format!(
                "*{}* : {} {} ({:.1}%)",
                result.display,
                result.votes,
                if result.votes == 1 { "vote" } else { "votes" },
                pct
            ),
        };
        lines.push(line);
    }
    lines
}
