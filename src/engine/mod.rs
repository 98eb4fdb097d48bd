//! Vote Engine
//!
//! The facade the surrounding router and transport talk to: the command
//! surface (start/abort/end), occurrence dispatch into live session
//! queues, and engine-wide shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::commands::{parse_duration, CommandError};
use crate::config::EngineConfig;
use crate::occurrences::Occurrence;
use crate::outbound::ChannelSink;
use crate::registry::{SessionRegistry, SessionToken};
use crate::reminders::{self, format_remaining};
use crate::session::{SessionFlags, SessionInput, VoteSession};
use crate::tally::{display_form, TallyBoard};

/// Channel -> live session queue. Routing only; the registry stays the
/// authority on whether a session may act.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    routes: Mutex<HashMap<String, Route>>,
}

#[derive(Debug)]
struct Route {
    token: SessionToken,
    queue: UnboundedSender<SessionInput>,
}

impl SessionDirectory {
    fn insert(&self, channel: &str, token: SessionToken, queue: UnboundedSender<SessionInput>) {
        self.routes
            .lock()
            .insert(channel.to_string(), Route { token, queue });
    }

    /// Remove a route on session termination, only if the token still
    /// matches, so a stale session never unsubscribes its successor.
    pub fn remove(&self, channel: &str, token: SessionToken) {
        let mut routes = self.routes.lock();
        if let Some(route) = routes.get(channel) {
            if route.token == token {
                routes.remove(channel);
            }
        }
    }

    fn send_to(&self, channel: &str, input: SessionInput) {
        if let Some(route) = self.routes.lock().get(channel) {
            // A just-terminated session has a closed queue; that's fine.
            let _ = route.queue.send(input);
        }
    }

    fn broadcast(&self, occurrence: &Occurrence) {
        for route in self.routes.lock().values() {
            let _ = route
                .queue
                .send(SessionInput::Occurrence(occurrence.clone()));
        }
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.routes.lock().contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    fn clear(&self) {
        self.routes.lock().clear();
    }
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Slots in the registry (active or ending).
    pub registered_sessions: usize,
    /// Session tasks still routed (not yet terminated).
    pub routed_sessions: usize,
}

/// The engine. Cheap to share behind an `Arc`; all mutation is behind the
/// registry and directory locks.
pub struct VoteEngine {
    config: EngineConfig,
    registry: Arc<SessionRegistry>,
    directory: Arc<SessionDirectory>,
    sink: Arc<dyn ChannelSink>,
    shutdown: CancellationToken,
}

impl VoteEngine {
    pub fn new(config: EngineConfig, sink: Arc<dyn ChannelSink>) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            directory: Arc::new(SessionDirectory::default()),
            sink,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            registered_sessions: self.registry.len(),
            routed_sessions: self.directory.len(),
        }
    }

    /// Whether the channel has a registered session (active or ending).
    pub fn has_session(&self, channel: &str) -> bool {
        self.registry.lookup(channel).is_some()
    }

    /// Cancel all pending timers and close every session queue. Draining
    /// session tasks exit silently.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.directory.clear();
    }

    /// Handle a `start` command: `args` is `"<duration> <choice1> <choice2> ..."`.
    /// On success the session task and its timers are running and the
    /// confirmation line has been sent.
    pub async fn start_vote(&self, channel: &str, args: &str) -> Result<(), CommandError> {
        let mut words = args.split_whitespace();
        let duration_text = words.next().ok_or_else(|| self.usage())?;
        let choice_words: Vec<&str> = words.collect();
        if choice_words.is_empty() {
            return Err(self.usage());
        }

        let duration = parse_duration(duration_text)?;

        if self.config.forbid_prefixed_choices {
            for word in &choice_words {
                let display = display_form(word);
                if !display.is_empty() && display.starts_with(&self.config.command_prefix) {
                    return Err(CommandError::PrefixedChoice(display));
                }
            }
        }
        let board = TallyBoard::build(&choice_words)?;

        let token = self
            .registry
            .claim(channel)
            .map_err(|_| CommandError::Conflict)?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        self.directory.insert(channel, token, queue_tx.clone());

        let names = board.display_names().join(", ");
        let session = VoteSession::new(
            channel,
            token,
            board,
            SessionFlags::from(&self.config),
            self.registry.clone(),
            self.directory.clone(),
            self.sink.clone(),
        );

        reminders::spawn_timers(
            duration,
            channel,
            token,
            self.registry.clone(),
            queue_tx,
            self.shutdown.clone(),
        );
        tokio::spawn(session.run(queue_rx));

        info!(%channel, %token, duration_secs = duration.as_secs(), "vote started");
        self.sink
            .send_line(
                channel,
                &format!(
                    "Voting commenced! You have *{}* to vote for one of: {}",
                    format_remaining(duration),
                    names
                ),
            )
            .await;
        Ok(())
    }

    /// Handle an `abort`/`stop` command: remove the slot, wake the session
    /// so it exits now, acknowledge. No report is produced.
    pub async fn abort_vote(&self, channel: &str) -> Result<(), CommandError> {
        self.registry
            .abort(channel)
            .map_err(|_| CommandError::NoOngoingVote)?;
        self.directory.send_to(channel, SessionInput::Wake);

        info!(%channel, "vote aborted");
        self.sink.send_line(channel, "Vote aborted.").await;
        Ok(())
    }

    /// Handle an `end` command: mark the slot ending-early and wake the
    /// session; it reports with current tallies and cleans up itself.
    pub async fn end_vote(&self, channel: &str) -> Result<(), CommandError> {
        self.registry
            .end_early(channel)
            .map_err(|_| CommandError::NoOngoingVote)?;
        self.directory.send_to(channel, SessionInput::Wake);

        info!(%channel, "vote ending early");
        Ok(())
    }

    /// Route one occurrence. Chat, parts and timer fires go to the
    /// channel's session; renames, account resolutions and quits concern
    /// every live session.
    pub fn dispatch(&self, occurrence: Occurrence) {
        enum Target {
            Channel(String),
            Broadcast,
        }

        let target = match &occurrence {
            Occurrence::Chat(message) => Target::Channel(message.channel.clone()),
            Occurrence::Timer(fire) => Target::Channel(fire.channel.clone()),
            Occurrence::Departure(departure) => match &departure.channel {
                Some(channel) => Target::Channel(channel.clone()),
                None => Target::Broadcast,
            },
            Occurrence::Rename(_) | Occurrence::Account(_) => Target::Broadcast,
        };

        match target {
            Target::Channel(channel) => {
                self.directory
                    .send_to(&channel, SessionInput::Occurrence(occurrence));
            }
            Target::Broadcast => self.directory.broadcast(&occurrence),
        }
    }

    /// Run one already-routed command line (`"start 5m red blue"`,
    /// `"abort"`, `"end"`). Failures become user-facing lines on the
    /// sink; nothing propagates.
    pub async fn run_command(&self, channel: &str, line: &str) {
        let trimmed = line.trim();
        let (command, args) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));

        let result = match command {
            "start" => self.start_vote(channel, args).await,
            "abort" | "stop" => self.abort_vote(channel).await,
            "end" => self.end_vote(channel).await,
            _ => {
                debug!(%channel, %command, "unrecognized vote command");
                Err(self.usage())
            }
        };

        if let Err(err) = result {
            self.sink.send_line(channel, &err.to_string()).await;
        }
    }

    fn usage(&self) -> CommandError {
        CommandError::Usage {
            prefix: self.config.command_prefix.clone(),
        }
    }
}
