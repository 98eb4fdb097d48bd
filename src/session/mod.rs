//! Vote Session Task
//!
//! The per-session state machine. Each live session is one task consuming
//! an explicit occurrence queue; on every resumption it re-reads the
//! session registry before acting, so abort, early end and supersede all
//! take effect cooperatively without a cancellation primitive.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::engine::SessionDirectory;
use crate::identity::VoterRegistry;
use crate::occurrences::{ChatMessage, Departure, Occurrence, PermissionLevel, TimerFire};
use crate::outbound::ChannelSink;
use crate::registry::{SessionRegistry, SessionSlot, SessionToken};
use crate::reminders::render_reminder;
use crate::tally::{self, TallyBoard};

/// One item on a session's queue. `Wake` carries no payload; abort and
/// early end send it so the registry re-read happens immediately instead
/// of on the next organic occurrence.
#[derive(Debug, Clone)]
pub enum SessionInput {
    Occurrence(Occurrence),
    Wake,
}

/// The config flags one session snapshots at start.
#[derive(Debug, Clone, Copy)]
pub struct SessionFlags {
    pub only_online_users_count: bool,
    pub only_registered_may_vote: bool,
}

impl From<&EngineConfig> for SessionFlags {
    fn from(config: &EngineConfig) -> Self {
        Self {
            only_online_users_count: config.only_online_users_count,
            only_registered_may_vote: config.only_registered_may_vote,
        }
    }
}

/// What the handled input means for the loop.
enum Flow {
    Continue,
    /// The deadline fired: report, release, terminate.
    Report,
    /// Internal invariant break: terminate this session without a report.
    Fatal,
}

/// State owned by one running session. Mutated only by its own task.
pub struct VoteSession {
    channel: String,
    token: SessionToken,
    board: TallyBoard,
    voters: VoterRegistry,
    flags: SessionFlags,
    registry: Arc<SessionRegistry>,
    directory: Arc<SessionDirectory>,
    sink: Arc<dyn ChannelSink>,
}

impl VoteSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: impl Into<String>,
        token: SessionToken,
        board: TallyBoard,
        flags: SessionFlags,
        registry: Arc<SessionRegistry>,
        directory: Arc<SessionDirectory>,
        sink: Arc<dyn ChannelSink>,
    ) -> Self {
        Self {
            channel: channel.into(),
            token,
            board,
            voters: VoterRegistry::new(),
            flags,
            registry,
            directory,
            sink,
        }
    }

    /// Consume the queue until termination. Every resumption starts with a
    /// registry re-read; a token must never be assumed valid across a
    /// suspension point.
    pub async fn run(mut self, mut queue: UnboundedReceiver<SessionInput>) {
        debug!(channel = %self.channel, token = %self.token, "vote session started");

        while let Some(input) = queue.recv().await {
            match self.registry.lookup(&self.channel) {
                None => {
                    debug!(
                        channel = %self.channel,
                        token = %self.token,
                        "slot removed; exiting without report"
                    );
                    break;
                }
                Some(SessionSlot::EndingEarly) => {
                    self.report().await;
                    self.registry.release(&self.channel, self.token);
                    break;
                }
                Some(SessionSlot::Active(current)) if current == self.token => {
                    match self.handle(input).await {
                        Flow::Continue => {}
                        Flow::Report => {
                            self.report().await;
                            self.registry.release(&self.channel, self.token);
                            break;
                        }
                        Flow::Fatal => {
                            self.registry.release(&self.channel, self.token);
                            break;
                        }
                    }
                }
                Some(SessionSlot::Active(other)) => {
                    debug!(
                        channel = %self.channel,
                        token = %self.token,
                        superseded_by = %other,
                        "superseded; exiting without report"
                    );
                    break;
                }
            }
        }

        // Unsubscribe. Guarded by token, so a newer session's route stays.
        self.directory.remove(&self.channel, self.token);
        debug!(channel = %self.channel, token = %self.token, "vote session terminated");
    }

    async fn handle(&mut self, input: SessionInput) -> Flow {
        let occurrence = match input {
            // The registry re-read above already did the work.
            SessionInput::Wake => return Flow::Continue,
            SessionInput::Occurrence(occurrence) => occurrence,
        };

        match occurrence {
            Occurrence::Chat(message) => self.on_chat(message),
            Occurrence::Rename(rename) => {
                self.voters.migrate(&rename.old_nickname, &rename.new_nickname);
                Flow::Continue
            }
            Occurrence::Account(resolved) => {
                self.voters.migrate(&resolved.nickname, &resolved.account);
                Flow::Continue
            }
            Occurrence::Departure(departure) => self.on_departure(departure),
            Occurrence::Timer(fire) => self.on_timer(fire).await,
        }
    }

    fn on_chat(&mut self, message: ChatMessage) -> Flow {
        if message.channel != self.channel {
            error!(
                channel = %self.channel,
                got = %message.channel,
                "chat message routed to the wrong session"
            );
            return Flow::Fatal;
        }

        let text = message.text.trim();
        // Multi-word lines are conversation, not vote attempts.
        if text.is_empty() || text.contains(char::is_whitespace) {
            return Flow::Continue;
        }

        if self.flags.only_registered_may_vote
            && message.permission < PermissionLevel::Registered
        {
            return Flow::Continue;
        }

        let identity_key = message.sender.key();
        if self.voters.has_voted(&identity_key) {
            return Flow::Continue;
        }

        let choice_key = tally::normalize(text);
        if self.board.record(&choice_key) {
            self.voters.record(identity_key, choice_key);
        }
        Flow::Continue
    }

    fn on_departure(&mut self, departure: Departure) -> Flow {
        if let Some(ref parted) = departure.channel {
            if *parted != self.channel {
                error!(
                    channel = %self.channel,
                    got = %parted,
                    "departure routed to the wrong session"
                );
                return Flow::Fatal;
            }
        }
        if !self.flags.only_online_users_count {
            return Flow::Continue;
        }
        // Only online voters count: the departed voter's cast vote becomes
        // uncounted and the slot is free if they return.
        if let Some(choice_key) = self.voters.retract(&departure.identity.key()) {
            self.board.retract(&choice_key);
        }
        Flow::Continue
    }

    async fn on_timer(&mut self, fire: TimerFire) -> Flow {
        if fire.token != self.token || fire.channel != self.channel {
            error!(
                channel = %self.channel,
                token = %self.token,
                fired_for = %fire.token,
                "timer fire for a different session"
            );
            return Flow::Fatal;
        }
        match fire.reminder {
            Some(reminder) => {
                let line = render_reminder(reminder.remaining, &self.board.display_names());
                self.sink.send_line(&self.channel, &line).await;
                Flow::Continue
            }
            // Bare deadline fire.
            None => Flow::Report,
        }
    }

    async fn report(&self) {
        for line in tally::render_report(&self.board) {
            self.sink.send_line(&self.channel, &line).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::outbound::MemorySink;
    use tokio::sync::mpsc;

    fn flags() -> SessionFlags {
        SessionFlags {
            only_online_users_count: true,
            only_registered_may_vote: false,
        }
    }

    fn fixture(
        channel: &str,
    ) -> (
        Arc<SessionRegistry>,
        Arc<SessionDirectory>,
        Arc<MemorySink>,
        SessionToken,
    ) {
        let registry = Arc::new(SessionRegistry::new());
        let directory = Arc::new(SessionDirectory::default());
        let sink = Arc::new(MemorySink::new());
        let token = registry.claim(channel).unwrap();
        (registry, directory, sink, token)
    }

    fn session(
        channel: &str,
        token: SessionToken,
        registry: &Arc<SessionRegistry>,
        directory: &Arc<SessionDirectory>,
        sink: &Arc<MemorySink>,
    ) -> VoteSession {
        VoteSession::new(
            channel,
            token,
            TallyBoard::build(&["red", "blue"]).unwrap(),
            flags(),
            registry.clone(),
            directory.clone(),
            sink.clone(),
        )
    }

    #[tokio::test]
    async fn test_superseded_session_exits_silently() {
        let (registry, directory, sink, stale) = fixture("#rust");
        let session = session("#rust", stale, &registry, &directory, &sink);

        // Another session took over the channel.
        registry.abort("#rust").unwrap();
        let _fresh = registry.claim("#rust").unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SessionInput::Wake).unwrap();
        drop(tx);
        session.run(rx).await;

        // No report, and the newer session's slot is untouched.
        assert!(sink.lines().is_empty());
        assert!(registry.lookup("#rust").is_some());
    }

    #[tokio::test]
    async fn test_foreign_timer_fire_is_fatal_without_report() {
        let (registry, directory, sink, token) = fixture("#rust");
        let session = session("#rust", token, &registry, &directory, &sink);

        let (tx, rx) = mpsc::unbounded_channel();
        let foreign = registry.claim("#elsewhere").unwrap();
        tx.send(SessionInput::Occurrence(Occurrence::Timer(TimerFire {
            channel: "#rust".to_string(),
            token: foreign,
            reminder: None,
        })))
        .unwrap();
        drop(tx);
        session.run(rx).await;

        assert!(sink.lines().is_empty());
        // The broken session released its own slot.
        assert!(registry.lookup("#rust").is_none());
    }

    #[tokio::test]
    async fn test_queue_close_exits_without_report() {
        let (registry, directory, sink, token) = fixture("#rust");
        let session = session("#rust", token, &registry, &directory, &sink);

        let (tx, rx) = mpsc::unbounded_channel::<SessionInput>();
        drop(tx);
        session.run(rx).await;

        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_fire_reports_and_releases() {
        let (registry, directory, sink, token) = fixture("#rust");
        let mut s = session("#rust", token, &registry, &directory, &sink);
        s.board.record("red");
        s.voters.record("alice", "red");

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SessionInput::Occurrence(Occurrence::Chat(
            ChatMessage::new("#rust", Identity::nick("bob"), "blue"),
        )))
        .unwrap();
        tx.send(SessionInput::Occurrence(Occurrence::Timer(TimerFire {
            channel: "#rust".to_string(),
            token,
            reminder: None,
        })))
        .unwrap();
        drop(tx);
        s.run(rx).await;

        let texts = sink.texts_for("#rust");
        assert_eq!(texts[0], "Voting complete, results:");
        assert!(texts.iter().any(|t| t.contains("*red* : 1 vote")));
        assert!(texts.iter().any(|t| t.contains("*blue* : 1 vote")));
        assert!(registry.lookup("#rust").is_none());
    }
}
