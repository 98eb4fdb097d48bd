//! End-to-end session flow tests
//!
//! Drives the vote engine through its public surface (commands in,
//! occurrences in, lines out through a memory sink) with the tokio clock
//! paused so timer paths are deterministic.

use std::sync::Arc;
use std::time::Duration;

use tallybot::config::EngineConfig;
use tallybot::engine::VoteEngine;
use tallybot::identity::Identity;
use tallybot::occurrences::{
    AccountResolved, ChatMessage, Departure, Occurrence, PermissionLevel, Rename,
};
use tallybot::outbound::MemorySink;

fn new_engine(config: EngineConfig) -> (VoteEngine, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let engine = VoteEngine::new(config, sink.clone());
    assert!(engine.config().validate().is_ok());
    (engine, sink)
}

fn chat(channel: &str, nick: &str, text: &str) -> Occurrence {
    Occurrence::Chat(ChatMessage::new(channel, Identity::nick(nick), text))
}

/// Let spawned session tasks drain their queues.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_start_conflicts_and_leaves_tallies_untouched() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    settle().await;

    engine.run_command("#rust", "start 10s yes no").await;
    let texts = sink.texts_for("#rust");
    assert!(texts.contains(&"there is already an ongoing vote in this channel".to_string()));

    engine.dispatch(chat("#rust", "bob", "blue"));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "*red* : 1 vote (50.0%)"));
    assert!(texts.iter().any(|t| t == "*blue* : 1 vote (50.0%)"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_votes_match_case_insensitively() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "RED"));
    engine.dispatch(chat("#rust", "bob", "Red"));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "*red* : 2 votes (100.0%)"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_no_revoting_per_identity() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    engine.dispatch(chat("#rust", "alice", "blue"));
    engine.dispatch(chat("#rust", "bob", "red"));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    // Two distinct voters, two counted votes.
    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "*red* : 2 votes (100.0%)"));
    assert!(texts.iter().any(|t| t == "*blue* : 0 votes"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_rename_preserves_vote_and_still_blocks_revote() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    engine.dispatch(Occurrence::Rename(Rename::new("alice", "alice_away")));
    engine.dispatch(chat("#rust", "alice_away", "blue"));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "*red* : 1 vote (100.0%)"));
    assert!(texts.iter().any(|t| t == "*blue* : 0 votes"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_account_resolution_migrates_the_entry() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    engine.dispatch(Occurrence::Account(AccountResolved::new("alice", "alice_acct")));
    // Now logged in; the vote must follow the account key.
    engine.dispatch(Occurrence::Chat(ChatMessage::new(
        "#rust",
        Identity::nick("alice").with_account("alice_acct"),
        "blue",
    )));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "*red* : 1 vote (100.0%)"));
    assert!(texts.iter().any(|t| t == "*blue* : 0 votes"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_end_reports_immediately_then_abort_finds_nothing() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    settle().await;
    engine.run_command("#rust", "end").await;
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "Voting complete, results:"));
    assert!(!engine.has_session("#rust"));

    engine.run_command("#rust", "abort").await;
    let texts = sink.texts_for("#rust");
    assert!(texts.contains(&"there is no ongoing vote in this channel".to_string()));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_abort_produces_no_report_and_frees_the_channel() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    settle().await;
    engine.abort_vote("#rust").await.unwrap();
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.contains(&"Vote aborted.".to_string()));
    assert!(!texts.iter().any(|t| t.starts_with("Voting complete")));

    // The channel is immediately free for a new session.
    engine.start_vote("#rust", "10s yes no").await.unwrap();
    settle().await;
    let stats = engine.stats();
    assert_eq!(stats.registered_sessions, 1);
    assert_eq!(stats.routed_sessions, 1);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_deadline_fires_and_reports() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "10s red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    settle().await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "Voting complete, results:"));
    assert!(texts.iter().any(|t| t == "*red* : 1 vote (100.0%)"));
    assert!(!engine.has_session("#rust"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_no_one_voted() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "10s red blue").await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.contains(&"Voting complete! No one voted.".to_string()));
    // No per-choice lines at all.
    assert!(!texts.iter().any(|t| t.contains("votes (")));
    assert!(!texts.iter().any(|t| t.contains("0 votes")));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_reported_percentages_sum_to_one_hundred() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue green").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    engine.dispatch(chat("#rust", "bob", "red"));
    engine.dispatch(chat("#rust", "carol", "blue"));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    let texts = sink.texts_for("#rust");
    let sum: f64 = texts
        .iter()
        .filter_map(|t| {
            let start = t.find('(')? + 1;
            let end = t.find("%)")?;
            t[start..end].parse::<f64>().ok()
        })
        .sum();
    assert!((sum - 100.0).abs() < 0.11, "percentages summed to {}", sum);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_five_minute_vote_reminders() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "5m red blue").await.unwrap();
    settle().await;

    tokio::time::sleep(Duration::from_secs(185)).await;
    settle().await;
    let texts = sink.texts_for("#rust");
    assert!(texts
        .contains(&"*2 minutes* left to vote! Cast your vote for one of: blue, red".to_string()));
    // No 1-hour reminder: 5 minutes < 2x 1 hour.
    assert!(!texts.iter().any(|t| t.contains("1 hour")));

    tokio::time::sleep(Duration::from_secs(90)).await;
    settle().await;
    let texts = sink.texts_for("#rust");
    assert!(texts
        .contains(&"*30 seconds* left to vote! Cast your vote for one of: blue, red".to_string()));

    // Let the deadline land too.
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert!(sink
        .texts_for("#rust")
        .contains(&"Voting complete! No one voted.".to_string()));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_stale_reminders_are_dropped_after_abort() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "5m red blue").await.unwrap();
    engine.abort_vote("#rust").await.unwrap();
    settle().await;
    sink.clear();

    tokio::time::sleep(Duration::from_secs(301)).await;
    settle().await;

    // Neither reminders nor a report: every timer saw a stale slot.
    assert!(sink.texts_for("#rust").is_empty());
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_departure_retracts_the_cast_vote() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    engine.dispatch(Occurrence::Departure(Departure::quit(Identity::nick("alice"))));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    assert!(sink
        .texts_for("#rust")
        .contains(&"Voting complete! No one voted.".to_string()));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_departure_ignored_when_only_online_flag_off() {
    let config = EngineConfig {
        only_online_users_count: false,
        ..EngineConfig::default()
    };
    let (engine, sink) = new_engine(config);

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red"));
    engine.dispatch(Occurrence::Departure(Departure::part(
        Identity::nick("alice"),
        "#rust",
    )));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    assert!(sink
        .texts_for("#rust")
        .iter()
        .any(|t| t == "*red* : 1 vote (100.0%)"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_only_registered_may_vote() {
    let config = EngineConfig {
        only_registered_may_vote: true,
        ..EngineConfig::default()
    };
    let (engine, sink) = new_engine(config);

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "anon", "red"));
    engine.dispatch(Occurrence::Chat(
        ChatMessage::new("#rust", Identity::nick("alice"), "blue")
            .with_permission(PermissionLevel::Registered),
    ));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "*red* : 0 votes"));
    assert!(texts.iter().any(|t| t == "*blue* : 1 vote (100.0%)"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_conversation_lines_are_not_vote_attempts() {
    let (engine, sink) = new_engine(EngineConfig::default());

    engine.start_vote("#rust", "1h red blue").await.unwrap();
    engine.dispatch(chat("#rust", "alice", "red is clearly best"));
    engine.dispatch(chat("#rust", "bob", "   "));
    engine.dispatch(chat("#rust", "carol", "purple"));
    engine.dispatch(chat("#rust", "dave", " red "));
    settle().await;
    engine.end_vote("#rust").await.unwrap();
    settle().await;

    // Only dave's trimmed single-word vote counted; alice can still vote
    // later since her multi-word line was conversation, not a ballot.
    let texts = sink.texts_for("#rust");
    assert!(texts.iter().any(|t| t == "*red* : 1 vote (100.0%)"));
    engine.shutdown();
}
