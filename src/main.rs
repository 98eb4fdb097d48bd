//! tallybot binary.
//!
//! Wires the vote engine to a line-oriented JSON transport: one JSON
//! object per stdin line (routed commands and occurrences), output lines
//! printed to stdout. This stands in for the real chat transport, which
//! is an external collaborator.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use tallybot::config::EngineConfig;
use tallybot::engine::VoteEngine;
use tallybot::identity::Identity;
use tallybot::logging::{self, LoggingConfig};
use tallybot::occurrences::{
    AccountResolved, ChatMessage, Departure, Occurrence, PermissionLevel, Rename,
};
use tallybot::outbound::StdoutSink;

/// tallybot: timed multi-choice votes in chat channels.
#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version = env!("CARGO_PKG_VERSION"),
    about = "tallybot - a per-channel vote/poll session engine"
)]
struct Cli {
    /// Path to a JSON5 config file.
    #[arg(long, default_value = "tallybot.json5")]
    config: PathBuf,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

/// One stdin line. Commands arrive pre-routed and pre-authorized; the
/// upstream router owns prefixes and permissions.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Chat {
        channel: String,
        nickname: String,
        #[serde(default)]
        account: Option<String>,
        #[serde(default)]
        permission: PermissionLevel,
        text: String,
    },
    Rename {
        old_nickname: String,
        new_nickname: String,
    },
    Account {
        nickname: String,
        account: String,
    },
    Departure {
        nickname: String,
        #[serde(default)]
        account: Option<String>,
        #[serde(default)]
        channel: Option<String>,
    },
    Start {
        channel: String,
        args: String,
    },
    Abort {
        channel: String,
    },
    End {
        channel: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = logging::init(&LoggingConfig {
        log_level: cli.log_level.clone(),
        json: cli.log_json,
    }) {
        eprintln!("failed to initialize logging: {}", err);
        std::process::exit(1);
    }

    let config = match EngineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    let engine = Arc::new(VoteEngine::new(config, Arc::new(StdoutSink)));
    info!("vote engine ready; reading events from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&engine, &line).await,
                Ok(None) => break,
                Err(err) => {
                    error!("stdin read failed: {}", err);
                    break;
                }
            }
        }
    }

    engine.shutdown();
    info!("vote engine stopped");
}

async fn handle_line(engine: &VoteEngine, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let event: WireEvent = match serde_json::from_str(trimmed) {
        Ok(event) => event,
        Err(err) => {
            warn!("dropping unparseable event: {}", err);
            return;
        }
    };

    match event {
        WireEvent::Chat {
            channel,
            nickname,
            account,
            permission,
            text,
        } => {
            let mut sender = Identity::nick(nickname);
            sender.account = account;
            engine.dispatch(Occurrence::Chat(
                ChatMessage::new(channel, sender, text).with_permission(permission),
            ));
        }
        WireEvent::Rename {
            old_nickname,
            new_nickname,
        } => {
            engine.dispatch(Occurrence::Rename(Rename::new(old_nickname, new_nickname)));
        }
        WireEvent::Account { nickname, account } => {
            engine.dispatch(Occurrence::Account(AccountResolved::new(nickname, account)));
        }
        WireEvent::Departure {
            nickname,
            account,
            channel,
        } => {
            let mut identity = Identity::nick(nickname);
            identity.account = account;
            let departure = match channel {
                Some(channel) => Departure::part(identity, channel),
                None => Departure::quit(identity),
            };
            engine.dispatch(Occurrence::Departure(departure));
        }
        WireEvent::Start { channel, args } => {
            engine.run_command(&channel, &format!("start {}", args)).await;
        }
        WireEvent::Abort { channel } => engine.run_command(&channel, "abort").await,
        WireEvent::End { channel } => engine.run_command(&channel, "end").await,
    }
}
