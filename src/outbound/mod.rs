//! Outbound Line Sink
//!
//! The narrow "send a line of text to a channel" collaborator. Colouring,
//! formatting and delivery mechanics belong to the transport behind this
//! trait, not to the engine.

use async_trait::async_trait;
use parking_lot::Mutex;

/// Sends plain text lines to a channel.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn send_line(&self, channel: &str, text: &str);
}

/// One captured line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentLine {
    pub channel: String,
    pub text: String,
}

/// Collects lines in memory. Test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<SentLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<SentLine> {
        self.lines.lock().clone()
    }

    /// Texts sent to one channel, in order.
    pub fn texts_for(&self, channel: &str) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.channel == channel)
            .map(|line| line.text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

#[async_trait]
impl ChannelSink for MemorySink {
    async fn send_line(&self, channel: &str, text: &str) {
        self.lines.lock().push(SentLine {
            channel: channel.to_string(),
            text: text.to_string(),
        });
    }
}

/// Prints lines to stdout as `[#channel] text`. Used by the binary, where
/// stdout stands in for the real chat transport.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl ChannelSink for StdoutSink {
    async fn send_line(&self, channel: &str, text: &str) {
        println!("[{}] {}", channel, text);
    }
}
