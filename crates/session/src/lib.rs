//! Conversation history for measurement sessions
//!
//! Two stores with different lifetimes: a bounded in-memory buffer that feeds
//! recent exchanges back into the agent prompt, and an append-only log file
//! that keeps everything.

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Default number of entries kept in memory
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Who produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Ai,
    /// Measurement plan produced for a request
    Plan,
    /// One agent step (model output and observation)
    Step,
}

impl Role {
    pub fn prefix(&self) -> &'static str {
        match self {
            Role::Human => "Human",
            Role::Ai => "AI",
            Role::Plan => "Plan",
            Role::Step => "Step",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One history entry
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub role: Role,
    pub content: String,
}

impl Entry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// `Role: content`
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

/// Last-N entries, oldest evicted first
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: Vec<Entry>,
    max_entries: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl HistoryBuffer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(Entry::new(role, content));
        self.enforce_max_entries();
    }

    fn enforce_max_entries(&mut self) {
        if self.entries.len() > self.max_entries {
            let to_remove = self.entries.len() - self.max_entries;
            self.entries.drain(0..to_remove);
            debug!("◆ HISTORY TRUNCATED TO {} ENTRIES", self.entries.len());
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Shrinking the limit truncates immediately
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
        self.enforce_max_entries();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// One `Role: content` line per entry
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(Entry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Append-only text log, one `Role: content` line per entry
#[derive(Debug, Clone)]
pub struct ConversationLog {
    path: PathBuf,
}

impl ConversationLog {
    /// Open (creating if needed) the log at `path`
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!("◆ CONVERSATION LOG AT {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &Entry) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = format!("{}\n", entry.render());
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    pub async fn read_all(&self) -> std::io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }
}

/// Bounded buffer plus durable log
#[derive(Debug, Default)]
pub struct HistoryStore {
    buffer: HistoryBuffer,
    log: Option<ConversationLog>,
}

impl HistoryStore {
    pub fn new(max_entries: usize, log: ConversationLog) -> Self {
        Self {
            buffer: HistoryBuffer::new(max_entries),
            log: Some(log),
        }
    }

    /// Buffer only, nothing written to disk
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            buffer: HistoryBuffer::new(max_entries),
            log: None,
        }
    }

    /// Add to the buffer and the log. The buffer keeps the entry even when
    /// the log write fails.
    pub async fn record(&mut self, role: Role, content: impl Into<String>) -> std::io::Result<()> {
        let entry = Entry::new(role, content);
        self.buffer.push(entry.role, entry.content.clone());
        self.write_log(&entry).await
    }

    /// Log only; the buffer stays reserved for request/answer exchanges
    pub async fn annotate(&mut self, role: Role, content: impl Into<String>) -> std::io::Result<()> {
        self.write_log(&Entry::new(role, content)).await
    }

    /// Record a finished request and its answer. Both land in the buffer
    /// as a pair; both log writes are attempted and the first error wins.
    pub async fn record_exchange(&mut self, request: &str, answer: &str) -> std::io::Result<()> {
        let human = Entry::new(Role::Human, request);
        let ai = Entry::new(Role::Ai, answer);
        self.buffer.push(human.role, human.content.clone());
        self.buffer.push(ai.role, ai.content.clone());

        let first = self.write_log(&human).await;
        let second = self.write_log(&ai).await;
        first.and(second)
    }

    async fn write_log(&self, entry: &Entry) -> std::io::Result<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        log.append(entry).await
    }

    pub fn buffer(&self) -> &HistoryBuffer {
        &self.buffer
    }

    pub fn log(&self) -> Option<&ConversationLog> {
        self.log.as_ref()
    }

    /// Recent history for prompt rendering
    pub fn render(&self) -> String {
        self.buffer.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_prefixes() {
        assert_eq!(Role::Human.to_string(), "Human");
        assert_eq!(Role::Ai.to_string(), "AI");
        assert_eq!(Entry::new(Role::Plan, "1. probe").render(), "Plan: 1. probe");
    }

    #[test]
    fn test_buffer_zero_capacity_stays_empty() {
        let mut buffer = HistoryBuffer::new(0);
        buffer.push(Role::Human, "hi");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_render_joins_lines() {
        let mut buffer = HistoryBuffer::new(4);
        buffer.push(Role::Human, "measure DC");
        buffer.push(Role::Ai, "2.5 V");
        assert_eq!(buffer.render(), "Human: measure DC\nAI: 2.5 V");
    }
}
