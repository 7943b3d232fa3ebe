//! In-memory transport that records writes and replays canned replies.
//!
//! Used by tests across the workspace and for offline dry runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{InstrumentError, Result, Transport};

#[derive(Default)]
pub struct ScriptedTransport {
    writes: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<String>>,
    fail_writes: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transport = Self::new();
        transport.push_replies(replies);
        transport
    }

    /// A transport whose every write fails, as if the cable were pulled
    pub fn unplugged() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn push_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = self.replies.lock().unwrap();
        queue.extend(replies.into_iter().map(Into::into));
    }

    /// Every command written so far, in order
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Replies not yet consumed
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn write(&self, command: &str) -> Result<()> {
        if self.fail_writes {
            return Err(InstrumentError::Disconnected);
        }
        self.writes.lock().unwrap().push(command.to_string());
        Ok(())
    }

    async fn read(&self) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(InstrumentError::Timeout(0))
    }
}
