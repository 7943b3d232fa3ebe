//! Human confirmation before any tool touches the bench.

use async_trait::async_trait;
use colored::Colorize;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::parser::AgentAction;

/// Prefix of the observation sent back after a rejected action
pub const REDIRECT_PREAMBLE: &str = "Please regenerate the plan, correction is:";

/// Replies that approve an action (after trimming)
pub const AFFIRMATIVE_REPLIES: &[&str] = &["", "yes", "是"];

/// Channel to the human at the bench
#[async_trait]
pub trait Operator: Send + Sync {
    /// Show `text` and wait for one line of reply
    async fn prompt(&self, text: &str) -> io::Result<String>;
}

/// Terminal operator: prompts in red on stdout, reads stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOperator;

#[async_trait]
impl Operator for ConsoleOperator {
    async fn prompt(&self, text: &str) -> io::Result<String> {
        {
            let mut stdout = io::stdout();
            write!(stdout, "{}", text.red())?;
            stdout.flush()?;
        }

        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "operator input closed",
                ));
            }
            Ok(line)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// Operator that replays canned replies and records every prompt
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn prompt(&self, text: &str) -> io::Result<String> {
        self.prompts.lock().unwrap().push(text.to_string());
        self.replies.lock().unwrap().pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted reply left")
        })
    }
}

/// Outcome of reviewing one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approved,
    /// `redirect` is never empty and goes back to the model
    Rejected { redirect: String },
}

/// Asks the operator to approve each action before dispatch
#[derive(Clone)]
pub struct ConfirmationGate {
    operator: Arc<dyn Operator>,
}

impl ConfirmationGate {
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self { operator }
    }

    /// Approve or reject `action`. A rejection always carries the operator's
    /// correction; an I/O error means the operator channel is gone.
    pub async fn review(&self, action: &AgentAction) -> io::Result<Decision> {
        let question = format!(
            "\nExecute {}, {}? [Enter/yes/是 to run, anything else to correct]\n",
            action.name, action.input
        );
        let reply = self.operator.prompt(&question).await?;

        if is_affirmative(&reply) {
            info!("◆ OPERATOR APPROVED {}", action.name);
            return Ok(Decision::Approved);
        }

        let correction = loop {
            let line = self.operator.prompt("Correction: ").await?;
            let line = line.trim();
            if !line.is_empty() {
                break line.to_string();
            }
            debug!("◆ EMPTY CORRECTION, ASKING AGAIN");
        };

        info!("◆ OPERATOR REJECTED {}: {}", action.name, correction);
        Ok(Decision::Rejected {
            redirect: redirect_text(&correction),
        })
    }
}

pub fn is_affirmative(reply: &str) -> bool {
    AFFIRMATIVE_REPLIES.contains(&reply.trim())
}

/// Observation that tells the model to follow the operator's correction
pub fn redirect_text(correction: &str) -> String {
    format!("{}{}\n", REDIRECT_PREAMBLE, correction.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_replies() {
        assert!(is_affirmative(""));
        assert!(is_affirmative("\n"));
        assert!(is_affirmative("  yes "));
        assert!(is_affirmative("是"));
        assert!(!is_affirmative("否"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("YES"));
        assert!(!is_affirmative("y"));
    }

    #[test]
    fn test_redirect_text() {
        assert_eq!(
            redirect_text("  use CHAN2 instead "),
            "Please regenerate the plan, correction is:use CHAN2 instead\n"
        );
    }

    #[tokio::test]
    async fn test_scripted_operator_runs_dry() {
        let operator = ScriptedOperator::new(Vec::<String>::new());
        let err = operator.prompt("?").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(operator.prompts(), vec!["?"]);
    }
}
