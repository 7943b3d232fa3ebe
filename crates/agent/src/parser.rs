//! ReAct response parser.
//!
//! Turns one raw model completion into exactly one of: a tool action, a
//! final answer, or a recoverable format failure.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

pub const MISSING_ACTION_MESSAGE: &str = "Invalid Format: Missing 'Action:' after 'Thought:'";
pub const MISSING_ACTION_INPUT_MESSAGE: &str =
    "Invalid Format: Missing 'Action Input:' after 'Action:'";
pub const FORMAT_HINT: &str =
    "Check your output and make sure it conforms, use the Action/Action Input syntax";

/// A proposed tool call
#[derive(Debug, Clone, PartialEq)]
pub struct AgentAction {
    pub name: String,
    pub input: String,
    /// Raw completion with any final-answer line removed
    pub log: String,
}

/// The model's final answer
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFinish {
    pub output: String,
    pub log: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Action(AgentAction),
    Finish(AgentFinish),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MissingActionMarker,
    MissingActionInputMarker,
    Unparsable,
}

/// Completion that could not be interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub kind: FailureKind,
    pub text: String,
}

impl ParseFailure {
    /// Text fed back to the model as the step's observation
    pub fn observation(&self) -> String {
        match self.kind {
            FailureKind::MissingActionMarker | FailureKind::MissingActionInputMarker => {
                FORMAT_HINT.to_string()
            }
            FailureKind::Unparsable => format!("Could not parse LLM output: `{}`", self.text),
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::MissingActionMarker => f.write_str(MISSING_ACTION_MESSAGE),
            FailureKind::MissingActionInputMarker => f.write_str(MISSING_ACTION_INPUT_MESSAGE),
            FailureKind::Unparsable => write!(f, "Could not parse LLM output: `{}`", self.text),
        }
    }
}

impl std::error::Error for ParseFailure {}

struct Patterns {
    final_answer: Regex,
    action: Regex,
    action_marker: Regex,
    action_input_marker: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        final_answer: Regex::new(r"(?m)^Final Answer: .*?\.$").unwrap(),
        action: Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:([^$\n]*)")
            .unwrap(),
        action_marker: Regex::new(r"Action\s*\d*\s*:").unwrap(),
        action_input_marker: Regex::new(r"Action\s*\d*\s*Input\s*\d*\s*:").unwrap(),
    })
}

/// Parse one model completion.
///
/// A final answer counts only as a full line `Final Answer: ... .` When an
/// action pair is also present the action wins and every final-answer line
/// is removed from the retained log.
pub fn parse(text: &str) -> Result<Parsed, ParseFailure> {
    let p = patterns();
    let has_final_answer = p.final_answer.is_match(text);

    if let Some(caps) = p.action.captures(text) {
        let log = if has_final_answer {
            warn!("◆ COMPLETION HAS BOTH AN ACTION AND A FINAL ANSWER, TAKING THE ACTION");
            p.final_answer.replace_all(text, "").into_owned()
        } else {
            text.to_string()
        };

        let name = caps.get(1).map_or("", |m| m.as_str()).trim();
        let input = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .trim()
            .trim_matches('"'); // every wrapping quote, not one pair

        return Ok(Parsed::Action(AgentAction {
            name: name.to_string(),
            input: input.to_string(),
            log,
        }));
    }

    if has_final_answer {
        let output = text
            .rsplit(FINAL_ANSWER_MARKER)
            .next()
            .unwrap_or_default()
            .trim();
        return Ok(Parsed::Finish(AgentFinish {
            output: output.to_string(),
            log: text.to_string(),
        }));
    }

    let kind = if !p.action_marker.is_match(text) {
        FailureKind::MissingActionMarker
    } else if !p.action_input_marker.is_match(text) {
        FailureKind::MissingActionInputMarker
    } else {
        FailureKind::Unparsable
    };

    Err(ParseFailure {
        kind,
        text: text.to_string(),
    })
}
