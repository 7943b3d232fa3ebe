//! Measurement agent core
//!
//! Planning, ReAct parsing, operator confirmation and the bench tools.

use thiserror::Error;

pub mod cache;
pub mod confirm;
pub mod loop_agent;
pub mod parser;
pub mod planner;
pub mod prompt;
pub mod tools;

pub use cache::MeasurementCache;
pub use confirm::{ConfirmationGate, ConsoleOperator, Decision, Operator, ScriptedOperator};
pub use loop_agent::{AbortReason, AgentLoop, LoopSettings, Outcome, Step};
pub use parser::{parse, AgentAction, AgentFinish, FailureKind, ParseFailure, Parsed};
pub use planner::{Plan, Planner};
pub use prompt::AgentPrompt;
pub use tools::{bench_registry, DispatchResult, DispatchStatus, ToolOptions, ToolRegistry, ToolTrait};

/// Session-level agent errors. Everything recoverable inside a step is an
/// observation instead.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("◆ LLM ERROR: {0}")]
    Provider(#[from] benchpilot_provider::ProviderError),

    #[error("◆ OPERATOR CHANNEL LOST: {0}")]
    Operator(#[source] std::io::Error),

    #[error("◆ AGENT TEMPLATE ERROR: {0}")]
    Template(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
