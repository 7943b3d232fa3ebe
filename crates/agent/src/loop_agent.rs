//! Agent loop: plan once, then drive the ReAct cycle
//! (model turn, parse, operator confirmation, tool dispatch) until the model
//! answers, a direct-return tool fires, or a budget runs out.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use benchpilot_config::Config;
use benchpilot_provider::{ChatParams, Message, Provider};
use benchpilot_session::{HistoryStore, Role};

use crate::cache::MeasurementCache;
use crate::confirm::{ConfirmationGate, Decision};
use crate::parser::{self, AgentAction, Parsed};
use crate::planner::{Plan, Planner};
use crate::prompt::{AgentPrompt, PromptVars};
use crate::tools::ToolRegistry;
use crate::{AgentError, Result};

/// Generation stops before the model invents its own observation
pub const OBSERVATION_STOP: &str = "\nObservation";

/// Budgets and sampling for one loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_iterations: u32,
    pub max_execution: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 2048,
            temperature: 0.0,
            max_iterations: 15,
            max_execution: Duration::from_secs(30),
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            max_iterations: config.agent.max_iterations,
            max_execution: Duration::from_secs(config.agent.max_execution_secs),
        }
    }
}

/// One completed Thought/Action/Observation step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub log: String,
    pub observation: String,
}

impl Step {
    pub fn new(log: impl Into<String>, observation: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            observation: observation.into(),
        }
    }

    /// Scratchpad form of this step
    pub fn render(&self) -> String {
        format!("{}\nObservation: {}\nThought: ", self.log, self.observation)
    }
}

pub fn render_scratchpad(steps: &[Step]) -> String {
    steps.iter().map(Step::render).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    IterationLimit,
    TimeLimit,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::IterationLimit => f.write_str("Agent stopped due to iteration limit."),
            AbortReason::TimeLimit => f.write_str("Agent stopped due to time limit."),
        }
    }
}

/// How a request ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished {
        output: String,
        transcript: Vec<Step>,
    },
    Aborted {
        reason: AbortReason,
        transcript: Vec<Step>,
    },
}

impl Outcome {
    pub fn transcript(&self) -> &[Step] {
        match self {
            Outcome::Finished { transcript, .. } | Outcome::Aborted { transcript, .. } => {
                transcript
            }
        }
    }

    /// Final answer, or the abort notice
    pub fn output(&self) -> String {
        match self {
            Outcome::Finished { output, .. } => output.clone(),
            Outcome::Aborted { reason, .. } => reason.to_string(),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Outcome::Finished { .. })
    }
}

enum LoopState {
    AwaitingModelTurn,
    Parsing(String),
    AwaitingConfirmation(AgentAction),
    Dispatching(AgentAction),
    Finished(String),
}

/// The measurement agent. Holds the session state (history, cache)
/// across requests.
pub struct AgentLoop<P: Provider> {
    provider: Arc<P>,
    planner: Planner<P>,
    tools: ToolRegistry,
    gate: ConfirmationGate,
    prompt: AgentPrompt,
    history: HistoryStore,
    cache: MeasurementCache,
    settings: LoopSettings,
}

impl<P: Provider> AgentLoop<P> {
    pub fn new(
        provider: P,
        tools: ToolRegistry,
        gate: ConfirmationGate,
        history: HistoryStore,
        mut settings: LoopSettings,
    ) -> Self {
        let provider = Arc::new(provider);
        if settings.model.is_empty() {
            settings.model = provider.default_model();
        }
        let planner = Planner::new(provider.clone(), settings.model.clone())
            .with_sampling(settings.max_tokens, settings.temperature);

        Self {
            provider,
            planner,
            tools,
            gate,
            prompt: AgentPrompt::builtin(),
            history,
            cache: MeasurementCache::new(),
            settings,
        }
    }

    /// Replace the built-in agent prompt
    pub fn with_prompt(mut self, prompt: AgentPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn cache(&self) -> &MeasurementCache {
        &self.cache
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Plan `request` and carry the plan out
    pub async fn run(&mut self, request: &str) -> Result<Outcome> {
        let plan = self.plan(request).await?;
        self.execute(request, &plan).await
    }

    /// Produce the plan and write it to the log
    pub async fn plan(&mut self, request: &str) -> Result<Plan> {
        let plan = self.planner.plan(request).await?;
        self.annotate(Role::Plan, plan.as_str()).await;
        Ok(plan)
    }

    /// Run the ReAct loop for `request` following `plan`
    pub async fn execute(&mut self, request: &str, plan: &Plan) -> Result<Outcome> {
        info!("◆ AGENT START: {}", request);

        let started = Instant::now();
        let chat_history = self.history.render();
        let tool_descriptions = self.tools.describe();
        let tool_names = self.tools.names().join(", ");

        let mut steps: Vec<Step> = Vec::new();
        let mut iterations: u32 = 0;
        let mut state = LoopState::AwaitingModelTurn;

        loop {
            state = match state {
                LoopState::AwaitingModelTurn => {
                    if iterations >= self.settings.max_iterations {
                        return self.abort(request, AbortReason::IterationLimit, steps).await;
                    }
                    let Some(remaining) =
                        self.settings.max_execution.checked_sub(started.elapsed())
                    else {
                        return self.abort(request, AbortReason::TimeLimit, steps).await;
                    };
                    iterations += 1;
                    debug!("◆ ITERATION {}", iterations);

                    let scratchpad = render_scratchpad(&steps);
                    let prompt = self.prompt.render(&PromptVars {
                        input: request,
                        tools: &tool_descriptions,
                        tool_names: &tool_names,
                        process: plan.as_str(),
                        chat_history: &chat_history,
                        agent_scratchpad: &scratchpad,
                    });
                    let params = ChatParams {
                        model: self.settings.model.clone(),
                        messages: vec![Message::user(prompt)],
                        max_tokens: self.settings.max_tokens,
                        temperature: self.settings.temperature,
                        stop: vec![OBSERVATION_STOP.to_string()],
                    };

                    match tokio::time::timeout(remaining, self.provider.chat(params)).await {
                        Ok(response) => LoopState::Parsing(response?.text_or_empty().to_string()),
                        Err(_) => {
                            return self.abort(request, AbortReason::TimeLimit, steps).await;
                        }
                    }
                }

                LoopState::Parsing(text) => match parser::parse(&text) {
                    Ok(Parsed::Action(action)) => {
                        debug!("◆ PROPOSED {} ({})", action.name, action.input);
                        LoopState::AwaitingConfirmation(action)
                    }
                    Ok(Parsed::Finish(finish)) => LoopState::Finished(finish.output),
                    Err(failure) => {
                        warn!("◆ UNPARSABLE TURN: {}", failure);
                        self.push_step(&mut steps, Step::new(text, failure.observation()))
                            .await;
                        LoopState::AwaitingModelTurn
                    }
                },

                LoopState::AwaitingConfirmation(action) => {
                    match self
                        .gate
                        .review(&action)
                        .await
                        .map_err(AgentError::Operator)?
                    {
                        Decision::Approved => LoopState::Dispatching(action),
                        Decision::Rejected { redirect } => {
                            self.push_step(&mut steps, Step::new(action.log, redirect))
                                .await;
                            LoopState::AwaitingModelTurn
                        }
                    }
                }

                LoopState::Dispatching(action) => {
                    let result = self
                        .tools
                        .dispatch(&action.name, &action.input, &mut self.cache)
                        .await;
                    let observation = result.observation.clone();
                    self.push_step(&mut steps, Step::new(action.log, result.observation))
                        .await;
                    if result.return_direct {
                        LoopState::Finished(observation)
                    } else {
                        LoopState::AwaitingModelTurn
                    }
                }

                LoopState::Finished(output) => {
                    info!("◆ AGENT FINISHED AFTER {} STEPS", steps.len());
                    self.record(request, &output).await;
                    return Ok(Outcome::Finished {
                        output,
                        transcript: steps,
                    });
                }
            };
        }
    }

    async fn push_step(&mut self, steps: &mut Vec<Step>, step: Step) {
        let line = format!("{} => {}", step.log.trim(), step.observation.trim());
        self.annotate(Role::Step, &line).await;
        steps.push(step);
    }

    async fn abort(
        &mut self,
        request: &str,
        reason: AbortReason,
        transcript: Vec<Step>,
    ) -> Result<Outcome> {
        warn!("◆ AGENT ABORTED AFTER {} STEPS: {}", transcript.len(), reason);
        for (i, step) in transcript.iter().enumerate() {
            debug!("◆ STEP {}: {} => {}", i + 1, step.log.trim(), step.observation.trim());
        }
        self.record(request, &reason.to_string()).await;
        Ok(Outcome::Aborted { reason, transcript })
    }

    async fn record(&mut self, request: &str, answer: &str) {
        if let Err(e) = self.history.record_exchange(request, answer).await {
            warn!("◆ HISTORY WRITE FAILED: {}", e);
        }
    }

    async fn annotate(&mut self, role: Role, content: &str) {
        if let Err(e) = self.history.annotate(role, content).await {
            warn!("◆ HISTORY WRITE FAILED: {}", e);
        }
    }
}
