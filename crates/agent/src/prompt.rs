//! Prompt templates for planning and for the ReAct loop

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::{AgentError, Result};

/// Slots an agent template must contain
pub const REQUIRED_SLOTS: &[&str] = &["tools", "tool_names", "agent_scratchpad"];

const PLAN_TEMPLATE: &str = r#"You are an electronics measurement engineer. The user's request is: "{input}".
You have an oscilloscope, a signal generator and a power supply on the bench. Plan, step by step, how to carry out the measurement. Describe each step briefly and use as few steps as you can. Give the exact values to program into the instruments (amplitude, frequency, etc.); they are sent to real hardware.
Example:
1. Initialise the instruments as needed; set channel CHAN1 display ON, its coupling and its impedance.
2. Adjust the oscilloscope: set DC coupling.
3. Set up the signal generator (only if needed): square wave, 1 kHz, 5 V amplitude.
4. ...
"#;

const AGENT_TEMPLATE: &str = r#"You are a measurement assistant driving an oscilloscope, a signal generator and a power supply. Carry out the measurement plan below, one instrument action at a time.

Measurement plan:
{process}

Previous conversation:
{chat_history}

You have access to the following tools:

{tools}

Action Input is a comma-separated list of key=value pairs, for example: channel=CHAN1, scale=0.5
Leave Action Input empty to use every default.

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question, as one line ending with a period.

An observation starting with "Please regenerate the plan" means the operator rejected your last action. Follow the correction before anything else.

Begin!

Question: {input}
Thought:{agent_scratchpad}"#;

/// Values substituted into a template
#[derive(Debug, Default, Clone)]
pub struct PromptVars<'a> {
    pub input: &'a str,
    pub tools: &'a str,
    pub tool_names: &'a str,
    pub process: &'a str,
    pub chat_history: &'a str,
    pub agent_scratchpad: &'a str,
}

impl<'a> PromptVars<'a> {
    fn to_map(&self) -> HashMap<&'static str, &'a str> {
        HashMap::from([
            ("input", self.input),
            ("tools", self.tools),
            ("tool_names", self.tool_names),
            ("process", self.process),
            ("chat_history", self.chat_history),
            ("agent_scratchpad", self.agent_scratchpad),
        ])
    }
}

fn slot_pattern() -> &'static Regex {
    static SLOT: OnceLock<Regex> = OnceLock::new();
    SLOT.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap())
}

/// Replace `{slot}` markers in one pass. Unknown slots are left as written,
/// and substituted text is never rescanned.
pub fn render(template: &str, vars: &PromptVars<'_>) -> String {
    let map = vars.to_map();
    slot_pattern()
        .replace_all(template, |caps: &Captures<'_>| match map.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Planning prompt for one request
pub fn plan_prompt(request: &str) -> String {
    render(
        PLAN_TEMPLATE,
        &PromptVars {
            input: request,
            ..Default::default()
        },
    )
}

/// The ReAct agent template
#[derive(Debug, Clone)]
pub struct AgentPrompt {
    template: String,
}

impl Default for AgentPrompt {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AgentPrompt {
    pub fn builtin() -> Self {
        Self {
            template: AGENT_TEMPLATE.to_string(),
        }
    }

    /// Use `template` if it has every required slot
    pub fn from_template(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let missing: Vec<&str> = REQUIRED_SLOTS
            .iter()
            .copied()
            .filter(|slot| !template.contains(&format!("{{{}}}", slot)))
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::Template(format!(
                "missing slots: {}",
                missing.join(", ")
            )));
        }
        Ok(Self { template })
    }

    /// Load a template file. A missing or unreadable file is an error.
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("◆ LOADING AGENT TEMPLATE FROM {:?}", path);
        let template = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::Template(format!("cannot read {}: {}", path.display(), e)))?;
        let prompt = Self::from_template(template)?;
        info!("◆ AGENT TEMPLATE LOADED FROM {:?}", path);
        Ok(prompt)
    }

    /// Built-in template unless `path` is given
    pub async fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::builtin()),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn render(&self, vars: &PromptVars<'_>) -> String {
        render(&self.template, vars)
    }
}
