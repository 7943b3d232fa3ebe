//! Plan generator: one model call turning a request into numbered steps

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use benchpilot_provider::{ChatParams, Message, Provider};

use crate::prompt::plan_prompt;
use crate::Result;

/// Measurement plan produced for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan(String);

impl Plan {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct Planner<P: Provider> {
    provider: Arc<P>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl<P: Provider> Planner<P> {
    pub fn new(provider: Arc<P>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 2048,
            temperature: 0.0,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Ask the model for a plan. Provider errors propagate.
    pub async fn plan(&self, request: &str) -> Result<Plan> {
        debug!("◆ PLANNING: {}", request);

        let params = ChatParams {
            model: self.model.clone(),
            messages: vec![Message::user(plan_prompt(request))],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stop: Vec::new(),
        };
        let response = self.provider.chat(params).await?;
        let plan = Plan::new(response.text_or_empty().trim());

        info!("◆ PLAN READY ({} lines)", plan.as_str().lines().count());
        Ok(plan)
    }
}
