//! Bench tools and the dispatcher that runs them

pub mod feedback;
pub mod generator;
pub mod measure;
pub mod oscilloscope;
pub mod power;
pub mod schema;

pub use feedback::FeedbackUserTool;
pub use generator::{AmplitudeFrequencyTool, ConfigureSignalGeneratorTool};
pub use measure::{
    AmplitudeTool, DcLevelTool, FrequencyTool, OpampGainTool, PowerRippleTool, SlewRateTool,
    TimeDelayTool,
};
pub use oscilloscope::{InitializeOscilloscopeTool, ObserveChannelWaveTool, SetScopeChannelTool};
pub use power::SetPowerSupplyTool;
pub use schema::{parse_params, ParamKind, ParamSpec, ParamValue, ToolArgs, ToolSchema};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use benchpilot_instrument::{Bench, InstrumentError};

use crate::cache::MeasurementCache;

/// Failures inside one tool invocation. All of them end up as observations.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    #[error("instrument error: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("{0}")]
    Unavailable(String),

    #[error("could not write waveform: {0}")]
    Io(#[from] std::io::Error),
}

/// A bench tool
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> &ToolSchema;

    /// The tool's result ends the session as its final answer
    fn return_direct(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: ToolArgs,
        cache: &mut MeasurementCache,
    ) -> Result<String, ToolError>;
}

type BoxedTool = Box<dyn ToolTrait>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Completed,
    Failed,
    UnknownTool,
}

/// What the loop gets back from one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub observation: String,
    pub status: DispatchStatus,
    pub return_direct: bool,
}

/// Registry of tools, kept in registration order
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Box::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolTrait> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// One `name(signature) - description` line per tool
    pub fn describe(&self) -> String {
        self.iter()
            .map(|t| format!("{}{} - {}", t.name(), t.schema().signature(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tools in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn ToolTrait> + '_ {
        self.order.iter().filter_map(|name| self.get(name))
    }

    /// Decode `input` against the tool's schema and run it.
    /// Every failure is turned into an observation for the model.
    pub async fn dispatch(
        &self,
        name: &str,
        input: &str,
        cache: &mut MeasurementCache,
    ) -> DispatchResult {
        let Some(tool) = self.get(name) else {
            warn!("◆ UNKNOWN TOOL {}", name);
            return DispatchResult {
                observation: format!(
                    "{} is not a valid tool, try one of [{}].",
                    name,
                    self.order.join(", ")
                ),
                status: DispatchStatus::UnknownTool,
                return_direct: false,
            };
        };

        let result = match tool.schema().decode(input) {
            Ok(args) => {
                debug!("◆ RUNNING {} WITH {} ARGUMENTS", name, args.len());
                tool.execute(args, cache).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(observation) => DispatchResult {
                observation,
                status: DispatchStatus::Completed,
                return_direct: tool.return_direct(),
            },
            Err(e) => {
                warn!("◆ TOOL {} FAILED: {}", name, e);
                DispatchResult {
                    observation: format!("{} failed: {}", name, e),
                    status: DispatchStatus::Failed,
                    return_direct: false,
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings shared by the bench tools
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Where waveform dumps go
    pub waveform_dir: PathBuf,
    /// Pause after autoscale and before reading a waveform
    pub settle: Duration,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            waveform_dir: PathBuf::from("."),
            settle: Duration::from_secs(1),
        }
    }
}

/// Register every bench tool in the order the prompt lists them
pub fn register_bench_tools(registry: &mut ToolRegistry, bench: &Bench, options: &ToolOptions) {
    let scope = &bench.oscilloscope;
    let awg = &bench.signal_generator;

    registry.register(InitializeOscilloscopeTool::new(scope.clone()));
    registry.register(SetScopeChannelTool::new(scope.clone()));
    registry.register(ConfigureSignalGeneratorTool::new(awg.clone()));
    registry.register(SetPowerSupplyTool::new(bench.power_supply.clone()));
    registry.register(ObserveChannelWaveTool::new(scope.clone(), options));
    registry.register(SlewRateTool::new(scope.clone(), options.settle));
    registry.register(TimeDelayTool::new(scope.clone()));
    registry.register(AmplitudeTool::new(scope.clone()));
    registry.register(DcLevelTool::new(scope.clone()));
    registry.register(FrequencyTool::new(scope.clone()));
    registry.register(PowerRippleTool::new(scope.clone()));
    registry.register(OpampGainTool::new());
    registry.register(AmplitudeFrequencyTool::new(
        scope.clone(),
        awg.clone(),
        options,
    ));
    registry.register(FeedbackUserTool::new());
}

/// Registry with every bench tool
pub fn bench_registry(bench: &Bench, options: &ToolOptions) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_bench_tools(&mut registry, bench, options);
    registry
}

const SEPARATOR: &str = "---------------------------";

/// Surround a result with separator lines so it stands out in the transcript
pub fn framed(text: &str) -> String {
    format!("\n{}\n\n{}\n\n{}\n", SEPARATOR, text, SEPARATOR)
}

/// `ON` / `OFF`
pub(crate) fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}
