//! Tests for the tool registry and dispatch

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use benchpilot_agent::tools::{
    FeedbackUserTool, InitializeOscilloscopeTool, OpampGainTool, ParamSpec, ToolArgs, ToolError,
    ToolSchema,
};
use benchpilot_agent::{
    bench_registry, DispatchStatus, MeasurementCache, ToolOptions, ToolRegistry, ToolTrait,
};
use benchpilot_instrument::{Bench, ScriptedTransport};

/// Echoes its decoded arguments
struct EchoTool {
    schema: ToolSchema,
}

impl EchoTool {
    fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                ParamSpec::text("channel", "CHAN1"),
                ParamSpec::number("scale", 1.0),
            ]),
        }
    }
}

#[async_trait]
impl ToolTrait for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo the arguments."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        args: ToolArgs,
        _cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        Ok(format!("{} {}", args.text("channel")?, args.number("scale")?))
    }
}

fn scripted_bench() -> (Bench, Arc<ScriptedTransport>) {
    let scope = Arc::new(ScriptedTransport::new());
    let bench = Bench::new(
        scope.clone(),
        Arc::new(ScriptedTransport::new()),
        Arc::new(ScriptedTransport::new()),
    );
    (bench, scope)
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_registry_new() {
    let registry = ToolRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.names().is_empty());
}

#[test]
fn test_registry_keeps_order_and_replaces_duplicates() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool::new());
    registry.register(FeedbackUserTool::new());
    registry.register(EchoTool::new());

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), vec!["echo", "feedback_user"]);
    assert!(registry.has("echo"));
    assert!(registry.get("nonexistent").is_none());
}

#[test]
fn test_bench_registry_has_every_tool() {
    let (bench, _) = scripted_bench();
    let registry = bench_registry(&bench, &ToolOptions::default());

    assert_eq!(
        registry.names(),
        vec![
            "initialize_oscilloinst",
            "set_oscilloinst_channel",
            "configure_signal_generator",
            "set_power_supply_channel",
            "observe_channel_wave",
            "calculate_slew_rate",
            "calculate_time_delay",
            "calculate_amplitude",
            "calculate_DC",
            "calculate_frequency",
            "calculate_power_ripple",
            "calculate_opa_Magnification",
            "calculate_amplitude_frequency_characteristic",
            "feedback_user",
        ]
    );
    assert!(registry.get("feedback_user").unwrap().return_direct());
    assert!(!registry.get("calculate_DC").unwrap().return_direct());
}

#[test]
fn test_describe_lists_signatures() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool::new());

    assert_eq!(
        registry.describe(),
        "echo(channel: text = 'CHAN1', scale: number = 1) - Echo the arguments."
    );
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_decodes_against_schema() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool::new());
    let mut cache = MeasurementCache::new();

    let result = registry
        .dispatch("echo", "scale=0.5, bogus=1, channel='CHAN2'", &mut cache)
        .await;
    assert_eq!(result.status, DispatchStatus::Completed);
    assert_eq!(result.observation, "CHAN2 0.5");

    let result = registry.dispatch("echo", "scale=big", &mut cache).await;
    assert_eq!(result.observation, "CHAN1 1");
}

#[tokio::test]
async fn test_dispatch_unknown_tool() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool::new());
    registry.register(FeedbackUserTool::new());
    let mut cache = MeasurementCache::new();

    let result = registry.dispatch("calculate_magic", "", &mut cache).await;
    assert_eq!(result.status, DispatchStatus::UnknownTool);
    assert_eq!(
        result.observation,
        "calculate_magic is not a valid tool, try one of [echo, feedback_user]."
    );
}

#[tokio::test]
async fn test_dispatch_missing_required_argument() {
    let mut registry = ToolRegistry::new();
    registry.register(FeedbackUserTool::new());
    let mut cache = MeasurementCache::new();

    let result = registry
        .dispatch("feedback_user", "role=assistant", &mut cache)
        .await;
    assert_eq!(result.status, DispatchStatus::Failed);
    assert!(!result.return_direct);
    assert_eq!(
        result.observation,
        "feedback_user failed: missing required argument 'content'"
    );
}

#[tokio::test]
async fn test_dispatch_transport_failure() {
    let mut registry = ToolRegistry::new();
    registry.register(InitializeOscilloscopeTool::new(Arc::new(
        ScriptedTransport::unplugged(),
    )));
    let mut cache = MeasurementCache::new();

    let result = registry
        .dispatch("initialize_oscilloinst", "", &mut cache)
        .await;
    assert_eq!(result.status, DispatchStatus::Failed);
    assert!(result.observation.starts_with("initialize_oscilloinst failed:"));
}

#[tokio::test]
async fn test_gain_uses_cached_amplitudes() {
    let mut registry = ToolRegistry::new();
    registry.register(OpampGainTool::new());
    let mut cache = MeasurementCache::new();

    let result = registry
        .dispatch("calculate_opa_Magnification", "", &mut cache)
        .await;
    assert_eq!(result.status, DispatchStatus::Failed);

    cache.generator_amplitude = Some(0.2);
    cache.scope_amplitude = Some(1.0);
    let result = registry
        .dispatch("calculate_opa_Magnification", "", &mut cache)
        .await;
    assert_eq!(result.status, DispatchStatus::Completed);
    assert!(result.observation.contains("10"));
}

#[tokio::test]
async fn test_measurement_records_into_cache() {
    let (bench, scope) = scripted_bench();
    let options = ToolOptions {
        settle: Duration::ZERO,
        ..Default::default()
    };
    let registry = bench_registry(&bench, &options);
    let mut cache = MeasurementCache::new();

    scope.push_replies(["2.0", "1000.0"]);
    let result = registry
        .dispatch("calculate_frequency", "channel=CHAN1", &mut cache)
        .await;
    assert_eq!(result.status, DispatchStatus::Completed);
    assert_eq!(cache.frequency, Some(1000.0));
}
