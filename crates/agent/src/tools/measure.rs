//! Oscilloscope measurements

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use benchpilot_instrument::{query_number, InstrumentError, Transport};

use super::{framed, ParamSpec, ToolArgs, ToolError, ToolSchema, ToolTrait};
use crate::cache::MeasurementCache;

async fn autoscale(scope: &dyn Transport) -> Result<(), ToolError> {
    scope.write(":KEY:auto").await?;
    Ok(())
}

/// Query a numeric measurement; a non-numeric reply means the scope could
/// not take it.
async fn measure(scope: &dyn Transport, command: &str, what: &str) -> Result<f64, ToolError> {
    match query_number(scope, command).await {
        Ok(value) => {
            debug!("◆ {} = {}", command, value);
            Ok(value)
        }
        Err(InstrumentError::NotNumeric { reply, .. }) => Err(ToolError::Unavailable(format!(
            "{} could not be measured (scope replied {:?})",
            what, reply
        ))),
        Err(e) => Err(e.into()),
    }
}

fn channel_schema() -> ToolSchema {
    ToolSchema::new(vec![ParamSpec::text("channel", "CHAN1")])
}

/// Amplitude over refined rise time
pub struct SlewRateTool {
    scope: Arc<dyn Transport>,
    settle: Duration,
    schema: ToolSchema,
}

impl SlewRateTool {
    pub fn new(scope: Arc<dyn Transport>, settle: Duration) -> Self {
        Self {
            scope,
            settle,
            schema: channel_schema(),
        }
    }
}

#[async_trait]
impl ToolTrait for SlewRateTool {
    fn name(&self) -> &str {
        "calculate_slew_rate"
    }
    fn description(&self) -> &str {
        "Measure the slew rate on a scope channel. Returns the slew rate in V/us."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        args: ToolArgs,
        _cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        let channel = args.text("channel")?;
        let scope = self.scope.as_ref();

        autoscale(scope).await?;
        tokio::time::sleep(self.settle).await;
        let voltage = measure(scope, &format!(":MEASure:VAMPlitude? {}", channel), "amplitude").await?;
        let rise_query = format!(":MEASure:RISetime? {}", channel);
        let coarse = measure(scope, &rise_query, "rise time").await?;

        // zoom the timebase onto the edge and measure again
        scope.write(&format!(":TIM:SCAL {}", coarse / 4.0)).await?;
        tokio::time::sleep(self.settle).await;
        let rise_time = measure(scope, &rise_query, "rise time").await?;
        if rise_time <= 0.0 {
            return Err(ToolError::Unavailable(format!(
                "slew rate could not be measured (rise time {})",
                rise_time
            )));
        }

        let slew_rate = voltage / rise_time / 1e6;
        Ok(framed(&format!("Slew rate: {:.4} V/us", slew_rate)))
    }
}

/// Propagation delay between two channels
pub struct TimeDelayTool {
    scope: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl TimeDelayTool {
    pub fn new(scope: Arc<dyn Transport>) -> Self {
        Self {
            scope,
            schema: ToolSchema::new(vec![
                ParamSpec::text("channel1", "CHAN1"),
                ParamSpec::text("channel2", "CHAN2"),
            ]),
        }
    }
}

#[async_trait]
impl ToolTrait for TimeDelayTool {
    fn name(&self) -> &str {
        "calculate_time_delay"
    }
    fn description(&self) -> &str {
        "Measure the time delay between two scope channels. Returns the delay in ns."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        args: ToolArgs,
        _cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        let channel1 = args.text("channel1")?;
        let channel2 = args.text("channel2")?;
        let scope = self.scope.as_ref();

        autoscale(scope).await?;
        let rise_time = measure(
            scope,
            &format!(":MEASure:RISetime? {}", channel1),
            "rise time",
        )
        .await?;

        scope.write(&format!(":{}:COUP AC", channel1)).await?;
        scope.write(&format!(":{}:COUP AC", channel2)).await?;
        autoscale(scope).await?;
        scope.write(&format!(":TIM:SCAL {}", rise_time / 4.0)).await?;

        let delay = measure(
            scope,
            &format!(":MEASure:PDEL? {},{}", channel1, channel2),
            "time delay",
        )
        .await?;
        Ok(framed(&format!(
            "Time delay: {:.6} ns",
            (delay * 1e9).abs()
        )))
    }
}

/// AC amplitude, measured twice with the vertical scale fitted in between
pub struct AmplitudeTool {
    scope: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl AmplitudeTool {
    pub fn new(scope: Arc<dyn Transport>) -> Self {
        Self {
            scope,
            schema: channel_schema(),
        }
    }
}

#[async_trait]
impl ToolTrait for AmplitudeTool {
    fn name(&self) -> &str {
        "calculate_amplitude"
    }
    fn description(&self) -> &str {
        "Measure the AC amplitude and peak-to-peak value on a scope channel."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        args: ToolArgs,
        cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        let channel = args.text("channel")?;
        let scope = self.scope.as_ref();
        let query = format!(":MEASure:VAMPlitude? {}", channel);

        autoscale(scope).await?;
        let coarse = measure(scope, &query, "AC amplitude").await? / 2.0;
        scope.write(&format!(":{}:SCALe {}", channel, coarse / 6.0)).await?;
        autoscale(scope).await?;
        let amplitude = measure(scope, &query, "AC amplitude").await? / 2.0;

        cache.scope_amplitude = Some(amplitude);
        Ok(framed(&format!(
            "Amplitude: {:.6} V\nPeak-to-peak: {:.6} V",
            amplitude,
            amplitude * 2.0
        )))
    }
}

/// Average (DC) level of a channel
pub struct DcLevelTool {
    scope: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl DcLevelTool {
    pub fn new(scope: Arc<dyn Transport>) -> Self {
        Self {
            scope,
            schema: channel_schema(),
        }
    }
}

#[async_trait]
impl ToolTrait for DcLevelTool {
    fn name(&self) -> &str {
        "calculate_DC"
    }
    fn description(&self) -> &str {
        "Measure the DC level on a scope channel."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        args: ToolArgs,
        _cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        let channel = args.text("channel")?;
        let scope = self.scope.as_ref();

        scope.write(&format!(":{}:COUP DC", channel)).await?;
        autoscale(scope).await?;
        let level = measure(
            scope,
            &format!(":MEASure:VAVerage? {}", channel),
            "DC level",
        )
        .await?;
        Ok(framed(&format!("DC level: {:.6} V", level)))
    }
}

pub struct FrequencyTool {
    scope: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl FrequencyTool {
    pub fn new(scope: Arc<dyn Transport>) -> Self {
        Self {
            scope,
            schema: channel_schema(),
        }
    }
}

#[async_trait]
impl ToolTrait for FrequencyTool {
    fn name(&self) -> &str {
        "calculate_frequency"
    }
    fn description(&self) -> &str {
        "Measure the signal frequency on a scope channel in Hz."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        args: ToolArgs,
        cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        let channel = args.text("channel")?;
        let scope = self.scope.as_ref();

        autoscale(scope).await?;
        scope.write(&format!(":{}:COUP AC", channel)).await?;
        let amplitude = measure(
            scope,
            &format!(":MEASure:VAMPlitude? {}", channel),
            "frequency",
        )
        .await?
            / 2.0;
        scope.write(&format!(":{}:SCALe {}", channel, amplitude / 6.0)).await?;
        autoscale(scope).await?;

        let frequency = measure(
            scope,
            &format!(":MEASure:FREQuency? {}", channel),
            "frequency",
        )
        .await?;
        cache.frequency = Some(frequency);
        Ok(framed(&format!("Frequency: {:.6} Hz", frequency)))
    }
}

/// DC level, ripple amplitude and ripple frequency of a supply rail
pub struct PowerRippleTool {
    scope: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl PowerRippleTool {
    pub fn new(scope: Arc<dyn Transport>) -> Self {
        Self {
            scope,
            schema: channel_schema(),
        }
    }
}

#[async_trait]
impl ToolTrait for PowerRippleTool {
    fn name(&self) -> &str {
        "calculate_power_ripple"
    }
    fn description(&self) -> &str {
        "Measure the ripple of a switching power supply on a scope channel: DC level, \
         ripple amplitude, ripple frequency and ripple factor."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        args: ToolArgs,
        _cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        let channel = args.text("channel")?;
        let scope = self.scope.as_ref();

        scope.write(&format!(":{}:COUP DC", channel)).await?;
        autoscale(scope).await?;
        scope.write(&format!(":{}:COUP DC", channel)).await?;
        let dc = measure(
            scope,
            &format!(":MEASure:VAVerage? {}", channel),
            "DC level",
        )
        .await?;
        if dc == 0.0 {
            return Err(ToolError::Unavailable(
                "ripple factor undefined: DC level is 0 V".to_string(),
            ));
        }

        scope.write(&format!(":{}:COUP AC", channel)).await?;
        scope.write(&format!(":{}:SCALe 0.05", channel)).await?;
        autoscale(scope).await?;
        let ripple = measure(
            scope,
            &format!(":MEASure:VAMPlitude? {}", channel),
            "ripple amplitude",
        )
        .await?;

        // ripple frequency is informative only; a noisy rail often has none
        let frequency = measure(
            scope,
            &format!(":MEASure:FREQuency? {}", channel),
            "ripple frequency",
        )
        .await
        .ok();

        Ok(framed(&format!(
            "DC level: {:.6} V\nRipple frequency: {}\nRipple: {:.6} mV\nRipple factor: {:.6}",
            dc,
            frequency.map_or_else(|| "n/a".to_string(), |f| format!("{:.6} Hz", f)),
            ripple * 1000.0,
            (ripple / dc).abs()
        )))
    }
}

/// Closed-loop gain from the cached scope and generator amplitudes
pub struct OpampGainTool {
    schema: ToolSchema,
}

impl OpampGainTool {
    pub fn new() -> Self {
        Self {
            schema: channel_schema(),
        }
    }
}

impl Default for OpampGainTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolTrait for OpampGainTool {
    fn name(&self) -> &str {
        "calculate_opa_Magnification"
    }
    fn description(&self) -> &str {
        "Compute the gain of an op-amp from the generator amplitude and the amplitude \
         measured by calculate_amplitude. Run both of those first."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        _args: ToolArgs,
        cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        let output = cache.scope_amplitude.ok_or_else(|| {
            ToolError::Unavailable(
                "op-amp gain needs an output amplitude, run calculate_amplitude first".to_string(),
            )
        })?;
        let input = cache
            .generator_amplitude
            .filter(|a| *a != 0.0)
            .ok_or_else(|| {
                ToolError::Unavailable(
                    "op-amp gain needs an input amplitude, run configure_signal_generator first"
                        .to_string(),
                )
            })?;

        Ok(framed(&format!("Op-amp gain: {:.6}", output / (input / 2.0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchpilot_instrument::ScriptedTransport;

    async fn run(tool: &dyn ToolTrait, input: &str, cache: &mut MeasurementCache) -> Result<String, ToolError> {
        let args = tool.schema().decode(input).unwrap();
        tool.execute(args, cache).await
    }

    #[tokio::test]
    async fn test_slew_rate() {
        // 5 V swing, coarse rise 1 us, refined rise 0.4 us
        let scope = Arc::new(ScriptedTransport::with_replies(["5.0", "1e-6", "4e-7"]));
        let tool = SlewRateTool::new(scope.clone(), Duration::ZERO);
        let mut cache = MeasurementCache::new();

        let out = run(&tool, "channel=CHAN2", &mut cache).await.unwrap();
        assert!(out.contains("Slew rate: 12.5000 V/us"));
        assert_eq!(
            scope.writes(),
            vec![
                ":KEY:auto",
                ":MEASure:VAMPlitude? CHAN2",
                ":MEASure:RISetime? CHAN2",
                ":TIM:SCAL 0.00000025",
                ":MEASure:RISetime? CHAN2",
            ]
        );
    }

    #[tokio::test]
    async fn test_slew_rate_unmeasurable() {
        let scope = Arc::new(ScriptedTransport::with_replies(["5.0", "****"]));
        let tool = SlewRateTool::new(scope, Duration::ZERO);
        let mut cache = MeasurementCache::new();

        let err = run(&tool, "", &mut cache).await.unwrap_err();
        assert!(err.to_string().contains("rise time could not be measured"));
    }

    #[tokio::test]
    async fn test_amplitude_records_cache() {
        let scope = Arc::new(ScriptedTransport::with_replies(["3.0", "2.0"]));
        let tool = AmplitudeTool::new(scope.clone());
        let mut cache = MeasurementCache::new();

        let out = run(&tool, "", &mut cache).await.unwrap();
        assert_eq!(cache.scope_amplitude, Some(1.0));
        assert!(out.contains("Peak-to-peak: 2.000000 V"));
        assert!(scope.writes().contains(&":CHAN1:SCALe 0.25".to_string()));
    }

    #[tokio::test]
    async fn test_dc_level() {
        let scope = Arc::new(ScriptedTransport::with_replies(["3.3"]));
        let tool = DcLevelTool::new(scope.clone());
        let mut cache = MeasurementCache::new();

        let out = run(&tool, "channel=CHAN3", &mut cache).await.unwrap();
        assert!(out.contains("DC level: 3.300000 V"));
        assert_eq!(scope.writes()[0], ":CHAN3:COUP DC");
    }

    #[tokio::test]
    async fn test_frequency_records_cache() {
        let scope = Arc::new(ScriptedTransport::with_replies(["1.2", "1000"]));
        let tool = FrequencyTool::new(scope);
        let mut cache = MeasurementCache::new();

        run(&tool, "", &mut cache).await.unwrap();
        assert_eq!(cache.frequency, Some(1000.0));
    }

    #[tokio::test]
    async fn test_time_delay() {
        let scope = Arc::new(ScriptedTransport::with_replies(["2e-8", "-1.5e-8"]));
        let tool = TimeDelayTool::new(scope.clone());
        let mut cache = MeasurementCache::new();

        let out = run(&tool, "channel1=CHAN1, channel2=CHAN2", &mut cache)
            .await
            .unwrap();
        assert!(out.contains("Time delay: 15.000000 ns"));
        assert!(scope
            .writes()
            .contains(&":MEASure:PDEL? CHAN1,CHAN2".to_string()));
    }

    #[tokio::test]
    async fn test_power_ripple_without_frequency() {
        let scope = Arc::new(ScriptedTransport::with_replies(["5.0", "0.05", "****"]));
        let tool = PowerRippleTool::new(scope);
        let mut cache = MeasurementCache::new();

        let out = run(&tool, "", &mut cache).await.unwrap();
        assert!(out.contains("Ripple: 50.000000 mV"));
        assert!(out.contains("Ripple frequency: n/a"));
        assert!(out.contains("Ripple factor: 0.010000"));
    }

    #[tokio::test]
    async fn test_opamp_gain() {
        let tool = OpampGainTool::new();
        let mut cache = MeasurementCache {
            generator_amplitude: Some(0.2),
            scope_amplitude: Some(1.0),
            frequency: None,
        };

        let out = run(&tool, "", &mut cache).await.unwrap();
        assert!(out.contains("Op-amp gain: 10.000000"));
    }

    #[tokio::test]
    async fn test_opamp_gain_reports_unset_inputs() {
        let tool = OpampGainTool::new();
        let mut cache = MeasurementCache::new();
        let err = run(&tool, "", &mut cache).await.unwrap_err();
        assert!(err.to_string().contains("calculate_amplitude"));

        cache.scope_amplitude = Some(1.0);
        let err = run(&tool, "", &mut cache).await.unwrap_err();
        assert!(err.to_string().contains("configure_signal_generator"));
    }
}
