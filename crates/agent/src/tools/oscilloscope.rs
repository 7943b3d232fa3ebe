//! Oscilloscope setup and waveform capture

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use benchpilot_instrument::{waveform, Transport};

use super::{ParamSpec, ToolArgs, ToolError, ToolOptions, ToolSchema, ToolTrait};
use crate::cache::MeasurementCache;

/// File the last observed waveform is written to
pub const WAVEFORM_FILE: &str = "observe_wave.csv";

/// Read one screen of samples from `channel` in ASCII mode
pub async fn capture_waveform(
    scope: &dyn Transport,
    channel: &str,
) -> Result<Vec<f64>, ToolError> {
    scope.write(&format!(":WAVeform:SOURce {}", channel)).await?;
    scope.write(":WAVeform:MODE NORMal").await?;
    scope.write(":WAVeform:FORMat ASCII").await?;
    let raw = scope.query(":WAVeform:DATA?").await?;
    Ok(waveform::decode_ascii(&raw))
}

/// Reset the oscilloscope
pub struct InitializeOscilloscopeTool {
    scope: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl InitializeOscilloscopeTool {
    pub fn new(scope: Arc<dyn Transport>) -> Self {
        Self {
            scope,
            schema: ToolSchema::new(vec![ParamSpec::text("initial_state", "ON")]),
        }
    }
}

#[async_trait]
impl ToolTrait for InitializeOscilloscopeTool {
    fn name(&self) -> &str {
        "initialize_oscilloinst"
    }
    fn description(&self) -> &str {
        "Initialise the oscilloscope: reset and clear it. Does not autoscale."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(
        &self,
        _args: ToolArgs,
        _cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        self.scope.write(":RST").await?;
        self.scope.write(":SYSTem:CLEAr").await?;
        info!("◆ OSCILLOSCOPE RESET");
        Ok("\nOscilloscope initialised.\n".to_string())
    }
}

/// Vertical setup of one scope channel
pub struct SetScopeChannelTool {
    scope: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl SetScopeChannelTool {
    pub fn new(scope: Arc<dyn Transport>) -> Self {
        Self {
            scope,
            schema: ToolSchema::new(vec![
                ParamSpec::text("channel", "CHAN1"),
                ParamSpec::text("state", "ON"),
                ParamSpec::text("coupling", "DC"),
                ParamSpec::text("invert", "OFF"),
                ParamSpec::text("probe", "1X"),
                ParamSpec::number("offset", 0.0),
                ParamSpec::number("scale", 1.0),
                ParamSpec::text("units", "VOLTs"),
                ParamSpec::text("vernier", "OFF"),
            ]),
        }
    }
}

#[async_trait]
impl ToolTrait for SetScopeChannelTool {
    fn name(&self) -> &str {
        "set_oscilloinst_channel"
    }
    fn description(&self) -> &str {
        "Set up one oscilloscope channel: display state (ON/OFF), coupling (DC/AC/GND), \
         invert (ON/OFF), probe attenuation, vertical offset, volts per division, \
         units (VOLTs/AMPeres/WATTs/UNKNown) and vernier (ON/OFF)."
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
        let state = args.text("state")?;
        let coupling = args.text("coupling")?;
        let invert = args.text("invert")?;
        let probe = args.text("probe")?;
        let offset = args.number("offset")?;
        let scale = args.number("scale")?;
        let units = args.text("units")?;
        let vernier = args.text("vernier")?;

        for command in [
            format!(":{}:DISP {}", channel, state),
            format!(":{}:COUP {}", channel, coupling),
            format!(":{}:INVert {}", channel, invert),
            format!(":{}:PROBe {}", channel, probe),
            format!(":{}:OFFSet {}", channel, offset),
            format!(":{}:SCALe {}", channel, scale),
            format!(":{}:UNITs {}", channel, units),
            format!(":{}:VERNier {}", channel, vernier),
        ] {
            self.scope.write(&command).await?;
        }

        Ok(format!(
            "\nChannel {} set:\nDisplay: {}\nCoupling: {}\nInvert: {}\nProbe: {}\n\
             Offset: {}\nScale: {} /div\nUnits: {}\nVernier: {}\n",
            channel, state, coupling, invert, probe, offset, scale, units, vernier
        ))
    }
}

/// Capture a channel's waveform and dump it as CSV
pub struct ObserveChannelWaveTool {
    scope: Arc<dyn Transport>,
    waveform_dir: PathBuf,
    settle: Duration,
    schema: ToolSchema,
}

impl ObserveChannelWaveTool {
    pub fn new(scope: Arc<dyn Transport>, options: &ToolOptions) -> Self {
        Self {
            scope,
            waveform_dir: options.waveform_dir.clone(),
            // the scope needs longer to settle a trace than a measurement
            settle: options.settle * 2,
            schema: ToolSchema::new(vec![ParamSpec::text("channel", "CHAN1")]),
        }
    }
}

#[async_trait]
impl ToolTrait for ObserveChannelWaveTool {
    fn name(&self) -> &str {
        "observe_channel_wave"
    }
    fn description(&self) -> &str {
        "Observe the waveform of one oscilloscope channel. The default source is CHAN1."
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
        tokio::time::sleep(self.settle).await;

        let samples = capture_waveform(self.scope.as_ref(), channel).await?;
        let decoded = waveform::nonzero_samples(&samples);
        debug!("◆ {} SAMPLES FROM {}, {} NON-ZERO", samples.len(), channel, decoded);

        let path = self.waveform_dir.join(WAVEFORM_FILE);
        waveform::dump_csv(&path, &samples).await?;

        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(format!(
            "\nWaveform of {} captured: {} samples, min {:.4} V, max {:.4} V, saved to {}\n",
            channel,
            samples.len(),
            min,
            max,
            path.display()
        ))
    }
}
