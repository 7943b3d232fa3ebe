//! Signal generator output and frequency sweeps

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use benchpilot_instrument::{waveform, Transport};

use super::oscilloscope::capture_waveform;
use super::{framed, on_off, ParamSpec, ToolArgs, ToolError, ToolOptions, ToolSchema, ToolTrait};
use crate::cache::MeasurementCache;

/// File the amplitude-frequency curve is written to
pub const SWEEP_FILE: &str = "amplitude_frequency.csv";

/// Continuous, modulated or burst output on one generator channel
pub struct ConfigureSignalGeneratorTool {
    awg: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl ConfigureSignalGeneratorTool {
    pub fn new(awg: Arc<dyn Transport>) -> Self {
        Self {
            awg,
            schema: ToolSchema::new(vec![
                ParamSpec::text("channel", "CHANnel1"),
                ParamSpec::text("mode", "CONTinue"),
                ParamSpec::text("waveform", "SQUare"),
                ParamSpec::number("frequency", 2e5),
                ParamSpec::number("amplitude", 2.0),
                ParamSpec::number("offset", 0.0),
                ParamSpec::number("phase", 0.0),
                ParamSpec::number("duty", 50.0),
                ParamSpec::flag("invert", false),
                ParamSpec::flag("sync_invert", false),
                ParamSpec::flag("limit_enable", false),
                ParamSpec::optional_number("limit_lower"),
                ParamSpec::optional_number("limit_upper"),
                ParamSpec::text("amplitude_unit", "VPP"),
                ParamSpec::text("psk_code", "PN7"),
                ParamSpec::text("qam_code", "PN7"),
                ParamSpec::text("trigger_source", "INTernal"),
                ParamSpec::text("trigger_output", "RISe"),
            ]),
        }
    }
}

#[async_trait]
impl ToolTrait for ConfigureSignalGeneratorTool {
    fn name(&self) -> &str {
        "configure_signal_generator"
    }
    fn description(&self) -> &str {
        "Configure a signal generator channel: mode (CONTinue/MODulation/BURSt), waveform \
         (SINe/SQUare/PULSe/RAMP/ARB/NOISe/DC), frequency in Hz, amplitude, offset, phase, \
         duty cycle, invert, sync invert, amplitude limits, amplitude unit (VPP/DBM/VRMS), \
         PSK and QAM codes, trigger source and trigger output. Not for frequency sweeps."
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
        let mode = args.text("mode")?;
        let wave = args.text("waveform")?;
        let frequency = args.number("frequency")?;
        let amplitude = args.number("amplitude")?;
        let offset = args.number("offset")?;
        let phase = args.number("phase")?;
        let duty = args.number("duty")?;
        let invert = on_off(args.flag("invert")?);
        let sync_invert = on_off(args.flag("sync_invert")?);
        let limit_enable = on_off(args.flag("limit_enable")?);
        let limit_lower = args.optional_number("limit_lower");
        let limit_upper = args.optional_number("limit_upper");
        let amplitude_unit = args.text("amplitude_unit")?;
        let psk_code = args.text("psk_code")?;
        let qam_code = args.text("qam_code")?;
        let trigger_source = args.text("trigger_source")?;
        let trigger_output = args.text("trigger_output")?;

        let mut commands = vec![
            format!(":{}:MODE {}", channel, mode),
            format!(":{}:BASE:WAVe {}", channel, wave),
            format!(":{}:BASE:FREQuency {}", channel, frequency),
            format!(":{}:BASE:AMPLitude {}", channel, amplitude),
            format!(":{}:BASE:OFFSet {}", channel, offset),
            format!(":{}:BASE:PHAse {}", channel, phase),
            format!(":{}:BASE:DUTY {}", channel, duty),
            format!(":{}:INVersion {}", channel, invert),
            format!(":{}:OUTPut:SYNC:INVersion {}", channel, sync_invert),
            format!(":{}:LIMit:ENABle {}", channel, limit_enable),
        ];
        if let Some(lower) = limit_lower {
            commands.push(format!(":{}:LIMit:LOWer {}", channel, lower));
        }
        if let Some(upper) = limit_upper {
            commands.push(format!(":{}:LIMit:UPPer {}", channel, upper));
        }
        commands.extend([
            format!(":{}:PSK:PNCode {}", channel, psk_code),
            format!(":{}:QAM:PNCode {}", channel, qam_code),
            format!(":{}:TRIGger:SOURce {}", channel, trigger_source),
            format!(":{}:TRIGger:OUTPut {}", channel, trigger_output),
            format!(":{}:OUTPut ON", channel),
        ]);

        for command in &commands {
            self.awg.write(command).await?;
        }
        cache.generator_amplitude = Some(amplitude);
        info!("◆ GENERATOR {} OUTPUT ON: {} {} Hz {} {}", channel, wave, frequency, amplitude, amplitude_unit);

        let not_set = || "not set".to_string();
        Ok(format!(
            "\nChannel {} set:\nMode: {}\nWaveform: {}\nFrequency: {} Hz\nAmplitude: {} {}\n\
             Offset: {}\nPhase: {}\nDuty: {}%\nInvert: {}\nSync invert: {}\nLimit: {}\n\
             Lower limit: {}\nUpper limit: {}\nPSK code: {}\nQAM code: {}\n\
             Trigger source: {}\nTrigger output: {}\n",
            channel,
            mode,
            wave,
            frequency,
            amplitude,
            amplitude_unit,
            offset,
            phase,
            duty,
            invert,
            sync_invert,
            limit_enable,
            limit_lower.map_or_else(not_set, |v| v.to_string()),
            limit_upper.map_or_else(not_set, |v| v.to_string()),
            psk_code,
            qam_code,
            trigger_source,
            trigger_output,
        ))
    }
}

/// Frequency sweep on the generator, captured as a curve on the scope
pub struct AmplitudeFrequencyTool {
    scope: Arc<dyn Transport>,
    awg: Arc<dyn Transport>,
    waveform_dir: PathBuf,
    settle: Duration,
    schema: ToolSchema,
}

impl AmplitudeFrequencyTool {
    pub fn new(scope: Arc<dyn Transport>, awg: Arc<dyn Transport>, options: &ToolOptions) -> Self {
        Self {
            scope,
            awg,
            waveform_dir: options.waveform_dir.clone(),
            settle: options.settle,
            schema: ToolSchema::new(vec![
                ParamSpec::text("channel", "CHANnel1"),
                ParamSpec::text("sweep_type", "LINe"),
                ParamSpec::number("start_frequency", 1000.0),
                ParamSpec::number("stop_frequency", 1e7),
                ParamSpec::number("sweep_time", 1.4),
                ParamSpec::flag("trigger_sweep", false),
                ParamSpec::text("channel2", "CHAN1"),
            ]),
        }
    }
}

#[async_trait]
impl ToolTrait for AmplitudeFrequencyTool {
    fn name(&self) -> &str {
        "calculate_amplitude_frequency_characteristic"
    }
    fn description(&self) -> &str {
        "Sweep the signal generator (channel, sweep_type LINe/LOG, start and stop frequency, \
         sweep time, trigger) and capture the module's amplitude-frequency curve on scope \
         channel2. Needs the generator amplitude from configure_signal_generator."
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
        let sweep_type = args.text("sweep_type")?;
        let start = args.number("start_frequency")?;
        let stop = args.number("stop_frequency")?;
        let sweep_time = args.number("sweep_time")?;
        let trigger_sweep = args.flag("trigger_sweep")?;
        let scope_channel = args.text("channel2")?;

        let amplitude = cache.generator_amplitude.ok_or_else(|| {
            ToolError::Unavailable(
                "generator amplitude unknown, run configure_signal_generator first".to_string(),
            )
        })?;
        if stop <= start {
            return Err(ToolError::Unavailable(format!(
                "stop frequency {} Hz must be above start frequency {} Hz",
                stop, start
            )));
        }

        self.awg.write(&format!(":{}:OUTPut OFF", channel)).await?;

        for command in [
            format!(":{}:COUP DC", scope_channel),
            ":TRIGger:SWEEp SINGle".to_string(),
            format!(":{}:SCALe {}", scope_channel, amplitude / 4.0),
            format!(":TIM:SCAL {}", sweep_time / 14.0),
            format!(":TIM:OFFS {}", sweep_time / 2.0),
        ] {
            self.scope.write(&command).await?;
        }

        for command in [
            format!(":{}:MODE SWEep", channel),
            format!(":{}:SWEEp:TYPe {}", channel, sweep_type),
            format!(":{}:SWEEp:FREQuency:STARt {}", channel, start),
            format!(":{}:SWEEp:FREQuency:STOP {}", channel, stop),
            format!(":{}:SWEEp:TIMe {}", channel, sweep_time),
            format!(":{}:OUTPut ON", channel),
        ] {
            self.awg.write(&command).await?;
        }
        if trigger_sweep {
            self.awg.write(&format!(":{}:SWEep:TRIGger", channel)).await?;
        }

        tokio::time::sleep(self.settle).await;
        let samples = capture_waveform(self.scope.as_ref(), scope_channel).await?;

        // the sweep spans the screen, so sample i sits at a fixed fraction of the band
        let step = (stop - start) / samples.len() as f64;
        let curve: Vec<(f64, f64)> = samples
            .iter()
            .enumerate()
            .map(|(i, v)| (start + step * i as f64, v.abs()))
            .collect();
        let path = self.waveform_dir.join(SWEEP_FILE);
        dump_curve(&path, &curve).await?;

        let peak = curve
            .iter()
            .copied()
            .fold((start, 0.0_f64), |best, point| if point.1 > best.1 { point } else { best });

        Ok(format!(
            "\nChannel {} sweep configured:\nSweep type: {}\nStart: {} Hz\nStop: {} Hz\n\
             Sweep time: {} s\nTriggered: {}\n{}",
            channel,
            sweep_type,
            start,
            stop,
            sweep_time,
            if trigger_sweep { "yes" } else { "no" },
            framed(&format!(
                "Amplitude-frequency curve saved to {}\nPeak response {:.6} V at {:.1} Hz",
                path.display(),
                peak.1,
                peak.0
            ))
        ))
    }
}

async fn dump_curve(path: &std::path::Path, curve: &[(f64, f64)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut out = String::from("frequency_hz,amplitude_v\n");
    for (f, a) in curve {
        out.push_str(&format!("{},{}\n", f, a));
    }
    tokio::fs::write(path, out).await
}
