//! The three instruments a measurement session drives.

use std::sync::Arc;
use tracing::{info, warn};

use benchpilot_config::{BenchConfig, InstrumentConfig, PowerOnStartup};

use crate::{Result, TcpTransport, Transport};

/// Oscilloscope, signal generator and power supply
#[derive(Clone)]
pub struct Bench {
    pub oscilloscope: Arc<dyn Transport>,
    pub signal_generator: Arc<dyn Transport>,
    pub power_supply: Arc<dyn Transport>,
}

impl Bench {
    pub fn new(
        oscilloscope: Arc<dyn Transport>,
        signal_generator: Arc<dyn Transport>,
        power_supply: Arc<dyn Transport>,
    ) -> Self {
        Self {
            oscilloscope,
            signal_generator,
            power_supply,
        }
    }

    /// Open all three sockets. Any unreachable instrument is a startup error.
    pub async fn connect(config: &BenchConfig) -> Result<Self> {
        async fn open(config: &InstrumentConfig) -> Result<Arc<dyn Transport>> {
            let transport = TcpTransport::connect(&config.address, config.timeout_ms).await?;
            Ok(Arc::new(transport))
        }

        info!("◆ CONNECTING BENCH");
        let bench = Self::new(
            open(&config.oscilloscope).await?,
            open(&config.signal_generator).await?,
            open(&config.power_supply).await?,
        );

        let idn = bench.identify().await?;
        info!("◆ OSCILLOSCOPE: {}", idn);
        Ok(bench)
    }

    /// `*IDN?` of the oscilloscope
    pub async fn identify(&self) -> Result<String> {
        self.oscilloscope.query("*IDN?").await
    }

    /// Apply the configured power supply output, if enabled
    pub async fn apply_power_on(&self, power: &PowerOnStartup) -> Result<()> {
        if !power.enabled {
            warn!("◆ POWER-ON SETTING DISABLED, SUPPLY LEFT AS IS");
            return Ok(());
        }

        for command in power_channel_commands(
            &power.channel,
            power.voltage,
            power.current,
            power.current_protect,
            &power.output_state,
        ) {
            self.power_supply.write(&command).await?;
        }
        info!(
            "◆ POWER {} SET TO {} V / {} A ({})",
            power.channel, power.voltage, power.current, power.output_state
        );
        Ok(())
    }
}

/// Command sequence that configures one power supply channel
pub fn power_channel_commands(
    channel: &str,
    voltage: f64,
    current: f64,
    current_protect: f64,
    output_state: &str,
) -> Vec<String> {
    vec![
        format!(":INST {}", channel),
        format!(":CURR {}", current),
        format!(":CURR:PROT {}", current_protect),
        ":CURR:PROT:STAT ON".to_string(),
        format!(":VOLT {}", voltage),
        format!(":OUTP {},{}", channel, output_state),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedTransport;

    fn scripted_bench() -> (Bench, Arc<ScriptedTransport>, Arc<ScriptedTransport>) {
        let scope = Arc::new(ScriptedTransport::with_replies(["ACME,SCOPE,1,1"]));
        let power = Arc::new(ScriptedTransport::new());
        let bench = Bench::new(
            scope.clone(),
            Arc::new(ScriptedTransport::new()),
            power.clone(),
        );
        (bench, scope, power)
    }

    #[test]
    fn test_power_channel_commands() {
        let commands = power_channel_commands("CH1", 5.0, 2.0, 2.3, "ON");
        assert_eq!(
            commands,
            vec![
                ":INST CH1",
                ":CURR 2",
                ":CURR:PROT 2.3",
                ":CURR:PROT:STAT ON",
                ":VOLT 5",
                ":OUTP CH1,ON",
            ]
        );
    }

    #[tokio::test]
    async fn test_identify_queries_scope() {
        let (bench, scope, _) = scripted_bench();
        assert_eq!(bench.identify().await.unwrap(), "ACME,SCOPE,1,1");
        assert_eq!(scope.writes(), vec!["*IDN?"]);
    }

    #[tokio::test]
    async fn test_apply_power_on_default() {
        let (bench, _, power) = scripted_bench();
        bench
            .apply_power_on(&PowerOnStartup::default())
            .await
            .unwrap();
        assert_eq!(power.writes().len(), 6);
        assert_eq!(power.writes()[5], ":OUTP CH1,ON");
    }

    #[tokio::test]
    async fn test_apply_power_on_disabled() {
        let (bench, _, power) = scripted_bench();
        let setting = PowerOnStartup {
            enabled: false,
            ..PowerOnStartup::default()
        };
        bench.apply_power_on(&setting).await.unwrap();
        assert!(power.writes().is_empty());
    }
}
