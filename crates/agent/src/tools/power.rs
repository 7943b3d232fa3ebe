//! Power supply channel setup

use async_trait::async_trait;
use std::sync::Arc;

use benchpilot_instrument::bench::power_channel_commands;
use benchpilot_instrument::Transport;

use super::{ParamSpec, ToolArgs, ToolError, ToolSchema, ToolTrait};
use crate::cache::MeasurementCache;

pub struct SetPowerSupplyTool {
    power: Arc<dyn Transport>,
    schema: ToolSchema,
}

impl SetPowerSupplyTool {
    pub fn new(power: Arc<dyn Transport>) -> Self {
        Self {
            power,
            schema: ToolSchema::new(vec![
                ParamSpec::text("channel", "CH1"),
                ParamSpec::number("voltage", 5.0),
                ParamSpec::number("current", 2.0),
                ParamSpec::number("current_protect", 2.3),
                ParamSpec::text("output_state", "ON"),
            ]),
        }
    }
}

#[async_trait]
impl ToolTrait for SetPowerSupplyTool {
    fn name(&self) -> &str {
        "set_power_supply_channel"
    }
    fn description(&self) -> &str {
        "Set a power supply channel: voltage in V, current in A, over-current protection \
         limit in A and output state (ON/OFF)."
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
        let voltage = args.number("voltage")?;
        let current = args.number("current")?;
        let current_protect = args.number("current_protect")?;
        let output_state = args.text("output_state")?;

        for command in
            power_channel_commands(channel, voltage, current, current_protect, output_state)
        {
            self.power.write(&command).await?;
        }

        Ok(format!(
            "\nPower supply channel {} set:\nVoltage: {} V\nCurrent: {} A\n\
             Over-current protection: {} A\nOutput: {}\n",
            channel, voltage, current, current_protect, output_state
        ))
    }
}
