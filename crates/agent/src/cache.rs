//! Readings shared between tools within one session

/// Values a later tool may need from an earlier one.
/// `None` means not measured yet in this session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeasurementCache {
    /// Amplitude last programmed into the signal generator (Vpp)
    pub generator_amplitude: Option<f64>,
    /// Half the peak-to-peak amplitude last measured on the scope
    pub scope_amplitude: Option<f64>,
    /// Frequency last measured on the scope
    pub frequency: Option<f64>,
}

impl MeasurementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
