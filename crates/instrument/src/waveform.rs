//! ASCII waveform decoding.
//!
//! `:WAVeform:DATA?` in ASCII mode returns a fixed-width record: a header,
//! then one 14-character field per sample with the value in columns 11..24.

use std::path::Path;

/// Samples per screen record
pub const SAMPLE_COUNT: usize = 1400;

const FIELD_STRIDE: usize = 14;
const VALUE_OFFSET: usize = 11;
const VALUE_WIDTH: usize = 13;

/// Decode a raw ASCII record into exactly [`SAMPLE_COUNT`] samples.
/// Fields that are missing or not numeric decode as `0.0`.
pub fn decode_ascii(raw: &str) -> Vec<f64> {
    let record = raw.trim().replace('\r', "");
    let bytes = record.as_bytes();

    (0..SAMPLE_COUNT)
        .map(|i| {
            let start = FIELD_STRIDE * i + VALUE_OFFSET;
            let end = (start + VALUE_WIDTH).min(bytes.len());
            bytes
                .get(start..end)
                .and_then(|field| std::str::from_utf8(field).ok())
                .and_then(|field| field.trim().parse::<f64>().ok())
                .unwrap_or(0.0)
        })
        .collect()
}

/// Count of samples that decoded to something other than the 0.0 fallback
pub fn nonzero_samples(samples: &[f64]) -> usize {
    samples.iter().filter(|v| **v != 0.0).count()
}

/// Write samples as `index,value` CSV
pub async fn dump_csv(path: &Path, samples: &[f64]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut out = String::with_capacity(samples.len() * 16 + 16);
    out.push_str("index,value\n");
    for (i, v) in samples.iter().enumerate() {
        out.push_str(&format!("{},{}\n", i, v));
    }
    tokio::fs::write(path, out).await
}
