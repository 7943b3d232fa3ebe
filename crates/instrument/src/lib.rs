//! Bench instrument access
//!
//! A thin SCPI text channel: write a command, read back a line. Nothing here
//! knows what the commands mean; the measurement tools in the agent crate do.

use async_trait::async_trait;
use thiserror::Error;

pub mod bench;
pub mod scripted;
pub mod tcp;
pub mod waveform;

pub use bench::Bench;
pub use scripted::ScriptedTransport;
pub use tcp::TcpTransport;

/// Instrument errors
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("INSTRUMENT I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CANNOT REACH INSTRUMENT AT {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("INSTRUMENT TIMEOUT AFTER {0} MS")]
    Timeout(u64),

    #[error("INSTRUMENT CLOSED THE CONNECTION")]
    Disconnected,

    #[error("NON-NUMERIC REPLY TO {command}: {reply:?}")]
    NotNumeric { command: String, reply: String },
}

pub type Result<T> = std::result::Result<T, InstrumentError>;

/// Text command channel to one instrument
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one command line
    async fn write(&self, command: &str) -> Result<()>;

    /// Read one reply line, without its terminator
    async fn read(&self) -> Result<String>;

    /// Write then read
    async fn query(&self, command: &str) -> Result<String> {
        self.write(command).await?;
        self.read().await
    }
}

/// Query a command and parse the reply as a number.
///
/// Empty and non-numeric replies are errors; scopes answer `****` when a
/// measurement is not available.
pub async fn query_number(transport: &dyn Transport, command: &str) -> Result<f64> {
    let reply = transport.query(command).await?;
    parse_number(command, &reply)
}

/// Parse an instrument reply as a number
pub fn parse_number(command: &str, reply: &str) -> Result<f64> {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| InstrumentError::NotNumeric {
            command: command.to_string(),
            reply: reply.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_accepts_scientific() {
        assert_eq!(parse_number(":MEAS?", " 1.25E-3\n").unwrap(), 1.25e-3);
        assert_eq!(parse_number(":MEAS?", "-4").unwrap(), -4.0);
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        for reply in ["", "   ", "****", "CHAN1", "nan", "inf"] {
            match parse_number(":MEASure:RISetime? CHAN1", reply) {
                Err(InstrumentError::NotNumeric { command, .. }) => {
                    assert_eq!(command, ":MEASure:RISetime? CHAN1")
                }
                other => panic!("expected NotNumeric for {:?}, got {:?}", reply, other),
            }
        }
    }

    #[tokio::test]
    async fn test_query_number_goes_through_transport() {
        let scope = ScriptedTransport::with_replies(["3.3"]);
        let value = query_number(&scope, ":MEASure:VAMPlitude? CHAN1")
            .await
            .unwrap();
        assert_eq!(value, 3.3);
        assert_eq!(scope.writes(), vec![":MEASure:VAMPlitude? CHAN1"]);
    }

    #[test]
    fn test_error_display() {
        let err = InstrumentError::NotNumeric {
            command: ":MEAS?".to_string(),
            reply: "****".to_string(),
        };
        assert_eq!(err.to_string(), "NON-NUMERIC REPLY TO :MEAS?: \"****\"");
        assert_eq!(
            InstrumentError::Timeout(500).to_string(),
            "INSTRUMENT TIMEOUT AFTER 500 MS"
        );
    }
}
