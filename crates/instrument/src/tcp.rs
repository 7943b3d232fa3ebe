//! Raw-socket SCPI transport (LXI instruments listen on port 5025).

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::{InstrumentError, Result, Transport};

/// Newline-terminated SCPI over TCP.
///
/// A timed-out or failed exchange drops the connection; the next write
/// reconnects, so a late reply can never be read as the answer to a later
/// query.
pub struct TcpTransport {
    address: String,
    timeout: Duration,
    stream: Mutex<Option<BufReader<TcpStream>>>,
}

impl TcpTransport {
    /// Connect to `host:port`, failing after `timeout_ms`
    pub async fn connect(address: &str, timeout_ms: u64) -> Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);
        let stream = open(address, timeout).await?;
        debug!("◆ CONNECTED TO {}", address);

        Ok(Self {
            address: address.to_string(),
            timeout,
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

async fn open(address: &str, timeout: Duration) -> Result<BufReader<TcpStream>> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(InstrumentError::Connect {
                address: address.to_string(),
                source,
            })
        }
        Err(_) => return Err(InstrumentError::Timeout(timeout.as_millis() as u64)),
    };
    stream.set_nodelay(true)?;
    Ok(BufReader::new(stream))
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write(&self, command: &str) -> Result<()> {
        trace!("◆ {} <- {}", self.address, command);
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            warn!("◆ RECONNECTING TO {}", self.address);
            *guard = Some(open(&self.address, self.timeout).await?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(InstrumentError::Disconnected);
        };

        let line = format!("{}\n", command);
        let write = stream.get_mut().write_all(line.as_bytes());
        let result = match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(InstrumentError::from(e)),
            Err(_) => Err(InstrumentError::Timeout(self.timeout_ms())),
        };
        if result.is_err() {
            *guard = None;
        }
        result
    }

    async fn read(&self) -> Result<String> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(InstrumentError::Disconnected);
        };

        let mut line = String::new();
        let result = match tokio::time::timeout(self.timeout, stream.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(InstrumentError::Disconnected),
            Ok(Ok(_)) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
            Ok(Err(e)) => Err(InstrumentError::from(e)),
            Err(_) => Err(InstrumentError::Timeout(self.timeout_ms())),
        };
        match &result {
            Ok(reply) => trace!("◆ {} -> {} bytes", self.address, reply.len()),
            // the reply may still arrive; never read it as a later answer
            Err(_) => *guard = None,
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Fake instrument answering `*IDN?` on every connection
    async fn spawn_fake_instrument() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (reader, mut writer) = socket.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if line == "*IDN?" {
                            writer.write_all(b"ACME,SCOPE-1000,SN01,1.0\r\n").await.unwrap();
                        }
                    }
                });
            }
        });
        address
    }

    #[tokio::test]
    async fn test_query_roundtrip() {
        let address = spawn_fake_instrument().await;
        let transport = TcpTransport::connect(&address, 1000).await.unwrap();

        transport.write(":RST").await.unwrap();
        let idn = transport.query("*IDN?").await.unwrap();
        assert_eq!(idn, "ACME,SCOPE-1000,SN01,1.0");
        assert_eq!(transport.address(), address);
    }

    #[tokio::test]
    async fn test_read_without_reply_times_out() {
        let address = spawn_fake_instrument().await;
        let transport = TcpTransport::connect(&address, 100).await.unwrap();

        let result = transport.query(":MEASure:VAMPlitude? CHAN1").await;
        assert!(matches!(result, Err(InstrumentError::Timeout(100))));
    }

    /// Fake scope that answers the rise time late, on every connection
    async fn spawn_slow_scope(delay: Duration) -> (String, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let (reader, mut writer) = socket.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let reply: &[u8] = match line.as_str() {
                            ":MEASure:RISetime? CHAN1" => {
                                tokio::time::sleep(delay).await;
                                b"4e-7\n"
                            }
                            ":MEASure:VAMPlitude? CHAN1" => b"5.0\n",
                            _ => continue,
                        };
                        if writer.write_all(reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        (address, connections)
    }

    #[tokio::test]
    async fn test_late_reply_is_not_read_by_next_query() {
        let (address, connections) = spawn_slow_scope(Duration::from_millis(200)).await;
        let transport = TcpTransport::connect(&address, 100).await.unwrap();

        let late = transport.query(":MEASure:RISetime? CHAN1").await;
        assert!(matches!(late, Err(InstrumentError::Timeout(100))));

        // let the stale reply land before asking again
        tokio::time::sleep(Duration::from_millis(250)).await;
        let amplitude = transport.query(":MEASure:VAMPlitude? CHAN1").await.unwrap();
        assert_eq!(amplitude, "5.0");
        assert_eq!(connections.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_after_timeout_reports_disconnected() {
        let address = spawn_fake_instrument().await;
        let transport = TcpTransport::connect(&address, 100).await.unwrap();

        assert!(transport.read().await.is_err());
        assert!(matches!(transport.read().await, Err(InstrumentError::Disconnected)));

        // the next write reconnects
        let idn = transport.query("*IDN?").await.unwrap();
        assert_eq!(idn, "ACME,SCOPE-1000,SN01,1.0");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpTransport::connect(&address, 1000).await;
        assert!(matches!(result, Err(InstrumentError::Connect { .. })));
    }
}
