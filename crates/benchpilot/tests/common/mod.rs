//! Common test utilities for BenchPilot integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

/// Isolated home directory for one test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".benchpilot");

        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Command with HOME pointing at the test directory and no LLM env overrides
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_benchpilot"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env_remove("API_KEY");
        cmd.env_remove("API_BASE");
        cmd.env_remove("API_MODEL");
        cmd.env_remove("RUST_LOG");
        cmd.env("NO_COLOR", "1");
        cmd
    }

    /// Write a config file
    pub fn write_config(&self, json: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.config_file(), json)?;
        Ok(())
    }

    pub fn read_config(&self) -> anyhow::Result<serde_json::Value> {
        let content = std::fs::read_to_string(self.config_file())?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

/// SCPI instrument on a local socket: answers every query with `reply`
/// and records every command it receives.
pub struct FakeInstrument {
    pub address: String,
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl FakeInstrument {
    pub fn spawn(reply: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake instrument");
        let address = listener.local_addr().unwrap().to_string();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let seen = commands.clone();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let mut writer = stream.try_clone().unwrap();
                let seen = seen.clone();
                std::thread::spawn(move || {
                    for line in BufReader::new(stream).lines() {
                        let Ok(line) = line else { break };
                        let is_query = line.trim_end().ends_with('?');
                        seen.lock().unwrap().push(line);
                        if is_query && writeln!(writer, "{}", reply).is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self { address, commands }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Port on localhost with nothing listening
pub fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}
