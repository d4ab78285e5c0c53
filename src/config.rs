//! # Server Configuration
//!
//! All sections are optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:4005"
//!
//! [gateway]
//! url = "https://hexi.wokwi.com/build"
//! timeout_secs = 30
//!
//! [simulation]
//! burst_instructions = 500000
//! clock_hz = 16000000
//! observed_pins = [0, 1, 2, 3, 4, 5, 6, 7, 13]
//! dedupe_bursts = true
//! sketch_path = "sketches/blink.ino"
//! request_queue = 64
//!
//! [broadcast]
//! capacity = 256
//! ```

use pinwire_mcu::{pin_location, DEFAULT_CLOCK_HZ};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Listening socket for the observer channel and status endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// External build service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Instructions executed between yields to the scheduler.
    #[serde(default = "default_burst_instructions")]
    pub burst_instructions: u64,
    /// Emulated CPU clock, used to convert cycles to emulated time.
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,
    /// Arduino pin numbers reported in pin-state snapshots.
    #[serde(default = "default_observed_pins")]
    pub observed_pins: Vec<u8>,
    /// Skip broadcasting burst snapshots identical to the previous one.
    #[serde(default = "default_dedupe_bursts")]
    pub dedupe_bursts: bool,
    /// Program text sent to new observers before any compile-run.
    #[serde(default)]
    pub sketch_path: Option<PathBuf>,
    #[serde(default = "default_request_queue")]
    pub request_queue: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            burst_instructions: default_burst_instructions(),
            clock_hz: default_clock_hz(),
            observed_pins: default_observed_pins(),
            dedupe_bursts: default_dedupe_bursts(),
            sketch_path: None,
            request_queue: default_request_queue(),
        }
    }
}

impl SimulationConfig {
    /// Program text for new observers: the configured sketch file, or the
    /// built-in placeholder.
    pub fn placeholder_sketch(&self) -> Result<String, ConfigError> {
        match &self.sketch_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                tracing::error!("Failed to read sketch '{}': {}", path.display(), e);
                ConfigError::Io(e)
            }),
            None => Ok(DEFAULT_SKETCH.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastConfig {
    /// Events buffered per observer before it starts lagging.
    #[serde(default = "default_broadcast_capacity")]
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: default_broadcast_capacity(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.burst_instructions == 0 {
            return Err(ConfigError::Invalid("simulation.burst_instructions must be positive".into()));
        }
        if sim.clock_hz == 0 {
            return Err(ConfigError::Invalid("simulation.clock_hz must be positive".into()));
        }
        if sim.request_queue == 0 {
            return Err(ConfigError::Invalid("simulation.request_queue must be positive".into()));
        }
        if let Some(pin) = sim.observed_pins.iter().find(|pin| pin_location(**pin).is_none()) {
            return Err(ConfigError::Invalid(format!(
                "simulation.observed_pins: pin {pin} is not wired to a port"
            )));
        }
        if self.broadcast.capacity == 0 {
            return Err(ConfigError::Invalid("broadcast.capacity must be positive".into()));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(ConfigError::Invalid("gateway.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

fn default_bind() -> String { "0.0.0.0:4005".to_string() }
fn default_gateway_url() -> String { "https://hexi.wokwi.com/build".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_burst_instructions() -> u64 { 500_000 }
fn default_clock_hz() -> u32 { DEFAULT_CLOCK_HZ }
fn default_observed_pins() -> Vec<u8> { vec![0, 1, 2, 3, 4, 5, 6, 7, 13] }
fn default_dedupe_bursts() -> bool { true }
fn default_request_queue() -> usize { 64 }
fn default_broadcast_capacity() -> usize { 256 }

/// Sketch shown to observers until someone submits their own.
pub const DEFAULT_SKETCH: &str = r#"// Pins 6 and 7 alternate every second.
// A button on pin 2 flips the built-in LED on pin 13.

const int buttonPin = 2;
const int ledPin = 13;
bool ledOn = false;
bool lastButton = HIGH;

void setup() {
  pinMode(6, OUTPUT);
  pinMode(7, OUTPUT);
  pinMode(ledPin, OUTPUT);
  pinMode(buttonPin, INPUT_PULLUP);
}

void loop() {
  digitalWrite(6, HIGH);
  digitalWrite(7, LOW);
  delay(1000);
  digitalWrite(6, LOW);
  digitalWrite(7, HIGH);
  delay(1000);

  bool button = digitalRead(buttonPin);
  if (button == LOW && lastButton == HIGH) {
    ledOn = !ledOn;
    digitalWrite(ledPin, ledOn ? HIGH : LOW);
  }
  lastButton = button;
}
"#;

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:4005");
        assert_eq!(config.simulation.burst_instructions, 500_000);
        assert_eq!(config.simulation.clock_hz, 16_000_000);
        assert_eq!(config.simulation.observed_pins, vec![0, 1, 2, 3, 4, 5, 6, 7, 13]);
        assert!(config.simulation.dedupe_bursts);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pinwire.toml");
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            "[simulation]\nburst_instructions = 1000\nobserved_pins = [13, 2]\n\n[gateway]\nurl = \"http://localhost:9000/build\""
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.simulation.burst_instructions, 1000);
        assert_eq!(config.simulation.observed_pins, vec![13, 2]);
        assert_eq!(config.simulation.clock_hz, 16_000_000);
        assert_eq!(config.gateway.url, "http://localhost:9000/build");
        assert_eq!(config.server.bind, "0.0.0.0:4005");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = load_config(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[simulation\nburst_instructions = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validate_rejects_unwired_pins_and_zero_burst() {
        let mut config = Config::default();
        config.simulation.observed_pins.push(42);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.simulation.burst_instructions = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_placeholder_sketch_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blink.ino");
        std::fs::write(&path, "void setup() {}\nvoid loop() {}\n").unwrap();
        let sim = SimulationConfig {
            sketch_path: Some(path),
            ..SimulationConfig::default()
        };
        assert_eq!(sim.placeholder_sketch().unwrap(), "void setup() {}\nvoid loop() {}\n");
        assert_eq!(SimulationConfig::default().placeholder_sketch().unwrap(), DEFAULT_SKETCH);
    }
}
