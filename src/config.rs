//! Harness configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::time::Duration;

use crate::decision::DecisionThresholds;

/// Endpoint used when neither the CLI nor the environment names one.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8888";

/// Local chip stack an agent assumes before its first snapshot.
pub const DEFAULT_STARTING_CHIPS: f64 = 1000.0;

/// Per-agent timing and policy settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Bound on the WebSocket handshake
    pub connect_timeout: Duration,
    /// Bound on every listener `receive()`
    pub receive_timeout: Duration,
    /// Pause after register, seat, and start requests
    pub settle_delay: Duration,
    /// Pause before answering a turn prompt
    pub think_time: Duration,
    /// Local chip stack before the first snapshot
    pub starting_chips: f64,
    /// Decision policy thresholds
    pub thresholds: DecisionThresholds,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_millis(100),
            think_time: Duration::from_millis(500),
            starting_chips: DEFAULT_STARTING_CHIPS,
            thresholds: DecisionThresholds::default(),
        }
    }
}

/// Complete harness configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Server WebSocket URL
    pub endpoint: String,
    /// Settings shared by every agent
    pub agent: AgentConfig,
    /// Bound on each scenario step, added on top of any fixed wait the step has
    pub step_timeout: Duration,
    /// Observation window for the built-in scenarios
    pub observe: Duration,
    /// End observation after this many hand results instead of after `observe`
    pub hand_target: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            agent: AgentConfig::default(),
            step_timeout: Duration::from_secs(10),
            observe: Duration::from_secs(30),
            hand_target: None,
        }
    }
}

/// Command-line values that take precedence over the environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub observe: Option<Duration>,
    pub hand_target: Option<u64>,
}

impl HarnessConfig {
    /// Load configuration from environment variables, apply `overrides`,
    /// then validate the result once.
    ///
    /// # Errors
    ///
    /// Returns error if the final values fail [`HarnessConfig::validate`]
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::load_env();
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables without validating it
    pub fn load_env() -> Self {
        let defaults = Self::default();

        let endpoint = std::env::var("HARNESS_ENDPOINT").unwrap_or(defaults.endpoint);

        let thresholds = DecisionThresholds {
            small_call_threshold: parse_env_or(
                "HARNESS_SMALL_CALL_THRESHOLD",
                defaults.agent.thresholds.small_call_threshold,
            ),
            raise_eligible_threshold: parse_env_or(
                "HARNESS_RAISE_ELIGIBLE_THRESHOLD",
                defaults.agent.thresholds.raise_eligible_threshold,
            ),
        };

        let agent = AgentConfig {
            connect_timeout: millis_env_or("HARNESS_CONNECT_TIMEOUT_MS", defaults.agent.connect_timeout),
            receive_timeout: millis_env_or("HARNESS_RECEIVE_TIMEOUT_MS", defaults.agent.receive_timeout),
            settle_delay: millis_env_or("HARNESS_SETTLE_DELAY_MS", defaults.agent.settle_delay),
            think_time: millis_env_or("HARNESS_THINK_TIME_MS", defaults.agent.think_time),
            starting_chips: parse_env_or("HARNESS_STARTING_CHIPS", defaults.agent.starting_chips),
            thresholds,
        };

        HarnessConfig {
            endpoint,
            agent,
            step_timeout: millis_env_or("HARNESS_STEP_TIMEOUT_MS", defaults.step_timeout),
            observe: Duration::from_secs(parse_env_or(
                "HARNESS_OBSERVE_SECS",
                defaults.observe.as_secs(),
            )),
            hand_target: std::env::var("HARNESS_HAND_TARGET")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(observe) = overrides.observe {
            self.observe = observe;
        }
        if overrides.hand_target.is_some() {
            self.hand_target = overrides.hand_target;
        }
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                var: "HARNESS_ENDPOINT".to_string(),
                reason: format!("Must be a ws:// or wss:// URL, got '{}'", self.endpoint),
            });
        }

        for (var, value) in [
            ("HARNESS_CONNECT_TIMEOUT_MS", self.agent.connect_timeout),
            ("HARNESS_RECEIVE_TIMEOUT_MS", self.agent.receive_timeout),
            ("HARNESS_STEP_TIMEOUT_MS", self.step_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        let thresholds = &self.agent.thresholds;
        if thresholds.small_call_threshold.is_nan() || thresholds.small_call_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                var: "HARNESS_SMALL_CALL_THRESHOLD".to_string(),
                reason: "Must be a non-negative number".to_string(),
            });
        }

        if thresholds.raise_eligible_threshold.is_nan()
            || thresholds.raise_eligible_threshold < thresholds.small_call_threshold
        {
            return Err(ConfigError::Invalid {
                var: "HARNESS_RAISE_ELIGIBLE_THRESHOLD".to_string(),
                reason: format!(
                    "Must be at least the small call threshold ({})",
                    thresholds.small_call_threshold
                ),
            });
        }

        if self.hand_target == Some(0) {
            return Err(ConfigError::Invalid {
                var: "HARNESS_HAND_TARGET".to_string(),
                reason: "Must be greater than 0 when set".to_string(),
            });
        }

        Ok(())
    }
}

/// `ws://localhost:<port>`
pub fn endpoint_for_port(port: u16) -> String {
    format!("ws://localhost:{port}")
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn millis_env_or(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_millis)
}
