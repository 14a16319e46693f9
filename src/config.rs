//! Driver configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file,
//! then `MMOSIM_`-prefixed environment variables. Command-line flags are
//! applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix (nested keys use `__`, e.g. `MMOSIM_SIMULATION__PLAYERS`)
pub const ENV_PREFIX: &str = "MMOSIM_";

/// Upper bound for any configured number of seconds (one year)
const MAX_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Identity used by the single-step driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestUser {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Name of the character created for this user
    pub character: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            username: "TestUser".to_string(),
            email: "testuser@example.com".to_string(),
            password: "password123".to_string(),
            character: "TestHero".to_string(),
        }
    }
}

/// Multiplayer simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of virtual players
    pub players: u32,
    /// How long each player stays in the world
    pub duration_secs: f64,
    /// Mean time between moves
    pub move_interval_secs: f64,
    /// Moves happen within +/- this of the mean
    pub move_jitter_secs: f64,
    /// Mean time between proximity queries
    pub check_interval_secs: f64,
    pub check_jitter_secs: f64,
    /// Player loop resolution
    pub tick_secs: f64,
    /// Random pause between player launches
    pub stagger_min_secs: f64,
    pub stagger_max_secs: f64,
    /// How often the coordinator reports progress
    pub progress_interval_secs: f64,
    /// How long to wait for players to clean up after an interrupt
    pub shutdown_grace_secs: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            players: 2,
            duration_secs: 30.0,
            move_interval_secs: 5.0,
            move_jitter_secs: 1.0,
            check_interval_secs: 2.0,
            check_jitter_secs: 0.5,
            tick_secs: 0.5,
            stagger_min_secs: 0.1,
            stagger_max_secs: 0.5,
            progress_interval_secs: 5.0,
            shutdown_grace_secs: 5,
        }
    }
}

impl SimulationConfig {
    pub fn duration(&self) -> Duration {
        secs(self.duration_secs)
    }

    pub fn tick(&self) -> Duration {
        secs(self.tick_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        secs(self.progress_interval_secs)
    }

    /// Draw this player's move interval
    pub fn move_interval<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        jittered(self.move_interval_secs, self.move_jitter_secs, rng)
    }

    /// Draw this player's proximity-check interval
    pub fn check_interval<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        jittered(self.check_interval_secs, self.check_jitter_secs, rng)
    }

    /// Draw the pause before launching the next player
    pub fn stagger<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.stagger_max_secs <= self.stagger_min_secs {
            return secs(self.stagger_min_secs);
        }
        secs(rng.random_range(self.stagger_min_secs..=self.stagger_max_secs))
    }
}

/// Full driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the game server
    pub server_url: String,
    /// Extra attempts after a transport failure
    pub max_retries: u32,
    /// Base pause before a retry (jitter of up to half this is added)
    pub retry_delay_secs: f64,
    pub connect_timeout_secs: f64,
    pub request_timeout_secs: f64,
    /// Radius for proximity queries
    pub nearby_radius: f64,
    pub test_user: TestUser,
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            max_retries: 3,
            retry_delay_secs: 2.0,
            connect_timeout_secs: 3.0,
            request_timeout_secs: 10.0,
            nearby_radius: 20.0,
            test_user: TestUser::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Load defaults, then `path` (if any), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Reject values the driver cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "server_url",
                reason: format!("expected an http(s) URL, got '{}'", self.server_url),
            });
        }

        let durations = [
            ("retry_delay_secs", self.retry_delay_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("simulation.duration_secs", self.simulation.duration_secs),
            ("simulation.tick_secs", self.simulation.tick_secs),
            (
                "simulation.move_interval_secs",
                self.simulation.move_interval_secs,
            ),
            ("simulation.move_jitter_secs", self.simulation.move_jitter_secs),
            (
                "simulation.check_interval_secs",
                self.simulation.check_interval_secs,
            ),
            (
                "simulation.check_jitter_secs",
                self.simulation.check_jitter_secs,
            ),
            ("simulation.stagger_min_secs", self.simulation.stagger_min_secs),
            ("simulation.stagger_max_secs", self.simulation.stagger_max_secs),
            (
                "simulation.progress_interval_secs",
                self.simulation.progress_interval_secs,
            ),
        ];
        for (field, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a non-negative number of seconds, got {}", value),
                });
            }
            // Jitter ranges span twice the value
            if value > MAX_SECS {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be at most {} seconds, got {}", MAX_SECS, value),
                });
            }
        }

        if self.simulation.stagger_max_secs < self.simulation.stagger_min_secs {
            return Err(ConfigError::Invalid {
                field: "simulation.stagger_max_secs",
                reason: format!(
                    "must not be below stagger_min_secs ({})",
                    self.simulation.stagger_min_secs
                ),
            });
        }

        if !self.nearby_radius.is_finite() || self.nearby_radius < 0.0 {
            return Err(ConfigError::Invalid {
                field: "nearby_radius",
                reason: format!("must be a non-negative distance, got {}", self.nearby_radius),
            });
        }

        let periods = [
            ("simulation.tick_secs", self.simulation.tick_secs),
            (
                "simulation.progress_interval_secs",
                self.simulation.progress_interval_secs,
            ),
        ];
        for (field, value) in periods {
            if value == 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }

    /// Server URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn jittered<R: Rng + ?Sized>(base: f64, spread: f64, rng: &mut R) -> Duration {
    let offset = if spread > 0.0 {
        rng.random_range(-spread..=spread)
    } else {
        0.0
    };
    secs((base + offset).max(0.0))
}
