//! mmosim - multiplayer test driver for the game server HTTP API
//!
//! Walks the server's client lifecycle (health, auth, characters, enter,
//! move/query, exit) one step at a time, or launches a crowd of virtual
//! players that run the same script concurrently.

pub mod client;
pub mod config;
pub mod logging;
pub mod sim;
pub mod steps;

pub use client::{ClientError, GameClient};
pub use config::{Config, ConfigError, SimulationConfig, TestUser};
pub use sim::{Simulation, SimulationReport};
pub use steps::{RunStatus, Step, StepRunner};
