//! Scenario Tests
//!
//! End-to-end runs of the driver against the mock game server:
//! - Steps: the full step sequence and each step run on its own
//! - Simulation: crowds of virtual players, interrupts and failures

pub mod steps;
