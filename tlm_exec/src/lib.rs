//! # Telemetry library.
//!
//! This library allows the executables in this crate, and other crates in the workspace, to access
//! the telemetry pipeline.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Indices - velocity, acceleration and energy cost derived from robot snapshots
pub mod indices;

/// Parameters for the executables
pub mod params;

/// Reading sources - produce snapshots of the robot's state from replay data or the live robot
pub mod reading;

/// Robot client - connection to the robot controller
pub mod robot_client;

/// Pick and place sequencer - drives the robot through the part handling sequence
pub mod sequencer;

/// Telemetry loop - acquire, derive and publish on a fixed cadence
pub mod tlm_loop;

/// Telemetry server - publishes telemetry packets to subscribers
pub mod tlm_server;
