//! # Executable Parameters
//!
//! Parameters for the telemetry and pick-and-place executables, loaded from TOML files in the
//! `params` directory.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::{
    indices::EnergyTariff,
    reading::NUM_POSE_AXES,
    robot_client::RobotConnParams,
    tlm_loop::TlmLoopParams,
    tlm_server::BrokerParams,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of poses making up one pick-and-place station: three for the pick, three for the place.
pub const NUM_STATION_POSES: usize = 6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for `tlm_exec`.
#[derive(Debug, Clone, Deserialize)]
pub struct TlmExecParams {
    pub tariff: EnergyTariff,

    pub broker: BrokerParams,

    pub robot: RobotConnParams,

    pub tlm_loop: TlmLoopParams,
}

/// Parameters for `pick_place`.
#[derive(Debug, Clone, Deserialize)]
pub struct PickPlaceParams {
    pub tariff: EnergyTariff,

    /// Connection used to command motion
    pub robot: RobotConnParams,

    /// Connection used to sample the robot's state
    pub reader: RobotConnParams,

    /// Motion velocity, percent of maximum
    pub velocity: u32,

    /// Motion acceleration, percent of maximum
    pub acceleration: u32,

    /// Number of times to run the whole sequence
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    /// Order in which the parts are handled
    pub order: Vec<String>,

    /// Joint poses for each part. The first three poses are the approach, grasp and retreat at the
    /// first station, the last three the same at the second station.
    pub poses: HashMap<String, Vec<[f64; NUM_POSE_AXES]>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("The tick period must be greater than zero, got {0} s")]
    InvalidTickPeriod(f64),

    #[error("The retry delay must not be negative, got {0} s")]
    InvalidRetryDelay(f64),

    #[error("The energy unit rate must be a non-negative number, got {0}")]
    InvalidUnitRate(f64),

    #[error("The telemetry topic must not be empty")]
    EmptyTopic,

    #[error("The {0} port must not be zero")]
    ZeroPort(&'static str),

    #[error("Motion {0} must be between 1 and 100 percent, got {1}")]
    InvalidMotionPercent(&'static str, u32),

    #[error("No poses are defined for part {0:?}")]
    MissingPoses(String),

    #[error("Part {0:?} has {1} poses, expected {}", NUM_STATION_POSES)]
    WrongPoseCount(String, usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TlmExecParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        check_tariff(&self.tariff)?;

        if self.broker.topic.is_empty() {
            return Err(ParamsError::EmptyTopic);
        }
        if self.broker.port == 0 {
            return Err(ParamsError::ZeroPort("broker"));
        }
        if self.robot.port == 0 {
            return Err(ParamsError::ZeroPort("robot"));
        }

        let period = self.tlm_loop.tick_period_s;
        if !(period.is_finite() && period > 0.0) {
            return Err(ParamsError::InvalidTickPeriod(period));
        }

        let delay = self.tlm_loop.retry_delay_s;
        if !(delay.is_finite() && delay >= 0.0) {
            return Err(ParamsError::InvalidRetryDelay(delay));
        }

        Ok(())
    }
}

impl PickPlaceParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        check_tariff(&self.tariff)?;

        if self.robot.port == 0 {
            return Err(ParamsError::ZeroPort("robot"));
        }
        if self.reader.port == 0 {
            return Err(ParamsError::ZeroPort("reader"));
        }

        for &(name, val) in &[("velocity", self.velocity), ("acceleration", self.acceleration)] {
            if val == 0 || val > 100 {
                return Err(ParamsError::InvalidMotionPercent(name, val));
            }
        }

        for part in &self.order {
            match self.poses.get(part) {
                None => return Err(ParamsError::MissingPoses(part.clone())),
                Some(p) if p.len() != NUM_STATION_POSES => {
                    return Err(ParamsError::WrongPoseCount(part.clone(), p.len()))
                }
                Some(_) => (),
            }
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_tariff(tariff: &EnergyTariff) -> Result<(), ParamsError> {
    let rate = tariff.unit_rate_minor_per_kwh;
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(ParamsError::InvalidUnitRate(rate))
    }
}

fn default_repetitions() -> u32 {
    1
}
