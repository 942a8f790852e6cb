//! # Reading Sources
//!
//! A reading source produces [`Snapshot`]s of the robot's state on demand. Two sources are
//! provided:
//!
//! - [`ReplaySource`] - replays snapshots recorded in a CSV file, cycling when exhausted.
//! - [`LiveSource`] - queries a robot controller over a [`RobotLink`](crate::robot_client::RobotLink).
//!
//! Consumers should be written against the [`ReadingSource`] trait so that replay data can stand
//! in for the robot.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod live;
mod replay;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::robot_client::RobotLinkError;

pub use live::LiveSource;
pub use replay::ReplaySource;
pub use comms_if::eqpt::robot::NUM_POSE_AXES;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of the first digital input sampled
pub const FIRST_DIN: u32 = 101;

/// Number of digital inputs sampled, `rdi101` to `rdi108`
pub const NUM_DIN: usize = 8;

/// Number of the first digital output sampled
pub const FIRST_DOUT: u32 = 101;

/// Number of digital outputs sampled, `do101` and `do102`
pub const NUM_DOUT: usize = 2;

/// Names of the Cartesian pose axes, in the order they are stored.
pub const POSE_AXIS_NAMES: [&str; NUM_POSE_AXES] = ["X", "Y", "Z", "W", "P", "R"];

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can produce the next snapshot of robot state.
pub trait ReadingSource {
    fn get_next_reading(&mut self) -> Result<Snapshot, ReadingError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One sample of the robot's state.
///
/// Every value is optional so that a missing column or a failed field is distinguishable from a
/// zero reading. Digital values are `0` or `1`.
///
/// Digital channel meanings, where `1` means the condition holds:
///
/// | Field    | Meaning               |
/// |----------|-----------------------|
/// | `rdo`    | Gripper open          |
/// | `rdi101` | Air pressure on       |
/// | `rdi102` | Upper beam present    |
/// | `rdi103` | Lower beam present    |
/// | `rdi104` | Aerostructure present |
/// | `rdi105` | Upper beam stored     |
/// | `rdi106` | Lower beam stored     |
/// | `rdi107` | Aerostructure stored  |
/// | `rdi108` | Blade stored          |
/// | `do101`  | Upper clamp open      |
/// | `do102`  | Lower clamp open      |
///
/// These mappings have not been confirmed against the cell's wiring documentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp recorded alongside the sample, only present for replayed data
    pub timestamp: Option<String>,

    /// Instantaneous power draw in watts
    pub power_w: Option<f64>,

    /// Cartesian pose, `[X, Y, Z, W, P, R]`
    pub pose: [Option<f64>; NUM_POSE_AXES],

    /// Joint angles, `[J1, ..., J6]`
    pub joints: [Option<f64>; NUM_POSE_AXES],

    /// End effector (gripper) digital output
    pub rdo: Option<u8>,

    /// Digital inputs `rdi101` to `rdi108`
    pub rdi: [Option<u8>; NUM_DIN],

    /// Digital outputs `do101` and `do102`
    pub dout: [Option<u8>; NUM_DOUT],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which prevent a source from producing a snapshot.
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("Reading index {index} is out of range, the source only has {len} readings")]
    OutOfRange { index: usize, len: usize },

    #[error("Could not open the replay file {0:?}: {1}")]
    ReplayOpenError(PathBuf, csv::Error),

    #[error("Could not parse row {row} of the replay file: {err}")]
    ReplayParseError { row: usize, err: csv::Error },

    #[error("The replay file {0:?} contains no readings")]
    EmptyReplay(PathBuf),

    #[error("Robot link error: {0}")]
    LinkError(#[from] RobotLinkError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Snapshot {
    /// Get the value of digital input `num`, if it is one of those sampled.
    pub fn din(&self, num: u32) -> Option<u8> {
        num.checked_sub(FIRST_DIN)
            .and_then(|i| self.rdi.get(i as usize).copied())
            .flatten()
    }

    /// Get the value of digital output `num`, if it is one of those sampled.
    pub fn dout(&self, num: u32) -> Option<u8> {
        num.checked_sub(FIRST_DOUT)
            .and_then(|i| self.dout.get(i as usize).copied())
            .flatten()
    }
}

impl<S: ReadingSource + ?Sized> ReadingSource for Box<S> {
    fn get_next_reading(&mut self) -> Result<Snapshot, ReadingError> {
        (**self).get_next_reading()
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a recorded digital value to `0` or `1`. Any non-zero finite value is treated as set,
/// non-finite values (`NaN`, `inf`) as absent.
pub fn digital_from_f64(value: f64) -> Option<u8> {
    if !value.is_finite() {
        None
    } else if value != 0.0 {
        Some(1)
    } else {
        Some(0)
    }
}
