//! # Robot Controller Equipment Commands
//!
//! The robot controller runs a small socket server which accepts newline-terminated text requests
//! of the form `cmd[:arg...]` and answers each with a single `code:message` line. A code of `0`
//! indicates success, anything else is an error reported by the controller, in which case the
//! message describes the fault.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of axes in a Cartesian or joint pose.
pub const NUM_POSE_AXES: usize = 6;

/// Response code indicating success.
pub const RESPONSE_OK: i32 = 0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A response line returned by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotResponse {
    pub code: i32,
    pub msg: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Type of motion to perform.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MoveType {
    /// Values are joint angles in degrees
    Joint,

    /// Values are a Cartesian pose, `[X, Y, Z, W, P, R]`
    Linear,
}

/// Kind of digital output the end effector is wired to.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum DoType {
    /// Robot digital output
    #[serde(rename = "RDO")]
    Rdo,

    /// Standard digital output
    #[serde(rename = "DO")]
    Do,
}

/// Requests that can be sent to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotCmd {
    /// Instantaneous power draw in watts
    InsPower,

    /// Current Cartesian pose
    CurPos,

    /// Current joint pose
    CurJPos,

    /// Read a robot digital output
    GetRdo(u32),

    /// Read a digital input
    GetDin(u32),

    /// Read a digital output
    GetDout(u32),

    /// Set a robot digital output
    SetRdo(u32, bool),

    /// Set a digital output
    SetDout(u32, bool),

    /// Move to the given pose
    Move {
        move_type: MoveType,
        vals: [f64; NUM_POSE_AXES],
        velocity: u32,
        acceleration: u32,
        cnt_val: u32,
    },
}

/// Errors which can occur while decoding controller responses.
#[derive(Debug, Error, PartialEq)]
pub enum RobotProtocolError {
    #[error("Response is missing the `code:message` separator: {0:?}")]
    MissingSeparator(String),

    #[error("Response code {0:?} is not an integer")]
    InvalidCode(String),

    #[error("Controller reported error code {code}: {msg}")]
    ControllerError { code: i32, msg: String },

    #[error("Expected {expected} pose values, found {found}")]
    WrongAxisCount { expected: usize, found: usize },

    #[error("Could not parse value {0:?} as a number")]
    InvalidNumber(String),

    #[error("Expected a digital value of 0 or 1, found {0:?}")]
    InvalidDigital(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RobotCmd {
    /// Encode the request as a single line, including the trailing newline.
    pub fn to_wire(&self) -> String {
        let body = match self {
            RobotCmd::InsPower => "ins_pwr".to_string(),
            RobotCmd::CurPos => "curpos".to_string(),
            RobotCmd::CurJPos => "curjpos".to_string(),
            RobotCmd::GetRdo(n) => format!("getrdo:{}", n),
            RobotCmd::GetDin(n) => format!("getdin:{}", n),
            RobotCmd::GetDout(n) => format!("getdout:{}", n),
            RobotCmd::SetRdo(n, v) => format!("setrdo:{}:{}", n, bool_to_wire(*v)),
            RobotCmd::SetDout(n, v) => format!("setdout:{}:{}", n, bool_to_wire(*v)),
            RobotCmd::Move {
                move_type,
                vals,
                velocity,
                acceleration,
                cnt_val,
            } => {
                let cmd = match move_type {
                    MoveType::Joint => "movej",
                    MoveType::Linear => "movel",
                };
                let vals_str: Vec<String> = vals.iter().map(|v| format!("{:.4}", v)).collect();
                format!(
                    "{}:{}:{}:{}:{}",
                    cmd,
                    velocity,
                    acceleration,
                    cnt_val,
                    vals_str.join(":")
                )
            }
        };

        format!("{}\n", body)
    }
}

impl RobotResponse {
    /// Parse a response line, returning an error if the controller reported a failure.
    pub fn parse(line: &str) -> Result<Self, RobotProtocolError> {
        let line = line.trim();

        let (code_str, msg) = match line.find(':') {
            Some(i) => (&line[..i], &line[i + 1..]),
            None => return Err(RobotProtocolError::MissingSeparator(line.to_string())),
        };

        let code: i32 = code_str
            .trim()
            .parse()
            .map_err(|_| RobotProtocolError::InvalidCode(code_str.to_string()))?;

        if code != RESPONSE_OK {
            return Err(RobotProtocolError::ControllerError {
                code,
                msg: msg.to_string(),
            });
        }

        Ok(Self {
            code,
            msg: msg.trim().to_string(),
        })
    }

    /// Interpret the message as a single number.
    pub fn as_f64(&self) -> Result<f64, RobotProtocolError> {
        parse_number(&self.msg)
    }

    /// Interpret the message as a digital value, either `0` or `1`.
    pub fn as_digital(&self) -> Result<u8, RobotProtocolError> {
        match parse_number(&self.msg) {
            Ok(v) if v == 0.0 => Ok(0),
            Ok(v) if v == 1.0 => Ok(1),
            _ => Err(RobotProtocolError::InvalidDigital(self.msg.clone())),
        }
    }

    /// Interpret the message as a six axis pose.
    ///
    /// Values are comma separated and may be labelled, e.g. `x=1.0,y=2.0,...` or `1.0,2.0,...`.
    /// Empty entries (from a trailing comma) are ignored.
    pub fn as_pose(&self) -> Result<[f64; NUM_POSE_AXES], RobotProtocolError> {
        let vals = self
            .msg
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.rfind('=') {
                Some(i) => parse_number(&s[i + 1..]),
                None => parse_number(s),
            })
            .collect::<Result<Vec<f64>, _>>()?;

        if vals.len() != NUM_POSE_AXES {
            return Err(RobotProtocolError::WrongAxisCount {
                expected: NUM_POSE_AXES,
                found: vals.len(),
            });
        }

        let mut pose = [0.0; NUM_POSE_AXES];
        pose.copy_from_slice(&vals);
        Ok(pose)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn bool_to_wire(value: bool) -> u8 {
    if value {
        1
    } else {
        0
    }
}

fn parse_number(s: &str) -> Result<f64, RobotProtocolError> {
    s.trim()
        .parse()
        .map_err(|_| RobotProtocolError::InvalidNumber(s.to_string()))
}
