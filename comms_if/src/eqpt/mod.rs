//! # Equipment interfaces
//!
//! Wire-level definitions for talking to external equipment.

pub mod robot;

pub use robot::{DoType, MoveType, RobotCmd, RobotProtocolError, RobotResponse};
