//! # Live Source
//!
//! Builds snapshots by querying the robot controller field by field. Queries are made in series
//! on the calling thread and any failure fails the whole reading; retrying is left to the caller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::robot::DoType;
use log::{debug, info};

use super::{
    ReadingError, ReadingSource, Snapshot, FIRST_DIN, FIRST_DOUT, NUM_DIN, NUM_DOUT, NUM_POSE_AXES,
};
use crate::robot_client::{RobotClient, RobotConnParams, RobotLink};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A reading source backed by a live robot link.
pub struct LiveSource<L> {
    link: L,

    ee_do_type: DoType,

    ee_do_num: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LiveSource<RobotClient> {
    /// Connect to the robot controller and create a source reading from it.
    pub fn connect(params: &RobotConnParams) -> Result<Self, ReadingError> {
        let client = RobotClient::connect(params)?;

        info!(
            "Live source connected to {} controller at {}",
            params.robot_model,
            params.address()
        );

        Ok(Self::new(client, params.ee_do_type, params.ee_do_num))
    }
}

impl<L: RobotLink> LiveSource<L> {
    /// Create a source over an existing link.
    ///
    /// The end effector state is read from output `ee_do_num` of the given type.
    pub fn new(link: L, ee_do_type: DoType, ee_do_num: u32) -> Self {
        Self {
            link,
            ee_do_type,
            ee_do_num,
        }
    }

    /// Access the underlying link.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L: RobotLink> ReadingSource for LiveSource<L> {
    fn get_next_reading(&mut self) -> Result<Snapshot, ReadingError> {
        let power_w = self.link.get_ins_power()?;
        let curpos = self.link.get_curpos()?;
        let curjpos = self.link.get_curjpos()?;
        let rdo = match self.ee_do_type {
            DoType::Rdo => self.link.get_rdo(self.ee_do_num)?,
            DoType::Do => self.link.get_dout(self.ee_do_num)?,
        };

        let mut rdi = [None; NUM_DIN];
        for (i, value) in rdi.iter_mut().enumerate() {
            *value = Some(self.link.get_din(FIRST_DIN + i as u32)?);
        }

        let mut dout = [None; NUM_DOUT];
        for (i, value) in dout.iter_mut().enumerate() {
            *value = Some(self.link.get_dout(FIRST_DOUT + i as u32)?);
        }

        debug!("Current position: {:?}", curpos);

        Ok(Snapshot {
            timestamp: None,
            power_w: Some(power_w),
            pose: wrap_axes(curpos),
            joints: wrap_axes(curjpos),
            rdo: Some(rdo),
            rdi,
            dout,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn wrap_axes(vals: [f64; NUM_POSE_AXES]) -> [Option<f64>; NUM_POSE_AXES] {
    let mut out = [None; NUM_POSE_AXES];
    for (o, v) in out.iter_mut().zip(vals.iter()) {
        *o = Some(*v);
    }
    out
}
