//! # Pick and Place Sequencer
//!
//! Moves parts between two stations. Each part has six joint poses: approach, grasp and retreat at
//! the first station followed by the same at the second. The sequence moves every part from the
//! first station to the second, sampling the robot's power draw after each pick to account for
//! the energy used, and then moves every part back again.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::robot::MoveType;
use log::{debug, info};
use std::time::Instant;

use crate::{
    indices::{self, ComputationError, EnergyTariff},
    params::PickPlaceParams,
    reading::{ReadingError, ReadingSource, NUM_POSE_AXES},
    robot_client::{RobotLink, RobotLinkError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Drives the pick and place sequence.
pub struct Sequencer<L, S> {
    robot: L,

    source: S,

    params: PickPlaceParams,

    cumulative_cost: f64,

    last_sample: Option<Instant>,

    num_moves: u64,
}

/// Summary of a completed sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceReport {
    /// Number of motion commands issued
    pub num_moves: u64,

    /// Total energy cost accounted for, in major currency units
    pub cumulative_cost: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("Robot motion failed: {0}")]
    MotionError(RobotLinkError),

    #[error("Could not acquire a reading: {0}")]
    AcquisitionError(ReadingError),

    #[error("Could not compute energy cost: {0}")]
    ComputationError(ComputationError),

    #[error("No poses are defined for part {0:?}")]
    UnknownPart(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<L, S> Sequencer<L, S>
where
    L: RobotLink,
    S: ReadingSource,
{
    /// Create a new sequencer. The parameters are expected to have been validated.
    pub fn new(robot: L, source: S, params: PickPlaceParams) -> Self {
        Self {
            robot,
            source,
            params,
            cumulative_cost: 0.0,
            last_sample: None,
            num_moves: 0,
        }
    }

    /// Run the full sequence the configured number of times.
    ///
    /// Any error stops the sequence immediately. The robot is left where it was, possibly
    /// mid-sequence with a part still held in the gripper.
    pub fn run(&mut self) -> Result<SequenceReport, SequencerError> {
        self.last_sample = Some(Instant::now());

        let order = self.params.order.clone();

        for rep in 0..self.params.repetitions {
            info!("Starting repetition {} of {}", rep + 1, self.params.repetitions);

            for part in &order {
                info!("Moving {} to the second station", part);
                let poses = self.poses(part)?;

                self.pick(&poses[0], &poses[1], &poses[2])?;
                self.account_energy()?;
                self.place(&poses[3], &poses[4], &poses[5])?;
            }

            for part in &order {
                info!("Returning {} to the first station", part);
                let poses = self.poses(part)?;

                self.pick(&poses[3], &poses[4], &poses[5])?;
                let reading = self
                    .source
                    .get_next_reading()
                    .map_err(SequencerError::AcquisitionError)?;
                debug!("Reading after pick: {:?}", reading);
                self.place(&poses[0], &poses[1], &poses[2])?;
            }
        }

        info!(
            "Sequence complete, {} moves, cost {:.6}",
            self.num_moves, self.cumulative_cost
        );

        Ok(SequenceReport {
            num_moves: self.num_moves,
            cumulative_cost: self.cumulative_cost,
        })
    }

    /// Access the robot link.
    pub fn robot(&self) -> &L {
        &self.robot
    }

    fn poses(&self, part: &str) -> Result<Vec<[f64; NUM_POSE_AXES]>, SequencerError> {
        self.params
            .poses
            .get(part)
            .cloned()
            .ok_or_else(|| SequencerError::UnknownPart(part.to_string()))
    }

    /// Approach, open the gripper, descend, close the gripper and retreat.
    fn pick(
        &mut self,
        approach: &[f64; NUM_POSE_AXES],
        grasp: &[f64; NUM_POSE_AXES],
        retreat: &[f64; NUM_POSE_AXES],
    ) -> Result<(), SequencerError> {
        self.move_joint(approach)?;
        self.gripper(true)?;
        self.move_joint(grasp)?;
        self.gripper(false)?;
        self.move_joint(retreat)
    }

    /// Approach, descend, release and retreat.
    fn place(
        &mut self,
        approach: &[f64; NUM_POSE_AXES],
        release: &[f64; NUM_POSE_AXES],
        retreat: &[f64; NUM_POSE_AXES],
    ) -> Result<(), SequencerError> {
        self.move_joint(approach)?;
        self.move_joint(release)?;
        self.gripper(true)?;
        self.move_joint(retreat)
    }

    fn move_joint(&mut self, vals: &[f64; NUM_POSE_AXES]) -> Result<(), SequencerError> {
        self.robot
            .move_to(
                MoveType::Joint,
                vals,
                self.params.velocity,
                self.params.acceleration,
            )
            .map_err(SequencerError::MotionError)?;
        self.num_moves += 1;
        Ok(())
    }

    fn gripper(&mut self, open: bool) -> Result<(), SequencerError> {
        self.robot
            .gripper(open)
            .map_err(SequencerError::MotionError)
    }

    /// Sample the robot and add the energy used since the last sample.
    fn account_energy(&mut self) -> Result<(), SequencerError> {
        let reading = self
            .source
            .get_next_reading()
            .map_err(SequencerError::AcquisitionError)?;

        let now = Instant::now();
        let dt_s = self
            .last_sample
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);

        let cost = indices::compute_energy_cost(
            &reading,
            self.cumulative_cost,
            dt_s,
            &self.params.tariff,
        )
        .map_err(SequencerError::ComputationError)?;

        self.cumulative_cost = cost.cumulative_cost;
        self.last_sample = Some(now);

        info!("Energy cost: {:?}", cost);

        Ok(())
    }
}
