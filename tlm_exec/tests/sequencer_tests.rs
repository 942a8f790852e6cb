//! Pick and place sequencing against a recording robot.

use std::{collections::HashMap, thread, time::Duration};

use comms_if::eqpt::robot::{DoType, MoveType};
use tlm_lib::{
    indices::EnergyTariff,
    params::PickPlaceParams,
    reading::{ReadingError, ReplaySource, Snapshot, NUM_POSE_AXES},
    robot_client::{RobotConnParams, RobotLink, RobotLinkError},
    sequencer::{Sequencer, SequencerError},
};

// ------------------------------------------------------------------------------------------------
// FAKES
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Move(MoveType, [f64; NUM_POSE_AXES], u32, u32),
    Gripper(bool),
}

/// Robot which records every command. Motions take a millisecond so that time passes between
/// energy samples.
#[derive(Default)]
struct RecordingRobot {
    events: Vec<Event>,
    fail_moves: bool,
}

impl RecordingRobot {
    fn num_moves(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Move(..)))
            .count()
    }
}

impl RobotLink for RecordingRobot {
    fn get_ins_power(&mut self) -> Result<f64, RobotLinkError> {
        Ok(0.0)
    }

    fn get_curpos(&mut self) -> Result<[f64; NUM_POSE_AXES], RobotLinkError> {
        Ok([0.0; NUM_POSE_AXES])
    }

    fn get_curjpos(&mut self) -> Result<[f64; NUM_POSE_AXES], RobotLinkError> {
        Ok([0.0; NUM_POSE_AXES])
    }

    fn get_rdo(&mut self, _num: u32) -> Result<u8, RobotLinkError> {
        Ok(0)
    }

    fn get_din(&mut self, _num: u32) -> Result<u8, RobotLinkError> {
        Ok(0)
    }

    fn get_dout(&mut self, _num: u32) -> Result<u8, RobotLinkError> {
        Ok(0)
    }

    fn move_to(
        &mut self,
        move_type: MoveType,
        vals: &[f64; NUM_POSE_AXES],
        velocity: u32,
        acceleration: u32,
    ) -> Result<(), RobotLinkError> {
        if self.fail_moves {
            return Err(RobotLinkError::Disconnected);
        }

        thread::sleep(Duration::from_millis(1));
        self.events
            .push(Event::Move(move_type, *vals, velocity, acceleration));
        Ok(())
    }

    fn gripper(&mut self, open: bool) -> Result<(), RobotLinkError> {
        self.events.push(Event::Gripper(open));
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// HELPERS
// ------------------------------------------------------------------------------------------------

fn conn() -> RobotConnParams {
    RobotConnParams {
        robot_model: "Fanuc".into(),
        host: "127.0.0.1".into(),
        port: 18735,
        ee_do_type: DoType::Rdo,
        ee_do_num: 7,
        io_timeout_ms: None,
    }
}

/// Poses for a part whose every axis is `base + index`, so moves can be told apart.
fn part_poses(base: f64) -> Vec<[f64; NUM_POSE_AXES]> {
    (0..6).map(|i| [base + i as f64; NUM_POSE_AXES]).collect()
}

fn params(order: &[&str], repetitions: u32) -> PickPlaceParams {
    let mut poses = HashMap::new();
    poses.insert("white".to_string(), part_poses(0.0));
    poses.insert("red".to_string(), part_poses(10.0));

    PickPlaceParams {
        tariff: EnergyTariff::new(21.65),
        robot: conn(),
        reader: conn(),
        velocity: 50,
        acceleration: 40,
        repetitions,
        order: order.iter().map(|s| s.to_string()).collect(),
        poses,
    }
}

fn powered_source(power_w: f64) -> ReplaySource {
    let mut s = Snapshot::default();
    s.power_w = Some(power_w);
    ReplaySource::from_readings(vec![s], true)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[test]
fn single_part_sequence_order() {
    let mut seq = Sequencer::new(
        RecordingRobot::default(),
        powered_source(1000.0),
        params(&["white"], 1),
    );

    let report = seq.run().unwrap();

    let p = part_poses(0.0);
    let mv = |i: usize| Event::Move(MoveType::Joint, p[i], 50, 40);
    let expected = vec![
        // Pick from the first station
        mv(0),
        Event::Gripper(true),
        mv(1),
        Event::Gripper(false),
        mv(2),
        // Place at the second
        mv(3),
        mv(4),
        Event::Gripper(true),
        mv(5),
        // Pick from the second station
        mv(3),
        Event::Gripper(true),
        mv(4),
        Event::Gripper(false),
        mv(5),
        // Place back at the first
        mv(0),
        mv(1),
        Event::Gripper(true),
        mv(2),
    ];

    assert_eq!(seq.robot().events, expected);
    assert_eq!(report.num_moves, 12);
    assert!(report.cumulative_cost > 0.0);
}

#[test]
fn repetitions_multiply_moves() {
    let mut seq = Sequencer::new(
        RecordingRobot::default(),
        powered_source(1000.0),
        params(&["white", "red"], 2),
    );

    let report = seq.run().unwrap();

    assert_eq!(report.num_moves, 48);
    assert_eq!(seq.robot().num_moves(), 48);

    let gripper_events = seq
        .robot()
        .events
        .iter()
        .filter(|e| matches!(e, Event::Gripper(_)))
        .count();
    assert_eq!(gripper_events, 24);
}

#[test]
fn unpowered_robot_costs_nothing() {
    let mut seq = Sequencer::new(
        RecordingRobot::default(),
        powered_source(0.0),
        params(&["white"], 1),
    );

    assert_eq!(seq.run().unwrap().cumulative_cost, 0.0);
}

#[test]
fn unknown_part_fails_before_moving() {
    let mut seq = Sequencer::new(
        RecordingRobot::default(),
        powered_source(1000.0),
        params(&["blue"], 1),
    );

    match seq.run() {
        Err(SequencerError::UnknownPart(part)) => assert_eq!(part, "blue"),
        r => panic!("Expected UnknownPart, got {:?}", r.map(|_| ())),
    }
    assert!(seq.robot().events.is_empty());
}

#[test]
fn reading_failure_stops_sequence() {
    let mut seq = Sequencer::new(
        RecordingRobot::default(),
        ReplaySource::from_readings(Vec::new(), false),
        params(&["white"], 1),
    );

    assert!(matches!(
        seq.run(),
        Err(SequencerError::AcquisitionError(ReadingError::OutOfRange { index: 0, len: 0 }))
    ));

    // Only the first pick was performed, the part is left in the closed gripper
    assert_eq!(seq.robot().num_moves(), 3);
    assert_eq!(
        seq.robot().events.last(),
        Some(&Event::Move(MoveType::Joint, [2.0; NUM_POSE_AXES], 50, 40))
    );
    let last_gripper = seq
        .robot()
        .events
        .iter()
        .rev()
        .find(|e| matches!(e, Event::Gripper(_)));
    assert_eq!(last_gripper, Some(&Event::Gripper(false)));
}

#[test]
fn motion_failure_stops_sequence() {
    let robot = RecordingRobot {
        fail_moves: true,
        ..Default::default()
    };
    let mut seq = Sequencer::new(robot, powered_source(1000.0), params(&["white"], 1));

    assert!(matches!(
        seq.run(),
        Err(SequencerError::MotionError(RobotLinkError::Disconnected))
    ));
}
