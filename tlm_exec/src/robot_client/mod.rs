//! # Robot Client
//!
//! This module provides the connection to the robot controller's socket server. The
//! [`RobotLink`] trait captures everything the rest of the software needs from the robot, and
//! [`RobotClient`] implements it over TCP using the protocol defined in
//! [`comms_if::eqpt::robot`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::robot::{
    DoType, MoveType, RobotCmd, RobotProtocolError, RobotResponse, NUM_POSE_AXES,
};
use log::{debug, trace};
use serde::Deserialize;
use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    time::Duration,
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Capabilities of a connection to a robot controller.
pub trait RobotLink {
    /// Instantaneous power draw in watts.
    fn get_ins_power(&mut self) -> Result<f64, RobotLinkError>;

    /// Current Cartesian pose, `[X, Y, Z, W, P, R]`.
    fn get_curpos(&mut self) -> Result<[f64; NUM_POSE_AXES], RobotLinkError>;

    /// Current joint angles, `[J1, ..., J6]`.
    fn get_curjpos(&mut self) -> Result<[f64; NUM_POSE_AXES], RobotLinkError>;

    /// Value of robot digital output `num`.
    fn get_rdo(&mut self, num: u32) -> Result<u8, RobotLinkError>;

    /// Value of digital input `num`.
    fn get_din(&mut self, num: u32) -> Result<u8, RobotLinkError>;

    /// Value of digital output `num`.
    fn get_dout(&mut self, num: u32) -> Result<u8, RobotLinkError>;

    /// Move to the given pose, returning once the controller has accepted the motion.
    fn move_to(
        &mut self,
        move_type: MoveType,
        vals: &[f64; NUM_POSE_AXES],
        velocity: u32,
        acceleration: u32,
    ) -> Result<(), RobotLinkError>;

    /// Open (`true`) or close (`false`) the gripper.
    fn gripper(&mut self, open: bool) -> Result<(), RobotLinkError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters used to connect to a robot controller.
#[derive(Debug, Clone, Deserialize)]
pub struct RobotConnParams {
    /// Robot model identifier, informational only
    pub robot_model: String,

    /// Controller host name or address
    pub host: String,

    /// Controller socket server port
    pub port: u16,

    /// Kind of digital output driving the end effector
    pub ee_do_type: DoType,

    /// Number of the digital output driving the end effector
    pub ee_do_num: u32,

    /// Read and write timeout on the socket in milliseconds. If not given operations block until
    /// they complete.
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
}

/// TCP client for the robot controller socket server.
pub struct RobotClient {
    params: RobotConnParams,

    reader: BufReader<TcpStream>,

    writer: TcpStream,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RobotLinkError {
    #[error("Could not connect to the robot at {0}: {1}")]
    ConnectError(String, std::io::Error),

    #[error("Could not communicate with the robot: {0}")]
    IoError(#[from] std::io::Error),

    #[error("The robot closed the connection")]
    Disconnected,

    #[error("Invalid response from the robot: {0}")]
    ProtocolError(#[from] RobotProtocolError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RobotConnParams {
    /// Address of the controller in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl RobotClient {
    /// Connect to the controller described by `params`.
    pub fn connect(params: &RobotConnParams) -> Result<Self, RobotLinkError> {
        let address = params.address();

        debug!("Connecting to {} controller at {}", params.robot_model, address);

        let stream = TcpStream::connect(&address)
            .map_err(|e| RobotLinkError::ConnectError(address.clone(), e))?;

        let timeout = params.io_timeout_ms.map(Duration::from_millis);
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        stream.set_nodelay(true)?;

        let writer = stream.try_clone()?;

        Ok(Self {
            params: params.clone(),
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Parameters the client was connected with.
    pub fn params(&self) -> &RobotConnParams {
        &self.params
    }

    /// Send a command and wait for its response.
    pub fn send_cmd(&mut self, cmd: &RobotCmd) -> Result<RobotResponse, RobotLinkError> {
        let request = cmd.to_wire();

        trace!("Robot request: {:?}", request);

        self.writer.write_all(request.as_bytes())?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(RobotLinkError::Disconnected);
        }

        trace!("Robot response: {:?}", line);

        Ok(RobotResponse::parse(&line)?)
    }
}

impl RobotLink for RobotClient {
    fn get_ins_power(&mut self) -> Result<f64, RobotLinkError> {
        Ok(self.send_cmd(&RobotCmd::InsPower)?.as_f64()?)
    }

    fn get_curpos(&mut self) -> Result<[f64; NUM_POSE_AXES], RobotLinkError> {
        Ok(self.send_cmd(&RobotCmd::CurPos)?.as_pose()?)
    }

    fn get_curjpos(&mut self) -> Result<[f64; NUM_POSE_AXES], RobotLinkError> {
        Ok(self.send_cmd(&RobotCmd::CurJPos)?.as_pose()?)
    }

    fn get_rdo(&mut self, num: u32) -> Result<u8, RobotLinkError> {
        Ok(self.send_cmd(&RobotCmd::GetRdo(num))?.as_digital()?)
    }

    fn get_din(&mut self, num: u32) -> Result<u8, RobotLinkError> {
        Ok(self.send_cmd(&RobotCmd::GetDin(num))?.as_digital()?)
    }

    fn get_dout(&mut self, num: u32) -> Result<u8, RobotLinkError> {
        Ok(self.send_cmd(&RobotCmd::GetDout(num))?.as_digital()?)
    }

    fn move_to(
        &mut self,
        move_type: MoveType,
        vals: &[f64; NUM_POSE_AXES],
        velocity: u32,
        acceleration: u32,
    ) -> Result<(), RobotLinkError> {
        self.send_cmd(&RobotCmd::Move {
            move_type,
            vals: *vals,
            velocity,
            acceleration,
            cnt_val: 0,
        })?;

        Ok(())
    }

    fn gripper(&mut self, open: bool) -> Result<(), RobotLinkError> {
        let cmd = match self.params.ee_do_type {
            DoType::Rdo => RobotCmd::SetRdo(self.params.ee_do_num, open),
            DoType::Do => RobotCmd::SetDout(self.params.ee_do_num, open),
        };

        self.send_cmd(&cmd)?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{net::TcpListener, thread};

    /// Spawn a controller which answers each request line with the matching scripted response.
    fn spawn_controller(script: Vec<(&'static str, &'static str)>) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let jh = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;

            for (expected, response) in script {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                assert_eq!(line.trim_end(), expected);
                writer.write_all(response.as_bytes()).unwrap();
            }
        });

        (port, jh)
    }

    fn params(port: u16, ee_do_type: DoType) -> RobotConnParams {
        RobotConnParams {
            robot_model: "Fanuc".into(),
            host: "127.0.0.1".into(),
            port,
            ee_do_type,
            ee_do_num: 7,
            io_timeout_ms: Some(2000),
        }
    }

    #[test]
    fn test_queries() {
        let (port, jh) = spawn_controller(vec![
            ("ins_pwr", "0:1250.5\n"),
            ("curpos", "0:x=1,y=2,z=3,w=4,p=5,r=6\n"),
            ("curjpos", "0:10,20,30,40,50,60\n"),
            ("getrdo:7", "0:1\n"),
            ("getdin:101", "0:0\n"),
            ("getdout:102", "0:1\n"),
        ]);

        let mut client = RobotClient::connect(&params(port, DoType::Rdo)).unwrap();

        assert_eq!(client.get_ins_power().unwrap(), 1250.5);
        assert_eq!(client.get_curpos().unwrap(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(client.get_curjpos().unwrap(), [10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        assert_eq!(client.get_rdo(7).unwrap(), 1);
        assert_eq!(client.get_din(101).unwrap(), 0);
        assert_eq!(client.get_dout(102).unwrap(), 1);

        jh.join().unwrap();
    }

    #[test]
    fn test_motion_and_gripper() {
        let (port, jh) = spawn_controller(vec![
            ("movej:50:50:0:1.0000:2.0000:3.0000:4.0000:5.0000:6.0000", "0:\n"),
            ("setdout:7:1", "0:\n"),
        ]);

        let mut client = RobotClient::connect(&params(port, DoType::Do)).unwrap();

        client
            .move_to(MoveType::Joint, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 50, 50)
            .unwrap();
        client.gripper(true).unwrap();

        jh.join().unwrap();
    }

    #[test]
    fn test_controller_error_and_disconnect() {
        let (port, jh) = spawn_controller(vec![("ins_pwr", "3:Not available\n")]);

        let mut client = RobotClient::connect(&params(port, DoType::Rdo)).unwrap();

        assert!(matches!(
            client.get_ins_power(),
            Err(RobotLinkError::ProtocolError(RobotProtocolError::ControllerError { code: 3, .. }))
        ));

        // Controller thread exits and drops the connection
        jh.join().unwrap();

        assert!(matches!(
            client.get_curpos(),
            Err(RobotLinkError::Disconnected) | Err(RobotLinkError::IoError(_))
        ));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop a listener to get a port nothing is listening on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        assert!(matches!(
            RobotClient::connect(&params(port, DoType::Rdo)),
            Err(RobotLinkError::ConnectError(..))
        ));
    }
}
