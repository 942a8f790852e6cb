//! # TLM Server
//!
//! Publishes telemetry packets on a ZMQ PUB socket. Each message has two frames, the topic and the
//! JSON encoded [`TlmPacket`], so subscribers can filter on the topic frame with
//! `set_subscribe()`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Local};
use log::info;
use serde::{Deserialize, Serialize};

use comms_if::net::{tcp_endpoint, zmq, MonitoredSocket, MonitoredSocketError, SocketOptions};
use util::time::format_tlm_timestamp;

use crate::{
    indices::{AccelerationVector, CostRecord, VelocityVector},
    reading::Snapshot,
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Anything telemetry can be published to.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TlmServerError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the telemetry broker connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerParams {
    /// Host of the broker, or the interface to bind to if `bind` is set
    pub host: String,

    /// Port of the broker
    pub port: u16,

    /// Topic telemetry is published on
    pub topic: String,

    /// Identity of this publisher
    pub client_id: String,

    /// Bind the socket rather than connect to a broker
    #[serde(default)]
    pub bind: bool,

    /// Wait for the connection to the broker before returning from [`TlmServer::new`]
    #[serde(default)]
    pub block_on_first_connect: bool,

    /// Send timeout in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: i32,
}

/// Telemetry server
pub struct TlmServer {
    socket: MonitoredSocket,
}

/// Telemetry packet that is output by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlmPacket {
    pub timestamp: String,

    pub velocity: VelocityVector,

    pub acceleration: AccelerationVector,

    pub energy_cost: CostRecord,

    pub rdo: Option<u8>,

    pub rdi101: Option<u8>,
    pub rdi102: Option<u8>,
    pub rdi103: Option<u8>,
    pub rdi104: Option<u8>,
    pub rdi105: Option<u8>,
    pub rdi106: Option<u8>,
    pub rdi107: Option<u8>,
    pub rdi108: Option<u8>,

    pub do101: Option<u8>,
    pub do102: Option<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TlmServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send telemetry: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TlmServer {
    /// Create a new instance of the TLM Server.
    ///
    /// Unless `block_on_first_connect` is set this function will not wait for the broker.
    pub fn new(ctx: &zmq::Context, params: &BrokerParams) -> Result<Self, TlmServerError> {
        let socket_options = SocketOptions {
            bind: params.bind,
            block_on_first_connect: params.block_on_first_connect && !params.bind,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            send_timeout: params.send_timeout_ms,
            identity: Some(params.client_id.clone()),
            ..Default::default()
        };

        let endpoint = tcp_endpoint(&params.host, params.port);

        let socket = MonitoredSocket::new(ctx, zmq::PUB, socket_options, &endpoint)
            .map_err(TlmServerError::SocketError)?;

        info!(
            "TlmServer {} on {} as {:?}",
            if params.bind { "bound" } else { "connecting" },
            endpoint,
            params.client_id
        );

        Ok(Self { socket })
    }

    /// True if the socket has a connected peer.
    pub fn is_connected(&self) -> bool {
        self.socket.connected()
    }
}

impl Publisher for TlmServer {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TlmServerError> {
        self.socket
            .send_multipart(vec![topic.as_bytes(), payload.as_bytes()], 0)
            .map_err(TlmServerError::SendError)
    }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TlmServerError> {
        (**self).publish(topic, payload)
    }
}

impl TlmPacket {
    /// Build a packet from the current snapshot and the metrics derived from it.
    pub fn new(
        timestamp: &DateTime<Local>,
        snapshot: &Snapshot,
        velocity: VelocityVector,
        acceleration: AccelerationVector,
        energy_cost: CostRecord,
    ) -> Self {
        Self {
            timestamp: format_tlm_timestamp(timestamp),
            velocity,
            acceleration,
            energy_cost,
            rdo: snapshot.rdo,
            rdi101: snapshot.rdi[0],
            rdi102: snapshot.rdi[1],
            rdi103: snapshot.rdi[2],
            rdi104: snapshot.rdi[3],
            rdi105: snapshot.rdi[4],
            rdi106: snapshot.rdi[5],
            rdi107: snapshot.rdi[6],
            rdi108: snapshot.rdi[7],
            do101: snapshot.dout[0],
            do102: snapshot.dout[1],
        }
    }

    /// Serialize the packet to the JSON sent on the wire.
    pub fn to_json(&self) -> Result<String, TlmServerError> {
        serde_json::to_string(self).map_err(TlmServerError::SerializationError)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_send_timeout_ms() -> i32 {
    1000
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    #[test]
    fn test_packet_wire_format() {
        let mut snapshot = Snapshot::default();
        snapshot.rdo = Some(1);
        snapshot.rdi[2] = Some(1);
        snapshot.dout = [Some(0), Some(1)];

        let packet = TlmPacket::new(
            &Local.ymd(2024, 1, 15).and_hms(13, 45, 0),
            &snapshot,
            VelocityVector::from_axes([Some(5.0), None, None, None, None, None]),
            AccelerationVector::undefined(),
            CostRecord {
                cost: 0.2165,
                energy: 1.0,
                cumulative_cost: 0.2165,
            },
        );

        let value: Value = serde_json::from_str(&packet.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "timestamp": "2024-01-15 13:45:00",
                "velocity": {"vx": 5.0, "vy": null, "vz": null, "vw": null, "vp": null, "vr": null},
                "acceleration": {"ax": null, "ay": null, "az": null, "aw": null, "ap": null, "ar": null},
                "energy_cost": {"cost": 0.2165, "energy": 1.0, "cummulative_cost": 0.2165},
                "rdo": 1,
                "rdi101": null,
                "rdi102": null,
                "rdi103": 1,
                "rdi104": null,
                "rdi105": null,
                "rdi106": null,
                "rdi107": null,
                "rdi108": null,
                "do101": 0,
                "do102": 1
            })
        );
    }

    #[test]
    fn test_publish_to_subscriber() {
        let ctx = zmq::Context::new();

        // Find a free port for the publisher to bind to
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let params = BrokerParams {
            host: "127.0.0.1".into(),
            port,
            topic: "robot/tlm".into(),
            client_id: "test_publisher".into(),
            bind: true,
            block_on_first_connect: false,
            send_timeout_ms: 100,
        };
        let mut server = TlmServer::new(&ctx, &params).unwrap();

        let sub = ctx.socket(zmq::SUB).unwrap();
        sub.set_rcvtimeo(100).unwrap();
        sub.set_subscribe(params.topic.as_bytes()).unwrap();
        sub.connect(&tcp_endpoint("127.0.0.1", port)).unwrap();

        // PUB/SUB drops messages until the subscription has propagated, so keep publishing until
        // one arrives.
        let mut received = None;
        for _ in 0..50 {
            server.publish(&params.topic, "{\"hello\":1}").unwrap();
            if let Ok(frames) = sub.recv_multipart(0) {
                received = Some(frames);
                break;
            }
        }

        let frames = received.expect("No telemetry received");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], b"robot/tlm".to_vec());
        assert_eq!(frames[1], b"{\"hello\":1}".to_vec());
    }
}
