//! # Telemetry Loop
//!
//! Acquires a snapshot from a [`ReadingSource`], derives velocity, acceleration and energy cost
//! from it and publishes the result, once per tick.
//!
//! The first tick only records the snapshot, since there is nothing to differentiate against yet.
//! Every following tick publishes a packet. The loop carries three pieces of state between ticks:
//! the previous snapshot, the previous velocity and the cumulative energy cost.
//!
//! Errors are split by kind so the caller can see whether acquisition, computation or publication
//! failed. By default any error stops the loop. Acquisition and publication can optionally be
//! retried a bounded number of times; computation errors never are.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Local};
use log::{debug, info, trace, warn};
use serde::Deserialize;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    indices::{self, ComputationError, EnergyTariff, VelocityVector},
    reading::{ReadingError, ReadingSource, Snapshot},
    tlm_server::{Publisher, TlmPacket, TlmServerError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the telemetry loop.
#[derive(Debug, Clone, Deserialize)]
pub struct TlmLoopParams {
    /// Target period of one tick
    pub tick_period_s: f64,

    /// Stop after this many ticks. If not given the loop runs until stopped.
    #[serde(default)]
    pub max_ticks: Option<u64>,

    /// Number of times a failed acquisition is retried before the loop stops
    #[serde(default)]
    pub acquire_retries: u32,

    /// Number of times a failed publication is retried before the loop stops
    #[serde(default)]
    pub publish_retries: u32,

    /// Delay between retries
    #[serde(default)]
    pub retry_delay_s: f64,
}

/// Shared flag used to stop a running loop from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

/// State carried between ticks.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub previous_snapshot: Option<Snapshot>,

    pub previous_velocity: Option<VelocityVector>,

    pub cumulative_cost: f64,

    /// Instant the previous snapshot was acquired
    pub previous_instant: Option<Instant>,
}

/// The telemetry loop.
pub struct TlmLoop<S, P> {
    source: S,

    publisher: P,

    topic: String,

    tariff: EnergyTariff,

    params: TlmLoopParams,

    state: LoopState,

    stop: StopHandle,

    num_ticks: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Phase of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// No snapshot has been acquired yet
    WaitingFirstSample,

    /// A previous snapshot exists, every tick publishes
    Steady,
}

/// Result of a single successful tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// First sample stored, nothing published
    Bootstrap,

    /// Metrics were computed and this packet was published
    Published(TlmPacket),
}

#[derive(Debug, thiserror::Error)]
pub enum TlmLoopError {
    #[error("Could not acquire a reading: {0}")]
    AcquisitionError(ReadingError),

    #[error("Could not compute metrics: {0}")]
    ComputationError(ComputationError),

    #[error("Could not publish telemetry: {0}")]
    PublishError(TlmServerError),

    #[error("Invalid loop parameter {0}: {1}")]
    InvalidParams(&'static str, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the loop stops at the next tick boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl TlmLoopParams {
    /// Check the timing parameters. The tick period must be positive and the retry delay not
    /// negative, both finite and representable as a [`Duration`].
    pub fn are_valid(&self) -> Result<(), TlmLoopError> {
        if !(is_duration(self.tick_period_s) && self.tick_period_s > 0.0) {
            return Err(TlmLoopError::InvalidParams(
                "tick_period_s",
                self.tick_period_s,
            ));
        }
        if !is_duration(self.retry_delay_s) {
            return Err(TlmLoopError::InvalidParams(
                "retry_delay_s",
                self.retry_delay_s,
            ));
        }

        Ok(())
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_s)
    }
}

impl<S, P> TlmLoop<S, P>
where
    S: ReadingSource,
    P: Publisher,
{
    pub fn new(
        source: S,
        publisher: P,
        topic: &str,
        tariff: EnergyTariff,
        params: TlmLoopParams,
    ) -> Self {
        Self {
            source,
            publisher,
            topic: topic.to_string(),
            tariff,
            params,
            state: LoopState::default(),
            stop: StopHandle::new(),
            num_ticks: 0,
        }
    }

    /// Use an existing stop handle, so the loop can be stopped by whoever already holds it.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Get a handle which can stop the loop.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        match self.state.previous_snapshot {
            None => LoopPhase::WaitingFirstSample,
            Some(_) => LoopPhase::Steady,
        }
    }

    /// Number of ticks completed so far
    pub fn num_ticks(&self) -> u64 {
        self.num_ticks
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run ticks until stopped, `max_ticks` is reached, or an error occurs.
    pub fn run(&mut self) -> Result<(), TlmLoopError> {
        self.params.are_valid()?;

        let period = Duration::from_secs_f64(self.params.tick_period_s);

        info!(
            "Telemetry loop starting, publishing on {:?} every {:.3} s",
            self.topic, self.params.tick_period_s
        );

        while !self.should_stop() {
            let tick_start = Instant::now();

            self.tick()?;

            if self.should_stop() {
                break;
            }

            let tick_dur = tick_start.elapsed();
            match period.checked_sub(tick_dur) {
                Some(d) => thread::sleep(d),
                None => warn!(
                    "Tick overran by {:.06} s",
                    tick_dur.as_secs_f64() - period.as_secs_f64()
                ),
            }
        }

        info!(
            "Telemetry loop stopped after {} ticks, cumulative cost {:.6}",
            self.num_ticks, self.state.cumulative_cost
        );

        Ok(())
    }

    /// Perform one tick now.
    pub fn tick(&mut self) -> Result<TickOutcome, TlmLoopError> {
        self.tick_at(Instant::now(), Local::now())
    }

    /// Perform one tick, treating `now` as the acquisition instant and `timestamp` as the wall
    /// clock time reported in the packet.
    ///
    /// State is only updated if the whole tick succeeds.
    pub fn tick_at(
        &mut self,
        now: Instant,
        timestamp: DateTime<Local>,
    ) -> Result<TickOutcome, TlmLoopError> {
        self.params.are_valid()?;

        let snapshot = self.acquire()?;

        trace!("Acquired snapshot: {:?}", snapshot);

        let (prev_snapshot, prev_instant) =
            match (&self.state.previous_snapshot, self.state.previous_instant) {
                (Some(s), Some(i)) => (s, i),
                _ => {
                    debug!("First sample acquired, nothing to publish yet");
                    self.state.previous_snapshot = Some(snapshot);
                    self.state.previous_instant = Some(now);
                    self.num_ticks += 1;
                    return Ok(TickOutcome::Bootstrap);
                }
            };

        let dt_s = now.saturating_duration_since(prev_instant).as_secs_f64();

        let velocity = indices::compute_velocity(prev_snapshot, &snapshot, dt_s)
            .map_err(TlmLoopError::ComputationError)?;
        let acceleration = indices::compute_acceleration(
            self.state.previous_velocity.as_ref(),
            &velocity,
            dt_s,
        )
        .map_err(TlmLoopError::ComputationError)?;
        let energy_cost = indices::compute_energy_cost(
            &snapshot,
            self.state.cumulative_cost,
            dt_s,
            &self.tariff,
        )
        .map_err(TlmLoopError::ComputationError)?;

        debug!(
            "X = {:?}, Y = {:?}, Z = {:?}",
            snapshot.pose[0], snapshot.pose[1], snapshot.pose[2]
        );
        debug!("Velocity: {:?}", velocity);
        debug!("Acceleration: {:?}", acceleration);
        debug!("Energy cost: {:?}", energy_cost);

        let packet = TlmPacket::new(&timestamp, &snapshot, velocity, acceleration, energy_cost);
        let payload = packet.to_json().map_err(TlmLoopError::PublishError)?;

        self.publish(&payload)?;

        trace!("Published: {}", payload);

        self.state.previous_snapshot = Some(snapshot);
        self.state.previous_velocity = Some(velocity);
        self.state.previous_instant = Some(now);
        self.state.cumulative_cost = energy_cost.cumulative_cost;
        self.num_ticks += 1;

        Ok(TickOutcome::Published(packet))
    }

    fn should_stop(&self) -> bool {
        if self.stop.is_stopped() {
            return true;
        }

        match self.params.max_ticks {
            Some(max) => self.num_ticks >= max,
            None => false,
        }
    }

    fn acquire(&mut self) -> Result<Snapshot, TlmLoopError> {
        let mut attempt = 0;

        loop {
            match self.source.get_next_reading() {
                Ok(s) => return Ok(s),
                Err(e) if attempt < self.params.acquire_retries => {
                    attempt += 1;
                    warn!(
                        "Acquisition failed ({}), retry {} of {}",
                        e, attempt, self.params.acquire_retries
                    );
                    thread::sleep(self.params.retry_delay());
                }
                Err(e) => return Err(TlmLoopError::AcquisitionError(e)),
            }
        }
    }

    fn publish(&mut self, payload: &str) -> Result<(), TlmLoopError> {
        let mut attempt = 0;

        loop {
            match self.publisher.publish(&self.topic, payload) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.params.publish_retries => {
                    attempt += 1;
                    warn!(
                        "Publish failed ({}), retry {} of {}",
                        e, attempt, self.params.publish_retries
                    );
                    thread::sleep(self.params.retry_delay());
                }
                Err(e) => return Err(TlmLoopError::PublishError(e)),
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn is_duration(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0 && secs < u64::MAX as f64
}
