//! # Robot Indices
//!
//! Kinematic and cost metrics derived from pairs of [`Snapshot`]s. Every function here is pure:
//! the same inputs always give the same outputs, and any state carried between calls (previous
//! velocity, cumulative cost) is owned by the caller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reading::{Snapshot, NUM_POSE_AXES};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Watts in a kilowatt
const W_PER_KW: f64 = 1000.0;

/// Seconds in an hour
const S_PER_HOUR: f64 = 3600.0;

/// Minor currency units (pence) per major unit (pounds)
const MINOR_PER_MAJOR: f64 = 100.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Rate of change of each Cartesian pose axis, in pose units per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityVector {
    pub vx: Option<f64>,
    pub vy: Option<f64>,
    pub vz: Option<f64>,
    pub vw: Option<f64>,
    pub vp: Option<f64>,
    pub vr: Option<f64>,
}

/// Rate of change of each [`VelocityVector`] component.
///
/// Every component is `None` when there is no previous velocity to differentiate against, meaning
/// "undefined" rather than zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationVector {
    pub ax: Option<f64>,
    pub ay: Option<f64>,
    pub az: Option<f64>,
    pub aw: Option<f64>,
    pub ap: Option<f64>,
    pub ar: Option<f64>,
}

/// Energy used and its cost over one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Cost of this interval in major currency units
    pub cost: f64,

    /// Energy used in this interval in kWh
    pub energy: f64,

    /// Running total cost including this interval.
    ///
    /// Serialized as `cummulative_cost`, which existing subscribers depend on.
    #[serde(rename = "cummulative_cost")]
    pub cumulative_cost: f64,
}

/// Price of electrical energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyTariff {
    /// Unit rate in minor currency units per kWh, e.g. pence per kWh
    pub unit_rate_minor_per_kwh: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ComputationError {
    #[error("Time interval must be finite and greater than zero, got {0} s")]
    InvalidInterval(f64),

    #[error("The snapshot contains no power reading")]
    MissingPower,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VelocityVector {
    pub fn from_axes(axes: [Option<f64>; NUM_POSE_AXES]) -> Self {
        Self {
            vx: axes[0],
            vy: axes[1],
            vz: axes[2],
            vw: axes[3],
            vp: axes[4],
            vr: axes[5],
        }
    }

    pub fn axes(&self) -> [Option<f64>; NUM_POSE_AXES] {
        [self.vx, self.vy, self.vz, self.vw, self.vp, self.vr]
    }
}

impl AccelerationVector {
    /// An acceleration with every component undefined.
    pub fn undefined() -> Self {
        Self::default()
    }

    pub fn from_axes(axes: [Option<f64>; NUM_POSE_AXES]) -> Self {
        Self {
            ax: axes[0],
            ay: axes[1],
            az: axes[2],
            aw: axes[3],
            ap: axes[4],
            ar: axes[5],
        }
    }

    pub fn axes(&self) -> [Option<f64>; NUM_POSE_AXES] {
        [self.ax, self.ay, self.az, self.aw, self.ap, self.ar]
    }

    /// True if no component is defined.
    pub fn is_undefined(&self) -> bool {
        self.axes().iter().all(Option::is_none)
    }
}

impl EnergyTariff {
    pub fn new(unit_rate_minor_per_kwh: f64) -> Self {
        Self {
            unit_rate_minor_per_kwh,
        }
    }

    /// Cost of the given energy in major currency units.
    pub fn cost_of(&self, energy_kwh: f64) -> f64 {
        energy_kwh * self.unit_rate_minor_per_kwh / MINOR_PER_MAJOR
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Compute the velocity of each pose axis between two snapshots `dt_s` seconds apart.
///
/// An axis missing from either snapshot gives a `None` component.
pub fn compute_velocity(
    prev: &Snapshot,
    curr: &Snapshot,
    dt_s: f64,
) -> Result<VelocityVector, ComputationError> {
    check_interval(dt_s)?;

    Ok(VelocityVector::from_axes(rates(&prev.pose, &curr.pose, dt_s)))
}

/// Compute the acceleration between two velocities `dt_s` seconds apart.
///
/// If there is no previous velocity the result is entirely undefined, whatever `dt_s` is.
pub fn compute_acceleration(
    prev_vel: Option<&VelocityVector>,
    curr_vel: &VelocityVector,
    dt_s: f64,
) -> Result<AccelerationVector, ComputationError> {
    let prev_vel = match prev_vel {
        Some(v) => v,
        None => return Ok(AccelerationVector::undefined()),
    };

    check_interval(dt_s)?;

    Ok(AccelerationVector::from_axes(rates(
        &prev_vel.axes(),
        &curr_vel.axes(),
        dt_s,
    )))
}

/// Compute the energy used over the last `dt_s` seconds at the snapshot's power draw, and its
/// cost under the given tariff.
pub fn compute_energy_cost(
    curr: &Snapshot,
    prev_cumulative_cost: f64,
    dt_s: f64,
    tariff: &EnergyTariff,
) -> Result<CostRecord, ComputationError> {
    check_interval(dt_s)?;

    let power_w = curr.power_w.ok_or(ComputationError::MissingPower)?;

    let energy = power_w / W_PER_KW * dt_s / S_PER_HOUR;
    let cost = tariff.cost_of(energy);

    Ok(CostRecord {
        cost,
        energy,
        cumulative_cost: prev_cumulative_cost + cost,
    })
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_interval(dt_s: f64) -> Result<(), ComputationError> {
    if dt_s.is_finite() && dt_s > 0.0 {
        Ok(())
    } else {
        Err(ComputationError::InvalidInterval(dt_s))
    }
}

fn rates(
    prev: &[Option<f64>; NUM_POSE_AXES],
    curr: &[Option<f64>; NUM_POSE_AXES],
    dt_s: f64,
) -> [Option<f64>; NUM_POSE_AXES] {
    let mut out = [None; NUM_POSE_AXES];

    for i in 0..NUM_POSE_AXES {
        out[i] = match (prev[i], curr[i]) {
            (Some(p), Some(c)) => Some((c - p) / dt_s),
            _ => None,
        };
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-12;

    fn snapshot_at(pose: [f64; NUM_POSE_AXES], power_w: f64) -> Snapshot {
        let mut s = Snapshot::default();
        s.power_w = Some(power_w);
        for i in 0..NUM_POSE_AXES {
            s.pose[i] = Some(pose[i]);
        }
        s
    }

    #[test]
    fn test_velocity() {
        let a = snapshot_at([0.0, 1.0, 2.0, 90.0, 0.0, -45.0], 0.0);
        let b = snapshot_at([10.0, 1.0, -2.0, 80.0, 4.0, -45.0], 0.0);

        let v = compute_velocity(&a, &b, 2.0).unwrap();
        assert_eq!(v.vx, Some(5.0));
        assert_eq!(v.vy, Some(0.0));
        assert_eq!(v.vz, Some(-2.0));
        assert_eq!(v.vw, Some(-5.0));
        assert_eq!(v.vp, Some(2.0));
        assert_eq!(v.vr, Some(0.0));
    }

    #[test]
    fn test_velocity_antisymmetric() {
        let a = snapshot_at([1.5, -3.25, 400.0, 179.9, -0.1, 12.0], 0.0);
        let b = snapshot_at([-7.0, 2.0, 380.5, -179.9, 0.3, 11.0], 0.0);

        for &dt in &[0.001, 0.5, 1.0, 3.7] {
            let ab = compute_velocity(&a, &b, dt).unwrap().axes();
            let ba = compute_velocity(&b, &a, dt).unwrap().axes();

            for i in 0..NUM_POSE_AXES {
                let (ab, ba) = (ab[i].unwrap(), ba[i].unwrap());
                assert!((ab + ba).abs() < EPS, "axis {} not antisymmetric", i);
            }
        }
    }

    #[test]
    fn test_velocity_missing_axis() {
        let a = snapshot_at([0.0; NUM_POSE_AXES], 0.0);
        let mut b = snapshot_at([1.0; NUM_POSE_AXES], 0.0);
        b.pose[2] = None;

        let v = compute_velocity(&a, &b, 1.0).unwrap();
        assert_eq!(v.vz, None);
        assert_eq!(v.vx, Some(1.0));
    }

    #[test]
    fn test_invalid_interval() {
        let a = snapshot_at([0.0; NUM_POSE_AXES], 100.0);

        for &dt in &[0.0, -1.0, std::f64::NAN, std::f64::INFINITY] {
            assert!(matches!(
                compute_velocity(&a, &a, dt),
                Err(ComputationError::InvalidInterval(_))
            ));
            assert!(matches!(
                compute_energy_cost(&a, 0.0, dt, &EnergyTariff::new(21.65)),
                Err(ComputationError::InvalidInterval(_))
            ));
        }

        let v = VelocityVector::default();
        assert_eq!(
            compute_acceleration(Some(&v), &v, 0.0),
            Err(ComputationError::InvalidInterval(0.0))
        );
    }

    #[test]
    fn test_acceleration_without_previous() {
        let v = VelocityVector::from_axes([Some(1.0); NUM_POSE_AXES]);

        for &dt in &[1.0, 0.0, -5.0] {
            let a = compute_acceleration(None, &v, dt).unwrap();
            assert!(a.is_undefined());
        }
    }

    #[test]
    fn test_acceleration() {
        let v0 = VelocityVector::from_axes([Some(1.0), Some(2.0), None, Some(0.0), Some(0.0), Some(0.0)]);
        let v1 = VelocityVector::from_axes([Some(3.0), Some(2.0), Some(1.0), Some(-1.0), Some(0.0), Some(0.5)]);

        let a = compute_acceleration(Some(&v0), &v1, 0.5).unwrap();
        assert_eq!(a.ax, Some(4.0));
        assert_eq!(a.ay, Some(0.0));
        assert_eq!(a.az, None);
        assert_eq!(a.aw, Some(-2.0));
        assert_eq!(a.ar, Some(1.0));
    }

    #[test]
    fn test_energy_cost() {
        let s = snapshot_at([0.0; NUM_POSE_AXES], 1000.0);
        let tariff = EnergyTariff::new(21.65);

        let c = compute_energy_cost(&s, 1.0, 3600.0, &tariff).unwrap();
        assert!((c.energy - 1.0).abs() < EPS);
        assert!((c.cost - 0.2165).abs() < EPS);
        assert!((c.cumulative_cost - 1.2165).abs() < EPS);
    }

    #[test]
    fn test_energy_cost_additive() {
        let s = snapshot_at([0.0; NUM_POSE_AXES], 742.3);
        let tariff = EnergyTariff::new(21.65);

        let first = compute_energy_cost(&s, 0.0, 1.3, &tariff).unwrap();
        let second = compute_energy_cost(&s, first.cumulative_cost, 2.9, &tariff).unwrap();
        let combined = compute_energy_cost(&s, 0.0, 4.2, &tariff).unwrap();

        assert!((first.cost + second.cost - combined.cost).abs() < EPS);
        assert!((second.cumulative_cost - combined.cumulative_cost).abs() < EPS);
    }

    #[test]
    fn test_energy_cost_missing_power() {
        let mut s = snapshot_at([0.0; NUM_POSE_AXES], 0.0);
        s.power_w = None;

        assert_eq!(
            compute_energy_cost(&s, 0.0, 1.0, &EnergyTariff::new(21.65)),
            Err(ComputationError::MissingPower)
        );
    }

    #[test]
    fn test_cost_record_wire_name() {
        let json = serde_json::to_value(CostRecord {
            cost: 0.5,
            energy: 2.0,
            cumulative_cost: 3.0,
        })
        .unwrap();

        assert_eq!(json["cummulative_cost"], 3.0);
        assert!(json.get("cumulative_cost").is_none());
    }
}
