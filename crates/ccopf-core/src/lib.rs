//! # ccopf-core: Radial Feeder Model
//!
//! Data structures describing a radial distribution feeder as consumed by the
//! chance-constrained OPF builder in `ccopf-algo`.
//!
//! ## Design Philosophy
//!
//! A feeder is a **tree** rooted at the substation bus:
//! - **Buses** carry demand, voltage limits and an optional generator
//! - **Lines** connect every non-root bus to its single ancestor
//!
//! The tree shape is validated once in [`Topology::new`]; everything downstream
//! (matrix derivation, model building) may then rely on it.
//!
//! ## Quick Start
//!
//! ```rust
//! use ccopf_core::*;
//!
//! let buses = vec![
//!     Bus::new(BusId::new(0), "substation"),
//!     Bus::new(BusId::new(1), "feeder-1")
//!         .with_ancestor(BusId::new(0))
//!         .with_demand(0.5, 0.1),
//! ];
//! let lines = vec![Line::new(BusId::new(1), 0.01, 0.02)];
//!
//! let topology = Topology::new(buses, lines).unwrap();
//! assert_eq!(topology.n_buses(), 2);
//! assert_eq!(topology.root().id, BusId::new(0));
//! ```
//!
//! ## Per-Unit Convention
//!
//! All quantities are per-unit. Voltage limits are magnitudes; the OPF model
//! works with squared magnitudes and squares them itself.

use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;
pub mod topology;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{FeederError, FeederResult};
pub use topology::Topology;

/// Bus identifier (newtype for type safety).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bus#{}", self.0)
    }
}

/// Dispatchable generator attached to a bus.
///
/// Cost is `c1·P + c2·P²`; the active power lower bound is always zero and the
/// reactive capability is symmetric (`-q_max ≤ Q ≤ q_max`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    /// Linear cost coefficient c1
    pub cost_linear: f64,
    /// Quadratic cost coefficient c2
    pub cost_quadratic: f64,
    /// Active power limit (p.u.)
    pub p_max: f64,
    /// Reactive power limit (p.u.)
    pub q_max: f64,
}

impl Generator {
    pub fn new(name: impl Into<String>, p_max: f64, q_max: f64) -> Self {
        Self {
            name: name.into(),
            cost_linear: 0.0,
            cost_quadratic: 0.0,
            p_max,
            q_max,
        }
    }

    pub fn with_cost(mut self, linear: f64, quadratic: f64) -> Self {
        self.cost_linear = linear;
        self.cost_quadratic = quadratic;
        self
    }
}

/// Feeder bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Upstream neighbour; `None` only for the substation (root)
    pub ancestor: Option<BusId>,
    /// Active demand (p.u.)
    pub p_demand: f64,
    /// Reactive demand (p.u.)
    pub q_demand: f64,
    /// Minimum voltage magnitude (p.u.)
    pub v_min: f64,
    /// Maximum voltage magnitude (p.u.)
    pub v_max: f64,
    pub generator: Option<Generator>,
}

impl Bus {
    /// Unloaded bus with a ±5% voltage band and no ancestor.
    pub fn new(id: BusId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ancestor: None,
            p_demand: 0.0,
            q_demand: 0.0,
            v_min: 0.95,
            v_max: 1.05,
            generator: None,
        }
    }

    pub fn with_ancestor(mut self, ancestor: BusId) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn with_demand(mut self, p: f64, q: f64) -> Self {
        self.p_demand = p;
        self.q_demand = q;
        self
    }

    pub fn with_voltage_limits(mut self, v_min: f64, v_max: f64) -> Self {
        self.v_min = v_min;
        self.v_max = v_max;
        self
    }

    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.ancestor.is_none()
    }

    #[inline]
    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }
}

/// Line between a bus and its ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Downstream bus; the upstream end is that bus's ancestor
    pub bus: BusId,
    /// Series resistance (p.u.)
    pub resistance: f64,
    /// Series reactance (p.u.)
    pub reactance: f64,
    /// Apparent power (thermal) limit (p.u.); `None` means unlimited
    pub s_max: Option<f64>,
}

impl Line {
    pub fn new(bus: BusId, resistance: f64, reactance: f64) -> Self {
        Self {
            bus,
            resistance,
            reactance,
            s_max: None,
        }
    }

    pub fn with_thermal_limit(mut self, s_max: f64) -> Self {
        self.s_max = Some(s_max);
        self
    }
}
