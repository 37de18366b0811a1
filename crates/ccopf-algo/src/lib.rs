//! # ccopf-algo: Chance-Constrained Distribution OPF
//!
//! Builds a second-order cone program for optimal dispatch on a radial feeder
//! whose net load is uncertain. Power flow is modelled with LinDistFlow; the
//! probabilistic limits on voltage, generation and line loading are replaced
//! by their exact SOC reformulations under Gaussian uncertainty.
//!
//! ## Modules
//!
//! - [`settings`]: configuration bundle (toggles, risk quantiles, covariance)
//! - [`linalg`]: sensitivity matrices, inverses and covariance square roots
//! - [`cost`]: per-bus generation cost coefficients
//! - [`model`]: solver-agnostic conic program with labeled constraints
//! - [`opf`]: the model builder ([`opf::build_model`])
//! - [`risk`]: quantiles and violation probabilities
//! - [`backends`]: Clarabel export and solve
//!
//! ## Quick Start
//!
//! ```rust
//! use ccopf_algo::{backends, opf, settings::Settings};
//! use ccopf_core::*;
//!
//! let buses = vec![
//!     Bus::new(BusId::new(0), "sub")
//!         .with_generator(Generator::new("grid", 5.0, 5.0).with_cost(30.0, 1.0)),
//!     Bus::new(BusId::new(1), "load")
//!         .with_ancestor(BusId::new(0))
//!         .with_demand(0.4, 0.1),
//! ];
//! let lines = vec![Line::new(BusId::new(1), 0.01, 0.02)];
//! let topology = Topology::new(buses, lines).unwrap();
//!
//! let built = opf::build_model(&topology, &Settings::deterministic(2)).unwrap();
//! let solution = backends::clarabel::solve(&built).unwrap();
//! assert!(solution.objective_value > 0.0);
//! ```

pub mod backends;
pub mod cost;
pub mod error;
pub mod linalg;
pub mod model;
pub mod opf;
pub mod risk;
pub mod settings;

pub use error::OpfError;
pub use model::{ConicModel, ConstraintGroup, Entity, VarGroup};
pub use opf::{build_model, CcOpfModel, ModelMetadata, ModelSchema};
pub use settings::Settings;
