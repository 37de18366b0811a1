//! Chance-constrained LinDistFlow OPF model builder.
//!
//! [`build_model`] turns a validated [`Topology`] and a [`Settings`] bundle into
//! a [`ConicModel`] with a linear objective over second-order cones. It runs
//! five stages in order:
//!
//! 1. **Ingestion**: settings validation, load scaling, linear-algebra
//!    preprocessing ([`crate::linalg::preprocess`])
//! 2. **Costs**: [`CostModel::assemble`]
//! 3. **Variables**: one block per group listed by the [`ModelSchema`]
//! 4. **Constraints**: one routine per [`ConstraintFamily`]
//! 5. **Objective**: linear costs plus conic epigraphs of the quadratic terms
//!
//! Numerical preconditions are checked in stage 1, so a failing build never
//! declares a variable.
//!
//! # Example
//!
//! ```
//! use ccopf_algo::opf::build_model;
//! use ccopf_algo::settings::Settings;
//! use ccopf_algo::model::ConstraintGroup;
//! use ccopf_core::*;
//!
//! let buses = vec![
//!     Bus::new(BusId::new(0), "sub")
//!         .with_generator(Generator::new("grid", 5.0, 5.0).with_cost(30.0, 0.0)),
//!     Bus::new(BusId::new(1), "load")
//!         .with_ancestor(BusId::new(0))
//!         .with_demand(0.4, 0.1),
//! ];
//! let lines = vec![Line::new(BusId::new(1), 0.01, 0.02)];
//! let topology = Topology::new(buses, lines).unwrap();
//!
//! let built = build_model(&topology, &Settings::deterministic(2)).unwrap();
//! assert_eq!(built.model.count(ConstraintGroup::PowerBalanceP), 2);
//! assert_eq!(built.model.count(ConstraintGroup::VoltageDrop), 1);
//! ```

mod chance;
pub mod metadata;
mod objective;
mod power_flow;
pub mod schema;
pub mod thermal;
mod variables;

use ccopf_core::{Diagnostics, Topology};
use tracing::debug;

use crate::cost::CostModel;
use crate::linalg::{self, Sensitivities};
use crate::model::{ConicModel, Entity};
use crate::settings::Settings;
use crate::OpfError;

pub use metadata::ModelMetadata;
pub use schema::{ConstraintFamily, ModelSchema, ThermalLimit};

use variables::Columns;

/// Built model with the bookkeeping needed to read its solution back.
#[derive(Debug, Clone)]
pub struct CcOpfModel {
    pub model: ConicModel,
    pub metadata: ModelMetadata,
    pub sensitivities: Sensitivities,
}

/// Read-only view shared by the constraint and objective stages.
pub(crate) struct BuildContext<'a> {
    pub topology: &'a Topology,
    pub settings: &'a Settings,
    pub schema: &'a ModelSchema,
    pub sens: &'a Sensitivities,
    pub costs: &'a CostModel,
    pub cols: &'a Columns,
}

impl BuildContext<'_> {
    /// Entity of the bus at index `i`.
    pub fn bus(&self, i: usize) -> Entity {
        Entity::Bus(self.topology.bus(i).id)
    }
}

/// Build the chance-constrained OPF model.
///
/// # Errors
///
/// - [`OpfError::InvalidSetting`] for settings that do not fit the feeder
/// - [`OpfError::NumericalIssue`] when `Σ` is not PSD, `R` is not positive
///   definite, or a quadratic cost is negative
/// - [`OpfError::Feeder`] for an invalid load factor
pub fn build_model(topology: &Topology, settings: &Settings) -> Result<CcOpfModel, OpfError> {
    // Stage 1: ingestion
    settings.validate(topology.n_buses())?;
    let topology = match settings.loadfac {
        Some(factor) => topology.with_load_factor(factor)?,
        None => topology.clone(),
    };
    let sensitivities = linalg::preprocess(&topology, &settings.sigma)?;

    // Stage 2: costs
    let costs = CostModel::assemble(&topology, settings.qcfac)?;

    let mut diagnostics = Diagnostics::new();
    let schema = ModelSchema::from_settings(settings, &mut diagnostics);
    debug!(
        buses = topology.n_buses(),
        any_cc = schema.any_cc,
        thermal = ?schema.thermal,
        risk_scale = sensitivities.risk_scale,
        "preprocessing complete"
    );

    // Stage 3: variables
    let mut model = ConicModel::new();
    let cols = variables::declare(&mut model, &topology, &schema)?;
    debug!(variables = model.num_variables(), "variables declared");

    // Stage 4: constraints
    let ctx = BuildContext {
        topology: &topology,
        settings,
        schema: &schema,
        sens: &sensitivities,
        costs: &costs,
        cols: &cols,
    };
    for family in schema.constraint_families() {
        assemble_family(&mut model, &ctx, family)?;
    }

    // Stage 5: objective
    objective::assemble(&mut model, &ctx)?;
    debug!(
        variables = model.num_variables(),
        rows = model.num_rows(),
        constraints = model.records().len(),
        diagnostics = %diagnostics.summary(),
        "model assembled"
    );

    let metadata = ModelMetadata::new(&topology, settings, schema, &sensitivities, diagnostics);
    Ok(CcOpfModel {
        model,
        metadata,
        sensitivities,
    })
}

fn assemble_family(
    model: &mut ConicModel,
    ctx: &BuildContext<'_>,
    family: ConstraintFamily,
) -> Result<(), OpfError> {
    match family {
        ConstraintFamily::PowerBalance => power_flow::power_balance(model, ctx),
        ConstraintFamily::VoltageDrop => power_flow::voltage_drop(model, ctx),
        ConstraintFamily::Substation => power_flow::substation(model, ctx),
        ConstraintFamily::GenerationLimits => power_flow::generation_limits(model, ctx),
        ConstraintFamily::VoltageBand => power_flow::voltage_band(model, ctx),
        ConstraintFamily::Balancing => chance::balancing(model, ctx),
        ConstraintFamily::VoltageChance => chance::voltage_chance(model, ctx),
        ConstraintFamily::ThermalExact => thermal::exact(model, ctx),
        ConstraintFamily::ThermalPolyhedral => thermal::polyhedral(model, ctx),
        ConstraintFamily::ThermalChance => thermal::chance(model, ctx),
    }
}
