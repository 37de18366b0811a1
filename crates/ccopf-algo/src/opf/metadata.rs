//! Bookkeeping returned next to the conic model.

use std::collections::BTreeMap;

use ccopf_core::{BusId, Diagnostics, Topology};
use serde::Serialize;

use super::power_flow::squared_voltage_bounds;
use super::schema::ModelSchema;
use crate::linalg::Sensitivities;
use crate::settings::Settings;

/// Everything a result-extraction step needs to interpret a solved model:
/// cone index ↔ bus tables, the resolved configuration, and the uncertainty
/// data behind the chance constraints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetadata {
    pub root: BusId,
    /// Bus of cone index `k` (non-root ordering)
    pub cone_buses: Vec<BusId>,
    pub bus_cones: BTreeMap<BusId, usize>,
    pub schema: ModelSchema,
    pub z_g: f64,
    pub z_v: f64,
    pub psi: f64,
    pub vfac: f64,
    pub qcfac: f64,
    /// Load factor actually applied (1 when not configured)
    pub loadfac: f64,
    pub var_vec: Vec<f64>,
    pub sigma: Vec<Vec<f64>>,
    /// `s = sqrt(sum(Σ[nr,nr]))`
    pub risk_scale: f64,
    pub output_level: u8,
    /// Squared voltage band `(lo, hi)` per bus as used by the model
    pub voltage_bounds: BTreeMap<BusId, (f64, f64)>,
    pub diagnostics: Diagnostics,
}

impl ModelMetadata {
    pub(crate) fn new(
        topology: &Topology,
        settings: &Settings,
        schema: ModelSchema,
        sensitivities: &Sensitivities,
        diagnostics: Diagnostics,
    ) -> Self {
        let cone_buses: Vec<BusId> = topology
            .non_root()
            .iter()
            .map(|&i| topology.bus(i).id)
            .collect();
        let bus_cones = cone_buses.iter().enumerate().map(|(k, id)| (*id, k)).collect();
        let voltage_bounds = topology
            .buses()
            .iter()
            .map(|b| (b.id, squared_voltage_bounds(b, settings.vfac)))
            .collect();

        Self {
            root: topology.root().id,
            cone_buses,
            bus_cones,
            schema,
            z_g: settings.z_g,
            z_v: settings.z_v,
            psi: settings.psi,
            vfac: settings.vfac,
            qcfac: settings.qcfac,
            loadfac: settings.load_factor(),
            var_vec: settings.var_vec.clone(),
            sigma: settings.sigma.clone(),
            risk_scale: sensitivities.risk_scale,
            output_level: settings.output_level,
            voltage_bounds,
            diagnostics,
        }
    }

    pub fn n_cones(&self) -> usize {
        self.cone_buses.len()
    }

    pub fn bus_for_cone(&self, k: usize) -> Option<BusId> {
        self.cone_buses.get(k).copied()
    }

    pub fn cone_for_bus(&self, bus: BusId) -> Option<usize> {
        self.bus_cones.get(&bus).copied()
    }
}
