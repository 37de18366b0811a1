//! Solver adapters.
//!
//! The builder never calls a solver itself; adapters here export a
//! [`ConicModel`](crate::model::ConicModel) into a solver's native form and map
//! the result back onto variable and constraint records.

pub mod clarabel;

use serde::Serialize;

use crate::model::{ConicModel, ConstraintGroup, ConstraintRecord, Entity, VarGroup, VarId};

/// Primal/dual result of a conic solve, indexed like the model it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelSolution {
    /// Solver status as reported by the backend
    pub status: String,
    pub objective_value: f64,
    pub iterations: usize,
    pub solve_time_ms: u128,
    /// Primal values, one per model column
    pub x: Vec<f64>,
    /// Dual values, one per model row (export-only rows follow at the end)
    pub z: Vec<f64>,
}

impl ModelSolution {
    pub fn value(&self, id: VarId) -> f64 {
        self.x[id.index()]
    }

    /// Value of `group[entity]`, if the model declares it.
    pub fn var_value(&self, model: &ConicModel, group: VarGroup, entity: Entity) -> Option<f64> {
        model.var(group, entity).map(|id| self.value(id))
    }

    /// All values of a group, in declaration order.
    pub fn group_values(&self, model: &ConicModel, group: VarGroup) -> Option<Vec<f64>> {
        model
            .variables(group)
            .map(|block| block.ids().into_iter().map(|id| self.value(id)).collect())
    }

    /// Dual slice of one constraint record.
    pub fn dual(&self, record: &ConstraintRecord) -> &[f64] {
        &self.z[record.rows.clone()]
    }

    /// Dual of the first row of `group[entity]` (the price of a scalar constraint).
    pub fn dual_price(
        &self,
        model: &ConicModel,
        group: ConstraintGroup,
        entity: Entity,
    ) -> Option<f64> {
        model
            .constraint(group, entity)
            .and_then(|rec| self.z.get(rec.rows.start).copied())
    }
}
