//! Stage 3: variable declaration.

use ccopf_core::Topology;

use super::schema::ModelSchema;
use crate::model::{ConicModel, Entity, VarGroup, VarId};
use crate::OpfError;

/// Columns of every declared group, in bus order (per-bus groups) or cone order
/// (auxiliary groups). Optional groups are `None` when the schema skipped them.
#[derive(Debug, Clone)]
pub(crate) struct Columns {
    pub v: Vec<VarId>,
    pub fp: Vec<VarId>,
    pub fq: Vec<VarId>,
    pub gp: Vec<VarId>,
    pub gq: Vec<VarId>,
    pub r_sched: VarId,
    alpha: Option<Vec<VarId>>,
    r_bal: Option<VarId>,
    rho: Option<Vec<VarId>>,
    t: Option<Vec<VarId>>,
    rho_f: Option<Vec<VarId>>,
    t_f: Option<Vec<VarId>>,
}

impl Columns {
    pub fn alpha(&self) -> Result<&[VarId], OpfError> {
        required(&self.alpha, VarGroup::Alpha)
    }

    pub fn r_bal(&self) -> Result<VarId, OpfError> {
        self.r_bal
            .ok_or(OpfError::MissingVariable(VarGroup::RBal.name()))
    }

    pub fn rho(&self) -> Result<&[VarId], OpfError> {
        required(&self.rho, VarGroup::Rho)
    }

    pub fn t(&self) -> Result<&[VarId], OpfError> {
        required(&self.t, VarGroup::T)
    }

    pub fn rho_f(&self) -> Result<&[VarId], OpfError> {
        required(&self.rho_f, VarGroup::RhoF)
    }

    pub fn t_f(&self) -> Result<&[VarId], OpfError> {
        required(&self.t_f, VarGroup::TF)
    }

    /// Voltage epigraph of the cone at non-root position `k`, if voltage CC is active.
    pub fn t_at(&self, k: usize) -> Option<VarId> {
        self.t.as_ref().and_then(|t| t.get(k).copied())
    }
}

fn required(ids: &Option<Vec<VarId>>, group: VarGroup) -> Result<&[VarId], OpfError> {
    ids.as_deref()
        .ok_or(OpfError::MissingVariable(group.name()))
}

/// Declare every group the schema lists.
///
/// Per-bus groups are keyed by `Entity::Bus` in bus order; `ρ`, `t`, `ρ_f`,
/// `t_f` by `Entity::Cone(k)` in non-root order.
pub(crate) fn declare(
    model: &mut ConicModel,
    topology: &Topology,
    schema: &ModelSchema,
) -> Result<Columns, OpfError> {
    let buses: Vec<Entity> = topology.buses().iter().map(|b| Entity::Bus(b.id)).collect();
    let cones: Vec<Entity> = (0..topology.non_root().len()).map(Entity::Cone).collect();

    for group in schema.variable_groups() {
        let (entities, nonnegative) = match group {
            VarGroup::V | VarGroup::Alpha => (buses.clone(), true),
            VarGroup::Fp | VarGroup::Fq | VarGroup::Gp | VarGroup::Gq => (buses.clone(), false),
            VarGroup::RSched | VarGroup::RBal => (vec![Entity::Global], true),
            VarGroup::Rho | VarGroup::RhoF => (cones.clone(), false),
            VarGroup::T | VarGroup::TF => (cones.clone(), true),
        };
        model.add_variables(group, entities, nonnegative);
    }

    let ids = |group: VarGroup| model.variables(group).map(|b| b.ids());
    let need = |group: VarGroup| ids(group).ok_or(OpfError::MissingVariable(group.name()));

    Ok(Columns {
        v: need(VarGroup::V)?,
        fp: need(VarGroup::Fp)?,
        fq: need(VarGroup::Fq)?,
        gp: need(VarGroup::Gp)?,
        gq: need(VarGroup::Gq)?,
        r_sched: model
            .var(VarGroup::RSched, Entity::Global)
            .ok_or(OpfError::MissingVariable(VarGroup::RSched.name()))?,
        alpha: ids(VarGroup::Alpha),
        r_bal: model.var(VarGroup::RBal, Entity::Global),
        rho: ids(VarGroup::Rho),
        t: ids(VarGroup::T),
        rho_f: ids(VarGroup::RhoF),
        t_f: ids(VarGroup::TF),
    })
}
