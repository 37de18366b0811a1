//! Solver-agnostic conic program.
//!
//! The builder writes into a [`ConicModel`]; solver adapters (see
//! [`crate::backends`]) read it back out. Rows follow the convention
//!
//! ```text
//!   s = b - a·x,   s ∈ K
//! ```
//!
//! where `K` is a product of zero cones (equalities), nonnegative cones
//! (inequalities) and second-order cones `{ (t, y) : ‖y‖₂ ≤ t }`. This is the
//! form Clarabel consumes directly.
//!
//! Every constraint is stored as a [`ConstraintRecord`]: a group label, the
//! physical entity it belongs to (bus, cone index, or the whole feeder), and
//! the contiguous row range it occupies. Dual values can therefore be mapped
//! back to buses without relying on solver-side names.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use ccopf_core::BusId;
use serde::Serialize;

/// Column index of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Physical entity a variable or constraint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Entity {
    /// Feeder-wide (scalar epigraph variables, balancing constraint, ...)
    Global,
    Bus(BusId),
    /// Auxiliary cone index; see `ModelMetadata` for the bus it belongs to
    Cone(usize),
}

/// Variable groups the builder may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VarGroup {
    /// Squared voltage magnitude
    V,
    /// Active flow on the line feeding a bus
    Fp,
    /// Reactive flow on the line feeding a bus
    Fq,
    /// Active generation
    Gp,
    /// Reactive generation
    Gq,
    /// Scheduling (quadratic) cost epigraph
    RSched,
    /// Participation factors
    Alpha,
    /// Balancing cost epigraph
    RBal,
    /// Voltage sensitivity auxiliaries
    Rho,
    /// Voltage standard-deviation epigraphs
    T,
    /// Flow sensitivity auxiliaries
    RhoF,
    /// Flow standard-deviation epigraphs
    TF,
}

impl VarGroup {
    pub const ALL: [VarGroup; 12] = [
        VarGroup::V,
        VarGroup::Fp,
        VarGroup::Fq,
        VarGroup::Gp,
        VarGroup::Gq,
        VarGroup::RSched,
        VarGroup::Alpha,
        VarGroup::RBal,
        VarGroup::Rho,
        VarGroup::T,
        VarGroup::RhoF,
        VarGroup::TF,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VarGroup::V => "v",
            VarGroup::Fp => "fp",
            VarGroup::Fq => "fq",
            VarGroup::Gp => "gp",
            VarGroup::Gq => "gq",
            VarGroup::RSched => "r_sched",
            VarGroup::Alpha => "alpha",
            VarGroup::RBal => "r_bal",
            VarGroup::Rho => "rho",
            VarGroup::T => "t",
            VarGroup::RhoF => "rho_f",
            VarGroup::TF => "t_f",
        }
    }
}

/// Constraint families. Each record carries one of these labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConstraintGroup {
    PowerBalanceP,
    PowerBalanceQ,
    VoltageDrop,
    RootVoltage,
    RootFlowP,
    RootFlowQ,
    NoGenerationP,
    NoGenerationQ,
    GenPMax,
    GenPMin,
    GenQMax,
    GenQMin,
    VoltageMax,
    VoltageMin,
    ParticipationSum,
    NoParticipation,
    VoltageLink,
    VoltageCone,
    ThermalCone,
    ThermalFacet,
    ThermalLink,
    ThermalChanceCone,
    SchedulingCost,
    BalancingCost,
}

impl ConstraintGroup {
    pub fn name(self) -> &'static str {
        match self {
            ConstraintGroup::PowerBalanceP => "power_balance_p",
            ConstraintGroup::PowerBalanceQ => "power_balance_q",
            ConstraintGroup::VoltageDrop => "voltage_drop",
            ConstraintGroup::RootVoltage => "root_voltage",
            ConstraintGroup::RootFlowP => "root_flow_p",
            ConstraintGroup::RootFlowQ => "root_flow_q",
            ConstraintGroup::NoGenerationP => "no_generation_p",
            ConstraintGroup::NoGenerationQ => "no_generation_q",
            ConstraintGroup::GenPMax => "gen_p_max",
            ConstraintGroup::GenPMin => "gen_p_min",
            ConstraintGroup::GenQMax => "gen_q_max",
            ConstraintGroup::GenQMin => "gen_q_min",
            ConstraintGroup::VoltageMax => "voltage_max",
            ConstraintGroup::VoltageMin => "voltage_min",
            ConstraintGroup::ParticipationSum => "participation_sum",
            ConstraintGroup::NoParticipation => "no_participation",
            ConstraintGroup::VoltageLink => "voltage_link",
            ConstraintGroup::VoltageCone => "voltage_cone",
            ConstraintGroup::ThermalCone => "thermal_cone",
            ConstraintGroup::ThermalFacet => "thermal_facet",
            ConstraintGroup::ThermalLink => "thermal_link",
            ConstraintGroup::ThermalChanceCone => "thermal_chance_cone",
            ConstraintGroup::SchedulingCost => "scheduling_cost",
            ConstraintGroup::BalancingCost => "balancing_cost",
        }
    }
}

/// Affine expression `Σ coef·x + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(v: VarId) -> Self {
        Self {
            terms: vec![(v, 1.0)],
            constant: 0.0,
        }
    }

    pub fn constant(c: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: c,
        }
    }

    /// Add `coef·v`; exact zeros are dropped to keep rows sparse.
    pub fn term(mut self, v: VarId, coef: f64) -> Self {
        self.add_term(v, coef);
        self
    }

    pub fn plus(mut self, c: f64) -> Self {
        self.constant += c;
        self
    }

    /// Multiply every coefficient and the constant by `k`.
    pub fn scaled(mut self, k: f64) -> Self {
        for (_, c) in &mut self.terms {
            *c *= k;
        }
        self.constant *= k;
        self
    }

    pub fn add_term(&mut self, v: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((v, coef));
        }
    }

    pub fn eval(&self, x: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(v, c)| c * x[v.index()])
                .sum::<f64>()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableBlock {
    pub group: VarGroup,
    /// First column of the block
    pub start: usize,
    pub entities: Vec<Entity>,
    pub nonnegative: bool,
    #[serde(skip)]
    positions: HashMap<Entity, usize>,
}

impl VariableBlock {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Position of `entity` within the block.
    pub fn position(&self, entity: Entity) -> Option<usize> {
        self.positions.get(&entity).copied()
    }

    /// Column of the `pos`-th entry.
    pub fn at(&self, pos: usize) -> Option<VarId> {
        (pos < self.len()).then(|| VarId(self.start + pos))
    }

    pub fn ids(&self) -> Vec<VarId> {
        (self.start..self.start + self.len()).map(VarId).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, VarId)> + '_ {
        self.entities
            .iter()
            .enumerate()
            .map(move |(k, e)| (*e, VarId(self.start + k)))
    }
}

/// One sparse row: `s = rhs - Σ coef·x[col]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub coeffs: Vec<(usize, f64)>,
    pub rhs: f64,
}

impl Row {
    /// Value of the slack `s` at `x`.
    pub fn slack(&self, x: &[f64]) -> f64 {
        self.rhs - self.coeffs.iter().map(|(j, c)| c * x[*j]).sum::<f64>()
    }
}

/// Cone of one constraint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConeKind {
    Zero,
    Nonnegative,
    SecondOrder(usize),
}

/// Cone block as handed to a solver; consecutive zero/nonnegative rows are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConeBlock {
    Zero(usize),
    Nonnegative(usize),
    SecondOrder(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintRecord {
    pub group: ConstraintGroup,
    pub entity: Entity,
    /// Facet index for polyhedral families
    pub facet: Option<usize>,
    pub kind: ConeKind,
    pub rows: Range<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ConicModel {
    blocks: Vec<VariableBlock>,
    block_index: BTreeMap<VarGroup, usize>,
    n_vars: usize,
    rows: Vec<Row>,
    cones: Vec<ConeBlock>,
    records: Vec<ConstraintRecord>,
    record_index: BTreeMap<(ConstraintGroup, Entity), Vec<usize>>,
    objective: LinExpr,
}

impl ConicModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------------

    /// Declare a variable group. Redeclaring a group returns the existing block.
    pub fn add_variables(
        &mut self,
        group: VarGroup,
        entities: Vec<Entity>,
        nonnegative: bool,
    ) -> &VariableBlock {
        if let Some(&idx) = self.block_index.get(&group) {
            return &self.blocks[idx];
        }
        let positions = entities.iter().enumerate().map(|(k, e)| (*e, k)).collect();
        let block = VariableBlock {
            group,
            start: self.n_vars,
            entities,
            nonnegative,
            positions,
        };
        self.n_vars += block.len();
        self.block_index.insert(group, self.blocks.len());
        self.blocks.push(block);
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn variables(&self, group: VarGroup) -> Option<&VariableBlock> {
        self.block_index.get(&group).map(|&i| &self.blocks[i])
    }

    pub fn has_variables(&self, group: VarGroup) -> bool {
        self.block_index.contains_key(&group)
    }

    pub fn var(&self, group: VarGroup, entity: Entity) -> Option<VarId> {
        let block = self.variables(group)?;
        block.position(entity).map(|k| VarId(block.start + k))
    }

    pub fn variable_blocks(&self) -> &[VariableBlock] {
        &self.blocks
    }

    pub fn num_variables(&self) -> usize {
        self.n_vars
    }

    // ------------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------------

    /// `expr = rhs`
    pub fn add_eq(
        &mut self,
        group: ConstraintGroup,
        entity: Entity,
        expr: LinExpr,
        rhs: f64,
    ) -> usize {
        let start = self.rows.len();
        self.rows.push(Row {
            coeffs: columns(&expr.terms, 1.0),
            rhs: rhs - expr.constant,
        });
        match self.cones.last_mut() {
            Some(ConeBlock::Zero(n)) => *n += 1,
            _ => self.cones.push(ConeBlock::Zero(1)),
        }
        self.push_record(group, entity, None, ConeKind::Zero, start..start + 1)
    }

    /// `expr ≤ rhs`
    pub fn add_leq(
        &mut self,
        group: ConstraintGroup,
        entity: Entity,
        expr: LinExpr,
        rhs: f64,
    ) -> usize {
        self.push_leq(group, entity, None, expr, rhs)
    }

    /// `expr ≥ rhs`
    pub fn add_geq(
        &mut self,
        group: ConstraintGroup,
        entity: Entity,
        expr: LinExpr,
        rhs: f64,
    ) -> usize {
        let negated = LinExpr {
            terms: expr.terms.iter().map(|(v, c)| (*v, -c)).collect(),
            constant: -expr.constant,
        };
        self.push_leq(group, entity, None, negated, -rhs)
    }

    /// `expr ≤ rhs` tagged with a facet index.
    pub fn add_leq_facet(
        &mut self,
        group: ConstraintGroup,
        entity: Entity,
        facet: usize,
        expr: LinExpr,
        rhs: f64,
    ) -> usize {
        self.push_leq(group, entity, Some(facet), expr, rhs)
    }

    /// `‖components‖₂ ≤ bound`
    pub fn add_soc(
        &mut self,
        group: ConstraintGroup,
        entity: Entity,
        bound: LinExpr,
        components: Vec<LinExpr>,
    ) -> usize {
        let start = self.rows.len();
        let dim = components.len() + 1;
        for expr in std::iter::once(bound).chain(components) {
            self.rows.push(Row {
                coeffs: columns(&expr.terms, -1.0),
                rhs: expr.constant,
            });
        }
        self.cones.push(ConeBlock::SecondOrder(dim));
        self.push_record(
            group,
            entity,
            None,
            ConeKind::SecondOrder(dim),
            start..start + dim,
        )
    }

    fn push_leq(
        &mut self,
        group: ConstraintGroup,
        entity: Entity,
        facet: Option<usize>,
        expr: LinExpr,
        rhs: f64,
    ) -> usize {
        let start = self.rows.len();
        self.rows.push(Row {
            coeffs: columns(&expr.terms, 1.0),
            rhs: rhs - expr.constant,
        });
        match self.cones.last_mut() {
            Some(ConeBlock::Nonnegative(n)) => *n += 1,
            _ => self.cones.push(ConeBlock::Nonnegative(1)),
        }
        self.push_record(group, entity, facet, ConeKind::Nonnegative, start..start + 1)
    }

    fn push_record(
        &mut self,
        group: ConstraintGroup,
        entity: Entity,
        facet: Option<usize>,
        kind: ConeKind,
        rows: Range<usize>,
    ) -> usize {
        let idx = self.records.len();
        self.records.push(ConstraintRecord {
            group,
            entity,
            facet,
            kind,
            rows,
        });
        self.record_index
            .entry((group, entity))
            .or_default()
            .push(idx);
        idx
    }

    /// First record of `group` for `entity`.
    pub fn constraint(&self, group: ConstraintGroup, entity: Entity) -> Option<&ConstraintRecord> {
        self.record_index
            .get(&(group, entity))
            .and_then(|ids| ids.first())
            .map(|&i| &self.records[i])
    }

    /// All records of `group` for `entity` (several for polyhedral families).
    pub fn constraints_for(
        &self,
        group: ConstraintGroup,
        entity: Entity,
    ) -> impl Iterator<Item = &ConstraintRecord> {
        self.record_index
            .get(&(group, entity))
            .into_iter()
            .flatten()
            .map(move |&i| &self.records[i])
    }

    pub fn constraints(&self, group: ConstraintGroup) -> impl Iterator<Item = &ConstraintRecord> {
        self.records.iter().filter(move |r| r.group == group)
    }

    pub fn count(&self, group: ConstraintGroup) -> usize {
        self.constraints(group).count()
    }

    pub fn records(&self) -> &[ConstraintRecord] {
        &self.records
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn cones(&self) -> &[ConeBlock] {
        &self.cones
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    // ------------------------------------------------------------------------
    // Objective
    // ------------------------------------------------------------------------

    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    /// Dense objective vector `q` (duplicate terms summed).
    pub fn objective_coefficients(&self) -> Vec<f64> {
        let mut q = vec![0.0; self.n_vars];
        for (v, c) in &self.objective.terms {
            q[v.index()] += c;
        }
        q
    }
}

fn columns(terms: &[(VarId, f64)], sign: f64) -> Vec<(usize, f64)> {
    terms.iter().map(|(v, c)| (v.index(), sign * c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_var_model() -> (ConicModel, VarId, VarId) {
        let mut m = ConicModel::new();
        m.add_variables(
            VarGroup::Gp,
            vec![Entity::Bus(BusId::new(0)), Entity::Bus(BusId::new(1))],
            false,
        );
        let x0 = m.var(VarGroup::Gp, Entity::Bus(BusId::new(0))).unwrap();
        let x1 = m.var(VarGroup::Gp, Entity::Bus(BusId::new(1))).unwrap();
        (m, x0, x1)
    }

    #[test]
    fn test_variable_lookup() {
        let (mut m, x0, x1) = two_var_model();
        m.add_variables(VarGroup::RSched, vec![Entity::Global], true);

        assert_eq!(x0.index(), 0);
        assert_eq!(x1.index(), 1);
        assert_eq!(m.var(VarGroup::RSched, Entity::Global).unwrap().index(), 2);
        assert_eq!(m.num_variables(), 3);
        assert!(m.var(VarGroup::Alpha, Entity::Global).is_none());
        assert!(!m.has_variables(VarGroup::T));
    }

    #[test]
    fn test_indexed_lookup_on_large_block() {
        let mut m = ConicModel::new();
        m.add_variables(VarGroup::V, vec![Entity::Global], false);
        let buses: Vec<Entity> = (0..500).map(|i| Entity::Bus(BusId::new(i * 3))).collect();
        m.add_variables(VarGroup::Alpha, buses, true);

        let block = m.variables(VarGroup::Alpha).unwrap();
        assert_eq!(block.position(Entity::Bus(BusId::new(3 * 417))), Some(417));
        assert_eq!(block.position(Entity::Bus(BusId::new(1))), None);
        assert_eq!(
            m.var(VarGroup::Alpha, Entity::Bus(BusId::new(3 * 499))).unwrap().index(),
            500
        );
    }

    #[test]
    fn test_cones_merge_like_rows() {
        let (mut m, x0, x1) = two_var_model();
        let bus = Entity::Bus(BusId::new(0));
        m.add_eq(ConstraintGroup::PowerBalanceP, bus, LinExpr::var(x0), 1.0);
        m.add_eq(ConstraintGroup::PowerBalanceQ, bus, LinExpr::var(x1), 0.0);
        m.add_leq(ConstraintGroup::GenPMax, bus, LinExpr::var(x0), 2.0);
        m.add_geq(ConstraintGroup::GenPMin, bus, LinExpr::var(x0), 0.0);
        m.add_soc(
            ConstraintGroup::SchedulingCost,
            Entity::Global,
            LinExpr::var(x0),
            vec![LinExpr::new().term(x1, 2.0)],
        );

        assert_eq!(
            m.cones(),
            &[
                ConeBlock::Zero(2),
                ConeBlock::Nonnegative(2),
                ConeBlock::SecondOrder(2)
            ]
        );
        assert_eq!(m.num_rows(), 6);
        let soc = m
            .constraint(ConstraintGroup::SchedulingCost, Entity::Global)
            .unwrap();
        assert_eq!(soc.rows, 4..6);
        assert_eq!(soc.kind, ConeKind::SecondOrder(2));
    }

    #[test]
    fn test_row_sign_convention() {
        let (mut m, x0, x1) = two_var_model();
        let bus = Entity::Bus(BusId::new(1));
        // x0 + 2 ≥ 3 is stored as s = x0 - 1 ≥ 0
        m.add_geq(ConstraintGroup::GenPMin, bus, LinExpr::var(x0).plus(2.0), 3.0);
        m.add_soc(
            ConstraintGroup::VoltageCone,
            Entity::Cone(0),
            LinExpr::var(x1),
            vec![LinExpr::constant(0.5).term(x0, 1.0)],
        );

        let x = [1.5, 4.0];
        assert!((m.rows()[0].slack(&x) - 0.5).abs() < 1e-12);
        // SOC slack components are (t, y) themselves
        assert!((m.rows()[1].slack(&x) - 4.0).abs() < 1e-12);
        assert!((m.rows()[2].slack(&x) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_facets_share_entity() {
        let (mut m, x0, _) = two_var_model();
        let bus = Entity::Bus(BusId::new(1));
        for k in 0..3 {
            m.add_leq_facet(ConstraintGroup::ThermalFacet, bus, k, LinExpr::var(x0), 1.0);
        }
        let facets: Vec<_> = m
            .constraints_for(ConstraintGroup::ThermalFacet, bus)
            .map(|r| r.facet)
            .collect();
        assert_eq!(facets, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(m.count(ConstraintGroup::ThermalFacet), 3);
    }

    #[test]
    fn test_objective_coefficients_sum_duplicates() {
        let (mut m, x0, x1) = two_var_model();
        m.set_objective(LinExpr::new().term(x0, 1.0).term(x1, 3.0).term(x0, 0.5));
        assert_eq!(m.objective_coefficients(), vec![1.5, 3.0]);
    }
}
