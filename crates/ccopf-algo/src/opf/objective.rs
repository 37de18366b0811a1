//! Stage 5: objective.
//!
//! ```text
//!   min  Σᵢ c1ᵢ·gpᵢ + r_sched [+ r_bal] [+ Ψ·Σₖ tₖ]
//!   s.t. ‖F_nr · gp_nr‖₂² ≤ r_sched
//!        ‖s · F · α‖₂²    ≤ r_bal        (any chance constraint)
//! ```
//!
//! Each squared bound `‖y‖² ≤ r` is written as the second-order cone
//! `‖(r − 1, 2y)‖₂ ≤ r + 1`, so `r_sched = Σ c2·gp²` at the optimum.
//!
//! The root bus is left out of the scheduling cone; its quadratic coefficient
//! only enters through the balancing cone, which spans every bus.

use super::BuildContext;
use crate::model::{ConicModel, ConstraintGroup, Entity, LinExpr, VarId};
use crate::OpfError;

pub(crate) fn assemble(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    let f = &ctx.costs.f_diag;

    let scheduling: Vec<LinExpr> = ctx
        .topology
        .non_root()
        .iter()
        .map(|&i| LinExpr::new().term(cols.gp[i], f[i]))
        .collect();
    add_squared_epigraph(model, ConstraintGroup::SchedulingCost, cols.r_sched, scheduling);

    let mut objective = LinExpr::var(cols.r_sched);
    for (i, &c1) in ctx.costs.linear.iter().enumerate() {
        objective.add_term(cols.gp[i], c1);
    }

    if ctx.schema.any_cc {
        let (alpha, r_bal) = (cols.alpha()?, cols.r_bal()?);
        let s = ctx.sens.risk_scale;
        let balancing = alpha
            .iter()
            .zip(f)
            .map(|(&a, &fi)| LinExpr::new().term(a, s * fi))
            .collect();
        add_squared_epigraph(model, ConstraintGroup::BalancingCost, r_bal, balancing);
        objective.add_term(r_bal, 1.0);
    }

    if ctx.schema.volt_cc {
        for &t in cols.t()? {
            objective.add_term(t, ctx.settings.psi);
        }
    }

    model.set_objective(objective);
    Ok(())
}

/// `‖y‖₂² ≤ r` as `‖(r − 1, 2y)‖₂ ≤ r + 1`.
fn add_squared_epigraph(
    model: &mut ConicModel,
    group: ConstraintGroup,
    r: VarId,
    y: Vec<LinExpr>,
) -> usize {
    let mut components = Vec::with_capacity(y.len() + 1);
    components.push(LinExpr::var(r).plus(-1.0));
    components.extend(y.into_iter().map(|e| e.scaled(2.0)));
    model.add_soc(group, Entity::Global, LinExpr::var(r).plus(1.0), components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConeKind, VarGroup};

    #[test]
    fn test_squared_epigraph_holds_at_square() {
        let mut m = ConicModel::new();
        m.add_variables(VarGroup::Gp, vec![Entity::Global], false);
        m.add_variables(VarGroup::RSched, vec![Entity::Global], true);
        let g = m.var(VarGroup::Gp, Entity::Global).unwrap();
        let r = m.var(VarGroup::RSched, Entity::Global).unwrap();
        let rec = add_squared_epigraph(
            &mut m,
            ConstraintGroup::SchedulingCost,
            r,
            vec![LinExpr::new().term(g, 3.0)],
        );
        assert_eq!(m.records()[rec].kind, ConeKind::SecondOrder(3));

        // (3·0.5)² = 2.25: the cone is tight there and violated just below.
        let slack = |x: &[f64]| -> Vec<f64> {
            m.records()[rec].rows.clone().map(|k| m.rows()[k].slack(x)).collect()
        };
        let at = |r_val: f64| {
            let s = slack(&[0.5, r_val]);
            s[0] - (s[1] * s[1] + s[2] * s[2]).sqrt()
        };
        assert!(at(2.25).abs() < 1e-12);
        assert!(at(2.2) < 0.0);
        assert!(at(3.0) > 0.0);
    }
}
