//! Participation factors and the voltage chance constraint.
//!
//! The uncertain net load `ω ~ N(0, Σ)` is absorbed by the generators in
//! proportion to `α`. The voltage response at non-root position `k` is then
//!
//! ```text
//!   Δv[k] = −2 (R[k,:] − ρ[k]·1ᵀ) ω,    ρ = R α_nr
//! ```
//!
//! whose standard deviation `2 ‖Σ_rt (R[k,:]ᵀ − ρ[k]·1)‖₂` is bounded by the
//! epigraph `2 t[k]`. The band tightening lives in `power_flow::voltage_band`.

use super::BuildContext;
use crate::model::{ConicModel, ConstraintGroup, Entity, LinExpr, VarId};
use crate::OpfError;

/// `sum(α) = 1` and `α = 0` at buses without a generator.
pub(crate) fn balancing(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let alpha = ctx.cols.alpha()?;

    let mut sum = LinExpr::new();
    for &a in alpha {
        sum.add_term(a, 1.0);
    }
    model.add_eq(ConstraintGroup::ParticipationSum, Entity::Global, sum, 1.0);

    for (i, bus) in ctx.topology.buses().iter().enumerate() {
        if !bus.has_generator() {
            model.add_eq(
                ConstraintGroup::NoParticipation,
                ctx.bus(i),
                LinExpr::var(alpha[i]),
                0.0,
            );
        }
    }
    Ok(())
}

pub(crate) fn voltage_chance(
    model: &mut ConicModel,
    ctx: &BuildContext<'_>,
) -> Result<(), OpfError> {
    let (rho, t, alpha) = (ctx.cols.rho()?, ctx.cols.t()?, ctx.cols.alpha()?);
    let ones = ctx.sens.sigma_rt_ones();

    for (k, &i) in ctx.topology.non_root().iter().enumerate() {
        let row = ctx.sens.sigma_rt_times_row(&ctx.sens.r, k);
        sensitivity_cone(model, ConstraintGroup::VoltageCone, k, t[k], rho[k], &row, &ones);
        sensitivity_link(
            model,
            ConstraintGroup::VoltageLink,
            k,
            rho,
            &ctx.sens.r_check[k],
            alpha[i],
        );
    }
    Ok(())
}

/// `‖row − ρ·ones‖₂ ≤ epigraph`, where `row = Σ_rt M[k,:]ᵀ` and `ones = Σ_rt 1`.
pub(crate) fn sensitivity_cone(
    model: &mut ConicModel,
    group: ConstraintGroup,
    k: usize,
    epigraph: VarId,
    rho: VarId,
    row: &[f64],
    ones: &[f64],
) {
    let components = row
        .iter()
        .zip(ones)
        .map(|(&c, &w)| LinExpr::constant(c).term(rho, -w))
        .collect();
    model.add_soc(group, Entity::Cone(k), LinExpr::var(epigraph), components);
}

/// `inverse[k,:] · ρ − α = 0`, i.e. `ρ = M α_nr`.
pub(crate) fn sensitivity_link(
    model: &mut ConicModel,
    group: ConstraintGroup,
    k: usize,
    rho: &[VarId],
    inverse_row: &[f64],
    alpha: VarId,
) {
    let mut expr = LinExpr::new();
    for (&r, &coef) in rho.iter().zip(inverse_row) {
        expr.add_term(r, coef);
    }
    expr.add_term(alpha, -1.0);
    model.add_eq(group, Entity::Cone(k), expr, 0.0);
}
