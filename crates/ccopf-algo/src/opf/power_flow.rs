//! Deterministic LinDistFlow constraints.
//!
//! ```text
//!   fp[i] + gp[i] − Σ_{c ∈ children(i)} fp[c] = p_d[i]          (every bus, also Q)
//!   v[i] = v[anc(i)] − 2 (r_i fp[i] + x_i fq[i])               (non-root)
//!   v[root] = 1,  fp[root] = fq[root] = 0
//! ```
//!
//! `fp[i]` is the flow on the line feeding bus `i`, positive away from the
//! substation.

use ccopf_core::Bus;

use super::BuildContext;
use crate::model::{ConicModel, ConstraintGroup, LinExpr};
use crate::OpfError;

/// Squared voltage band of a bus: `vfac > 0` overrides the bus limits.
pub(crate) fn squared_voltage_bounds(bus: &Bus, vfac: f64) -> (f64, f64) {
    if vfac > 0.0 {
        ((1.0 - vfac).powi(2), (1.0 + vfac).powi(2))
    } else {
        (bus.v_min * bus.v_min, bus.v_max * bus.v_max)
    }
}

pub(crate) fn power_balance(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    for (i, bus) in ctx.topology.buses().iter().enumerate() {
        let mut p = LinExpr::var(cols.fp[i]).term(cols.gp[i], 1.0);
        let mut q = LinExpr::var(cols.fq[i]).term(cols.gq[i], 1.0);
        for &c in ctx.topology.children(i) {
            p.add_term(cols.fp[c], -1.0);
            q.add_term(cols.fq[c], -1.0);
        }
        model.add_eq(ConstraintGroup::PowerBalanceP, ctx.bus(i), p, bus.p_demand);
        model.add_eq(ConstraintGroup::PowerBalanceQ, ctx.bus(i), q, bus.q_demand);
    }
    Ok(())
}

pub(crate) fn voltage_drop(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    for &i in ctx.topology.non_root() {
        let (Some(anc), Some(line)) = (ctx.topology.ancestor(i), ctx.topology.line(i)) else {
            continue;
        };
        // v[i] − v[anc] + 2 r fp[i] + 2 x fq[i] = 0
        let expr = LinExpr::var(cols.v[i])
            .term(cols.v[anc], -1.0)
            .term(cols.fp[i], 2.0 * line.resistance)
            .term(cols.fq[i], 2.0 * line.reactance);
        model.add_eq(ConstraintGroup::VoltageDrop, ctx.bus(i), expr, 0.0);
    }
    Ok(())
}

pub(crate) fn substation(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    let root = ctx.topology.root_index();
    let entity = ctx.bus(root);
    model.add_eq(ConstraintGroup::RootVoltage, entity, LinExpr::var(cols.v[root]), 1.0);
    model.add_eq(ConstraintGroup::RootFlowP, entity, LinExpr::var(cols.fp[root]), 0.0);
    model.add_eq(ConstraintGroup::RootFlowQ, entity, LinExpr::var(cols.fq[root]), 0.0);
    Ok(())
}

/// Generator limits, or `gp = gq = 0` where there is no generator.
///
/// With generation chance constraints the active limits are shifted by the
/// reserve `z_g · s · α[i]` the unit must hold for its share of the imbalance.
pub(crate) fn generation_limits(
    model: &mut ConicModel,
    ctx: &BuildContext<'_>,
) -> Result<(), OpfError> {
    let cols = ctx.cols;
    let alpha = if ctx.schema.gen_cc {
        Some(cols.alpha()?)
    } else {
        None
    };
    let margin = ctx.settings.z_g * ctx.sens.risk_scale;

    for (i, bus) in ctx.topology.buses().iter().enumerate() {
        let entity = ctx.bus(i);
        let Some(unit) = &bus.generator else {
            model.add_eq(ConstraintGroup::NoGenerationP, entity, LinExpr::var(cols.gp[i]), 0.0);
            model.add_eq(ConstraintGroup::NoGenerationQ, entity, LinExpr::var(cols.gq[i]), 0.0);
            continue;
        };

        model.add_leq(ConstraintGroup::GenQMax, entity, LinExpr::var(cols.gq[i]), unit.q_max);
        model.add_geq(ConstraintGroup::GenQMin, entity, LinExpr::var(cols.gq[i]), -unit.q_max);

        let (upper, lower) = match alpha {
            Some(alpha) => (
                LinExpr::var(cols.gp[i]).term(alpha[i], margin),
                LinExpr::var(cols.gp[i]).term(alpha[i], -margin),
            ),
            None => (LinExpr::var(cols.gp[i]), LinExpr::var(cols.gp[i])),
        };
        model.add_leq(ConstraintGroup::GenPMax, entity, upper, unit.p_max);
        model.add_geq(ConstraintGroup::GenPMin, entity, lower, 0.0);
    }
    Ok(())
}

/// Squared voltage band on non-root buses, tightened by `2 z_v t` under voltage CC.
pub(crate) fn voltage_band(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    if ctx.schema.volt_cc {
        cols.t()?;
    }
    let margin = 2.0 * ctx.settings.z_v;

    for (k, &i) in ctx.topology.non_root().iter().enumerate() {
        let (lo, hi) = squared_voltage_bounds(ctx.topology.bus(i), ctx.settings.vfac);
        let mut upper = LinExpr::var(cols.v[i]);
        let mut lower = LinExpr::var(cols.v[i]);
        if let Some(t) = cols.t_at(k) {
            upper.add_term(t, margin);
            lower.add_term(t, -margin);
        }
        model.add_leq(ConstraintGroup::VoltageMax, ctx.bus(i), upper, hi);
        model.add_geq(ConstraintGroup::VoltageMin, ctx.bus(i), lower, lo);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccopf_core::BusId;

    #[test]
    fn test_bus_limits_are_squared() {
        let bus = Bus::new(BusId::new(1), "b").with_voltage_limits(0.9, 1.1);
        let (lo, hi) = squared_voltage_bounds(&bus, 0.0);
        assert!((lo - 0.81).abs() < 1e-12);
        assert!((hi - 1.21).abs() < 1e-12);
    }

    #[test]
    fn test_vfac_overrides_bus_limits() {
        let bus = Bus::new(BusId::new(1), "b").with_voltage_limits(0.9, 1.1);
        let (lo, hi) = squared_voltage_bounds(&bus, 0.05);
        assert!((lo - 0.9025).abs() < 1e-12);
        assert!((hi - 1.1025).abs() < 1e-12);
    }
}
