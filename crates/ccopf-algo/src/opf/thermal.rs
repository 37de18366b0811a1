//! Line thermal limits.
//!
//! Only lines with a rating (`s_max`) are constrained. The polyhedral encoding
//! replaces the disk `fp² + fq² ≤ s_max²` by the regular dodecagon whose edges
//! touch it, `a1·fp + a2·fq ≤ a3·s_max` for the 12 triples in [`FACETS`].
//! Its vertices lie at radius `s_max / cos(π/12)`.

use super::chance::{sensitivity_cone, sensitivity_link};
use super::BuildContext;
use crate::model::{ConicModel, ConstraintGroup, LinExpr};
use crate::OpfError;

/// `(cos θ, sin θ, 1)` for θ = 0°, 30°, …, 330°.
pub const FACETS: [(f64, f64, f64); 12] = [
    (1.0, 0.0, 1.0),
    (0.866_025_403_784_438_6, 0.5, 1.0),
    (0.5, 0.866_025_403_784_438_6, 1.0),
    (0.0, 1.0, 1.0),
    (-0.5, 0.866_025_403_784_438_6, 1.0),
    (-0.866_025_403_784_438_6, 0.5, 1.0),
    (-1.0, 0.0, 1.0),
    (-0.866_025_403_784_438_6, -0.5, 1.0),
    (-0.5, -0.866_025_403_784_438_6, 1.0),
    (0.0, -1.0, 1.0),
    (0.5, -0.866_025_403_784_438_6, 1.0),
    (0.866_025_403_784_438_6, -0.5, 1.0),
];

/// `‖(fp, fq)‖₂ ≤ s_max`
pub(crate) fn exact(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    for &i in ctx.topology.non_root() {
        let Some(s_max) = ctx.topology.line(i).and_then(|l| l.s_max) else {
            continue;
        };
        model.add_soc(
            ConstraintGroup::ThermalCone,
            ctx.bus(i),
            LinExpr::constant(s_max),
            vec![LinExpr::var(cols.fp[i]), LinExpr::var(cols.fq[i])],
        );
    }
    Ok(())
}

pub(crate) fn polyhedral(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    for &i in ctx.topology.non_root() {
        let Some(s_max) = ctx.topology.line(i).and_then(|l| l.s_max) else {
            continue;
        };
        for (facet, &(a1, a2, a3)) in FACETS.iter().enumerate() {
            let expr = LinExpr::new()
                .term(cols.fp[i], a1)
                .term(cols.fq[i], a2);
            model.add_leq_facet(ConstraintGroup::ThermalFacet, ctx.bus(i), facet, expr, a3 * s_max);
        }
    }
    Ok(())
}

/// Facets inflated by `|a1|·z_g·t_f`, where `t_f[k]` bounds the standard
/// deviation of the active flow on line `k`:
///
/// ```text
///   ‖Σ_rt (A[k,:]ᵀ − ρ_f[k]·1)‖₂ ≤ t_f[k],    A_check[k,:]·ρ_f = α[bus(k)]
/// ```
///
/// The cone and link are built for every line so `t_f` is always defined;
/// facets only where the line is rated.
pub(crate) fn chance(model: &mut ConicModel, ctx: &BuildContext<'_>) -> Result<(), OpfError> {
    let cols = ctx.cols;
    let (rho_f, t_f, alpha) = (cols.rho_f()?, cols.t_f()?, cols.alpha()?);
    let ones = ctx.sens.sigma_rt_ones();
    let z_g = ctx.settings.z_g;

    for (k, &i) in ctx.topology.non_root().iter().enumerate() {
        let row = ctx.sens.sigma_rt_times_row(&ctx.sens.a, k);
        sensitivity_cone(
            model,
            ConstraintGroup::ThermalChanceCone,
            k,
            t_f[k],
            rho_f[k],
            &row,
            &ones,
        );
        sensitivity_link(
            model,
            ConstraintGroup::ThermalLink,
            k,
            rho_f,
            &ctx.sens.a_check[k],
            alpha[i],
        );

        let Some(s_max) = ctx.topology.line(i).and_then(|l| l.s_max) else {
            continue;
        };
        for (facet, &(a1, a2, a3)) in FACETS.iter().enumerate() {
            let expr = LinExpr::new()
                .term(cols.fp[i], a1)
                .term(t_f[k], a1.abs() * z_g)
                .term(cols.fq[i], a2);
            model.add_leq_facet(ConstraintGroup::ThermalFacet, ctx.bus(i), facet, expr, a3 * s_max);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facets_are_unit_normals_at_30_degrees() {
        for (k, &(a1, a2, a3)) in FACETS.iter().enumerate() {
            let theta = (k as f64) * std::f64::consts::PI / 6.0;
            assert!((a1 - theta.cos()).abs() < 1e-12, "facet {}", k);
            assert!((a2 - theta.sin()).abs() < 1e-12, "facet {}", k);
            assert_eq!(a3, 1.0);
        }
    }

    #[test]
    fn test_dodecagon_contains_disk() {
        // every point on the unit circle satisfies all facets
        for step in 0..360 {
            let phi = (step as f64).to_radians();
            let (p, q) = (phi.cos(), phi.sin());
            for &(a1, a2, a3) in &FACETS {
                assert!(a1 * p + a2 * q <= a3 + 1e-12);
            }
        }
    }
}
