//! Gaussian risk helpers.
//!
//! Chance constraints `P(x ≤ b) ≥ 1 − ε` on a Gaussian `x ~ N(μ, σ²)` are
//! enforced as `μ + z·σ ≤ b` with `z = Φ⁻¹(1 − ε)`. These helpers convert
//! between risk levels and quantiles, and recover per-bus violation
//! probabilities from a solved model.

use ccopf_core::BusId;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;

use crate::backends::ModelSolution;
use crate::model::{Entity, VarGroup};
use crate::opf::CcOpfModel;
use crate::OpfError;

/// Standard-normal quantile `Φ⁻¹(1 − ε)` for a violation probability `ε ∈ (0, 1)`.
///
/// ```
/// let z = ccopf_algo::risk::quantile_for_risk(0.05).unwrap();
/// assert!((z - 1.6449).abs() < 1e-3);
/// ```
pub fn quantile_for_risk(epsilon: f64) -> Result<f64, OpfError> {
    if !(epsilon > 0.0 && epsilon < 1.0) {
        return Err(OpfError::invalid(
            "epsilon",
            format!("risk level must lie in (0, 1), got {}", epsilon),
        ));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| OpfError::NumericalIssue(e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - epsilon))
}

/// `P(X > margin)` for `X ~ N(0, std_dev²)`.
///
/// A zero standard deviation degenerates to a step: violated iff the margin is negative.
pub fn violation_probability(margin: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return if margin < 0.0 { 1.0 } else { 0.0 };
    }
    0.5 * erfc(margin / (std_dev * std::f64::consts::SQRT_2))
}

/// Voltage exposure of one non-root bus at a solved operating point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageRisk {
    pub bus: BusId,
    /// Standard deviation of the squared voltage
    pub std_dev: f64,
    pub upper_violation: f64,
    pub lower_violation: f64,
}

/// Per-bus voltage violation probabilities implied by a solution.
///
/// The response uses the solved participation factors when the model has them;
/// otherwise the substation absorbs all imbalance (`α_nr = 0`).
pub fn voltage_risk(
    built: &CcOpfModel,
    solution: &ModelSolution,
) -> Result<Vec<VoltageRisk>, OpfError> {
    let model = &built.model;
    let meta = &built.metadata;
    let sens = &built.sensitivities;

    let alpha_nr: Vec<f64> = meta
        .cone_buses
        .iter()
        .map(|&bus| {
            model
                .var(VarGroup::Alpha, Entity::Bus(bus))
                .map(|id| solution.value(id))
                .unwrap_or(0.0)
        })
        .collect();
    let rho: Vec<f64> = sens
        .r
        .iter()
        .map(|row| row.iter().zip(&alpha_nr).map(|(r, a)| r * a).sum())
        .collect();
    let ones = sens.sigma_rt_ones();

    let mut risks = Vec::with_capacity(meta.n_cones());
    for (k, &bus) in meta.cone_buses.iter().enumerate() {
        let v_id = model
            .var(VarGroup::V, Entity::Bus(bus))
            .ok_or(OpfError::MissingVariable(VarGroup::V.name()))?;
        let v = solution.value(v_id);
        let (lo, hi) = meta
            .voltage_bounds
            .get(&bus)
            .copied()
            .ok_or(OpfError::Feeder(ccopf_core::FeederError::UnknownBus(bus)))?;

        let row = sens.sigma_rt_times_row(&sens.r, k);
        let norm = row
            .iter()
            .zip(&ones)
            .map(|(c, w)| (c - rho[k] * w).powi(2))
            .sum::<f64>()
            .sqrt();
        let std_dev = 2.0 * norm;

        risks.push(VoltageRisk {
            bus,
            std_dev,
            upper_violation: violation_probability(hi - v, std_dev),
            lower_violation: violation_probability(v - lo, std_dev),
        });
    }
    Ok(risks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantiles() {
        assert!((quantile_for_risk(0.5).unwrap()).abs() < 1e-9);
        assert!((quantile_for_risk(0.025).unwrap() - 1.959_964).abs() < 1e-5);
        assert!(quantile_for_risk(0.0).is_err());
        assert!(quantile_for_risk(1.5).is_err());
    }

    #[test]
    fn test_violation_probability_matches_quantile() {
        let z = quantile_for_risk(0.1).unwrap();
        assert!((violation_probability(z * 0.2, 0.2) - 0.1).abs() < 1e-9);
        assert!((violation_probability(0.0, 1.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_step() {
        assert_eq!(violation_probability(0.1, 0.0), 0.0);
        assert_eq!(violation_probability(-0.1, 0.0), 1.0);
    }
}
