//! Linear-algebra preprocessing for the chance-constrained model.
//!
//! Everything the constraint stages need from dense linear algebra is computed
//! here, once, before any variable is declared:
//!
//! ```text
//!   R       = A' · R_d · A        (line resistance → voltage sensitivity)
//!   R_check = R⁻¹
//!   A_check = A⁻¹                 (signed line–bus incidence)
//!   Σ_rt    = Σ[nr,nr]^{1/2}      (symmetric PSD square root)
//!   s       = sqrt(Σᵢⱼ Σ[nr,nr])  (std. dev. of the aggregate imbalance 1ᵀω)
//! ```
//!
//! `nr` is the non-root ordering of the topology; the root row/column of Σ is
//! the reference and is discarded.
//!
//! Inverses use faer's partial-pivot LU; PSD square roots and the definiteness
//! check of `R` use nalgebra's symmetric eigendecomposition / Cholesky.
//!
//! # Preconditions
//!
//! `R` must be symmetric positive definite (all line resistances > 0) and `Σ`
//! symmetric positive semi-definite. Violations are reported as
//! [`OpfError::NumericalIssue`] and abort the build.

use ccopf_core::Topology;
use faer::{prelude::*, solvers::PartialPivLu, Mat};
use nalgebra::DMatrix;

use crate::OpfError;

/// Relative tolerance for symmetry and PSD checks.
const PSD_TOLERANCE: f64 = 1e-9;

/// Relative residual accepted for `M · M⁻¹ ≈ I`.
const INVERSE_TOLERANCE: f64 = 1e-8;

/// Derived matrices shared by the voltage and thermal chance constraints.
///
/// All matrices are square in the non-root dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensitivities {
    /// Ancestry matrix `A`
    pub a: Vec<Vec<f64>>,
    /// `A⁻¹`
    pub a_check: Vec<Vec<f64>>,
    /// `R = A' R_d A`
    pub r: Vec<Vec<f64>>,
    /// `R⁻¹`
    pub r_check: Vec<Vec<f64>>,
    /// `Σ[nr,nr]^{1/2}`
    pub sigma_rt: Vec<Vec<f64>>,
    /// `sqrt(sum(Σ[nr,nr]))`
    pub risk_scale: f64,
}

impl Sensitivities {
    pub fn dim(&self) -> usize {
        self.r.len()
    }

    /// `Σ_rt · 1`
    pub fn sigma_rt_ones(&self) -> Vec<f64> {
        self.sigma_rt.iter().map(|row| row.iter().sum()).collect()
    }

    /// `Σ_rt · m[k,:]ᵀ`
    pub fn sigma_rt_times_row(&self, m: &[Vec<f64>], k: usize) -> Vec<f64> {
        self.sigma_rt
            .iter()
            .map(|row| row.iter().zip(&m[k]).map(|(s, v)| s * v).sum())
            .collect()
    }
}

/// Run the full preprocessing stage.
pub fn preprocess(topology: &Topology, sigma: &[Vec<f64>]) -> Result<Sensitivities, OpfError> {
    let a = topology.path_matrix();
    let r_d = topology.resistance_matrix();

    let a_m = to_dmatrix(&a);
    let r_m = a_m.transpose() * to_dmatrix(&r_d) * &a_m;
    let r = from_dmatrix(&r_m);

    ensure_positive_definite(&r, "R")?;
    let r_check = invert(&r, "R")?;
    let a_check = invert(&a, "A")?;

    let sigma_nr = principal_submatrix(sigma, topology.non_root());
    let sigma_rt = psd_sqrt(&sigma_nr, "Σ")?;
    let risk_scale = aggregate_std_dev(&sigma_nr)?;

    Ok(Sensitivities {
        a,
        a_check,
        r,
        r_check,
        sigma_rt,
        risk_scale,
    })
}

/// Rows/columns of `m` selected by `keep`, in that order.
pub fn principal_submatrix(m: &[Vec<f64>], keep: &[usize]) -> Vec<Vec<f64>> {
    keep.iter()
        .map(|&i| keep.iter().map(|&j| m[i][j]).collect())
        .collect()
}

/// Dense inverse through partial-pivot LU.
pub fn invert(m: &[Vec<f64>], name: &str) -> Result<Vec<Vec<f64>>, OpfError> {
    let n = m.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mat = Mat::from_fn(n, n, |i, j| m[i][j]);
    let identity = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
    let lu = PartialPivLu::new(mat.as_ref());
    let inv = lu.solve(&identity);

    let out: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| inv.read(i, j)).collect())
        .collect();
    if out.iter().flatten().any(|v| !v.is_finite()) {
        return Err(OpfError::NumericalIssue(format!(
            "{} is singular; its inverse is undefined",
            name
        )));
    }

    let residual = (to_dmatrix(m) * to_dmatrix(&out) - DMatrix::<f64>::identity(n, n)).amax();
    if residual > INVERSE_TOLERANCE * n as f64 {
        return Err(OpfError::NumericalIssue(format!(
            "{} is numerically singular (inverse residual {:.2e})",
            name, residual
        )));
    }

    Ok(out)
}

/// Symmetric PSD square root via eigendecomposition (`V · diag(√λ) · V'`).
///
/// Eigenvalues within tolerance below zero are clamped; clearly negative ones
/// are an error.
pub fn psd_sqrt(m: &[Vec<f64>], name: &str) -> Result<Vec<Vec<f64>>, OpfError> {
    let n = m.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    ensure_symmetric(m, name)?;

    let eig = to_dmatrix(m).symmetric_eigen();
    let scale = eig
        .eigenvalues
        .iter()
        .fold(1.0_f64, |acc, l| acc.max(l.abs()));
    let min = eig
        .eigenvalues
        .iter()
        .fold(f64::INFINITY, |acc, &l| acc.min(l));
    if min < -PSD_TOLERANCE * scale {
        return Err(OpfError::NumericalIssue(format!(
            "{} is not positive semi-definite (smallest eigenvalue {:.3e})",
            name, min
        )));
    }

    let roots = eig.eigenvalues.map(|l| l.max(0.0).sqrt());
    let root = &eig.eigenvectors * DMatrix::from_diagonal(&roots) * eig.eigenvectors.transpose();
    Ok(from_dmatrix(&root))
}

fn aggregate_std_dev(sigma_nr: &[Vec<f64>]) -> Result<f64, OpfError> {
    let total: f64 = sigma_nr.iter().flatten().sum();
    let scale = sigma_nr
        .iter()
        .flatten()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    if total < -PSD_TOLERANCE * scale {
        return Err(OpfError::NumericalIssue(format!(
            "aggregate variance sum(Σ) is negative ({:.3e})",
            total
        )));
    }
    Ok(total.max(0.0).sqrt())
}

fn ensure_symmetric(m: &[Vec<f64>], name: &str) -> Result<(), OpfError> {
    let n = m.len();
    let scale = m.iter().flatten().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    for i in 0..n {
        for j in (i + 1)..n {
            if (m[i][j] - m[j][i]).abs() > PSD_TOLERANCE * scale {
                return Err(OpfError::NumericalIssue(format!(
                    "{} is not symmetric at ({}, {})",
                    name, i, j
                )));
            }
        }
    }
    Ok(())
}

fn ensure_positive_definite(m: &[Vec<f64>], name: &str) -> Result<(), OpfError> {
    if m.is_empty() {
        return Ok(());
    }
    ensure_symmetric(m, name)?;
    if to_dmatrix(m).cholesky().is_none() {
        return Err(OpfError::NumericalIssue(format!(
            "{} is not positive definite; check for zero-resistance lines",
            name
        )));
    }
    Ok(())
}

fn to_dmatrix(m: &[Vec<f64>]) -> DMatrix<f64> {
    let n_rows = m.len();
    let n_cols = m.first().map(|r| r.len()).unwrap_or(0);
    DMatrix::from_fn(n_rows, n_cols, |i, j| m[i][j])
}

fn from_dmatrix(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccopf_core::{Bus, BusId, Line};

    fn series_feeder() -> Topology {
        let buses = vec![
            Bus::new(BusId::new(0), "sub"),
            Bus::new(BusId::new(1), "b1").with_ancestor(BusId::new(0)),
            Bus::new(BusId::new(2), "b2").with_ancestor(BusId::new(1)),
        ];
        let lines = vec![
            Line::new(BusId::new(1), 0.1, 0.2),
            Line::new(BusId::new(2), 0.3, 0.4),
        ];
        Topology::new(buses, lines).unwrap()
    }

    #[test]
    fn test_resistance_sensitivity_is_shared_path() {
        let topo = series_feeder();
        let sens = preprocess(&topo, &vec![vec![0.0; 3]; 3]).unwrap();

        // R[i][j] = resistance of the common path root→i ∩ root→j
        assert!((sens.r[0][0] - 0.1).abs() < 1e-12);
        assert!((sens.r[0][1] - 0.1).abs() < 1e-12);
        assert!((sens.r[1][1] - 0.4).abs() < 1e-12);

        // A_check is the incidence matrix of the series feeder
        assert!((sens.a_check[0][0] - 1.0).abs() < 1e-12);
        assert!((sens.a_check[0][1] + 1.0).abs() < 1e-12);
        assert!((sens.a_check[1][1] - 1.0).abs() < 1e-12);
        assert_eq!(sens.risk_scale, 0.0);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = vec![vec![4.0, 1.0], vec![2.0, 3.0]];
        let inv = invert(&m, "M").unwrap();
        assert!((inv[0][0] - 0.3).abs() < 1e-12);
        assert!((inv[0][1] + 0.1).abs() < 1e-12);
        assert!((inv[1][0] + 0.2).abs() < 1e-12);
        assert!((inv[1][1] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_singular_inverse_fails() {
        let m = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(matches!(invert(&m, "M"), Err(OpfError::NumericalIssue(_))));
    }

    #[test]
    fn test_sqrt_of_diagonal() {
        let m = vec![vec![4.0, 0.0], vec![0.0, 9.0]];
        let root = psd_sqrt(&m, "Σ").unwrap();
        assert!((root[0][0] - 2.0).abs() < 1e-12);
        assert!((root[1][1] - 3.0).abs() < 1e-12);
        assert!(root[0][1].abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_squares_back() {
        let m = vec![vec![2.0, 0.5], vec![0.5, 1.0]];
        let root = psd_sqrt(&m, "Σ").unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let sq: f64 = (0..2).map(|k| root[i][k] * root[k][j]).sum();
                assert!((sq - m[i][j]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_indefinite_covariance_rejected() {
        let m = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(matches!(psd_sqrt(&m, "Σ"), Err(OpfError::NumericalIssue(_))));
    }

    #[test]
    fn test_zero_resistance_rejected() {
        let buses = vec![
            Bus::new(BusId::new(0), "sub"),
            Bus::new(BusId::new(1), "b1").with_ancestor(BusId::new(0)),
        ];
        let lines = vec![Line::new(BusId::new(1), 0.0, 0.2)];
        let topo = Topology::new(buses, lines).unwrap();
        let err = preprocess(&topo, &vec![vec![0.0; 2]; 2]).unwrap_err();
        assert!(err.to_string().contains("not positive definite"));
    }

    #[test]
    fn test_risk_scale_ignores_reference_row() {
        let topo = series_feeder();
        let sigma = vec![
            vec![100.0, 0.0, 0.0],
            vec![0.0, 0.04, 0.01],
            vec![0.0, 0.01, 0.09],
        ];
        let sens = preprocess(&topo, &sigma).unwrap();
        assert!((sens.risk_scale - 0.15_f64.sqrt()).abs() < 1e-12);
        assert_eq!(sens.sigma_rt.len(), 2);
    }
}
