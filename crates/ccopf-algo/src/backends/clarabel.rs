//! Clarabel interior-point backend.
//!
//! Clarabel solves
//!
//! ```text
//!   minimize    ½ x'Px + q'x
//!   subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! which is exactly the row convention of [`ConicModel`]. The export adds
//! `P = 0` and, after the model's own rows, one nonnegative block holding the
//! sign restrictions of nonnegative variable groups (`s = x ≥ 0`).

use clarabel::{
    algebra::CscMatrix,
    solver::{DefaultSettingsBuilder, IPSolver, SupportedConeT},
};
use tracing::{debug, info};
use web_time::Instant;

use super::ModelSolution;
use crate::model::{ConeBlock, ConicModel};
use crate::opf::CcOpfModel;
use crate::OpfError;

/// Problem data in Clarabel's native form.
pub struct ClarabelProblem {
    pub p: CscMatrix<f64>,
    pub q: Vec<f64>,
    pub a: CscMatrix<f64>,
    pub b: Vec<f64>,
    pub cones: Vec<SupportedConeT<f64>>,
}

pub fn to_clarabel(model: &ConicModel) -> ClarabelProblem {
    let n_var = model.num_variables();

    // Entries are accumulated per column, then flattened into CSC.
    let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_var];
    let mut b = Vec::with_capacity(model.num_rows());
    for (r, row) in model.rows().iter().enumerate() {
        for &(col, val) in &row.coeffs {
            columns[col].push((r, val));
        }
        b.push(row.rhs);
    }

    let mut cones: Vec<SupportedConeT<f64>> = model
        .cones()
        .iter()
        .map(|cone| match *cone {
            ConeBlock::Zero(n) => SupportedConeT::ZeroConeT(n),
            ConeBlock::Nonnegative(n) => SupportedConeT::NonnegativeConeT(n),
            ConeBlock::SecondOrder(n) => SupportedConeT::SecondOrderConeT(n),
        })
        .collect();

    let mut n_bounds = 0;
    for block in model.variable_blocks().iter().filter(|b| b.nonnegative) {
        for id in block.ids() {
            columns[id.index()].push((b.len(), -1.0));
            b.push(0.0);
            n_bounds += 1;
        }
    }
    if n_bounds > 0 {
        cones.push(SupportedConeT::NonnegativeConeT(n_bounds));
    }

    let n_rows = b.len();
    let mut col_ptr = Vec::with_capacity(n_var + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    for col in columns.iter_mut() {
        col_ptr.push(row_idx.len());
        // duplicate (row, col) entries are summed so CSC stays canonical
        col.sort_by_key(|(r, _)| *r);
        let mut last: Option<usize> = None;
        for &(r, v) in col.iter() {
            if last == Some(r) {
                if let Some(prev) = values.last_mut() {
                    *prev += v;
                }
            } else {
                row_idx.push(r);
                values.push(v);
                last = Some(r);
            }
        }
    }
    col_ptr.push(row_idx.len());

    ClarabelProblem {
        p: CscMatrix::new(n_var, n_var, vec![0; n_var + 1], vec![], vec![]),
        q: model.objective_coefficients(),
        a: CscMatrix::new(n_rows, n_var, col_ptr, row_idx, values),
        b,
        cones,
    }
}

/// Solve a built model with Clarabel. Verbosity follows `output_level`.
///
/// # Errors
///
/// [`OpfError::Solver`] when Clarabel rejects the problem data or ends in a
/// status other than solved / almost solved.
pub fn solve(built: &CcOpfModel) -> Result<ModelSolution, OpfError> {
    let start = Instant::now();
    let problem = to_clarabel(&built.model);
    debug!(
        variables = problem.q.len(),
        rows = problem.b.len(),
        cones = problem.cones.len(),
        "exported model to Clarabel"
    );

    let settings = DefaultSettingsBuilder::default()
        .verbose(built.metadata.output_level > 0)
        .build()
        .map_err(|e| OpfError::Solver(format!("Clarabel settings error: {:?}", e)))?;

    let mut solver = clarabel::solver::DefaultSolver::new(
        &problem.p,
        &problem.q,
        &problem.a,
        &problem.b,
        &problem.cones,
        settings,
    )
    .map_err(|e| OpfError::Solver(format!("Clarabel initialization failed: {:?}", e)))?;

    solver.solve();

    let sol = solver.solution;
    info!(status = ?sol.status, iterations = sol.iterations, "Clarabel finished");
    if !matches!(
        sol.status,
        clarabel::solver::SolverStatus::Solved | clarabel::solver::SolverStatus::AlmostSolved
    ) {
        return Err(OpfError::Solver(format!(
            "Clarabel returned status {:?}; the feeder may be infeasible \
             (load beyond generation, voltage band too tight) or badly scaled",
            sol.status
        )));
    }

    Ok(ModelSolution {
        status: format!("{:?}", sol.status),
        objective_value: sol.obj_val,
        iterations: sol.iterations as usize,
        solve_time_ms: start.elapsed().as_millis(),
        x: sol.x.clone(),
        z: sol.z.clone(),
    })
}
