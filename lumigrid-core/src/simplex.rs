//! Dense Two-Phase Simplex Solver
//!
//! ## Overview
//!
//! Solves the small linear programs the dimming planner produces:
//!
//! ```text
//! minimize    c · x
//! subject to  G · x ≤ h        (elementwise)
//!             l ≤ x ≤ u        (u may be +∞)
//! ```
//!
//! Problem sizes here are tiny (a room has single-digit sensors and bulbs,
//! so tens of rows and columns at most), which makes a dense tableau the
//! right tool: no sparsity bookkeeping, predictable memory, and easy
//! auditing against hand-worked examples.
//!
//! ## Algorithm
//!
//! Standard two-phase primal simplex on a row-major tableau:
//!
//! 1. Shift variables by their lower bounds and add each finite upper bound
//!    as an explicit constraint row, giving `D·y + s = b, y ≥ 0, s ≥ 0`.
//! 2. Rows with negative `b` are negated and given an artificial variable;
//!    phase 1 minimizes the sum of artificials. A positive phase-1 optimum
//!    means the program is infeasible.
//! 3. Artificials still basic at zero are pivoted out (or their redundant
//!    rows dropped), artificial columns are removed, and phase 2 minimizes
//!    the real objective.
//!
//! Pivoting uses Bland's rule (lowest eligible index), which rules out
//! cycling; an iteration cap backstops against numerical stalls. Arithmetic
//! runs in `f64` internally regardless of the `f32` API, so illuminance
//! scales in the hundreds keep comfortable headroom.

use alloc::vec;
use alloc::vec::Vec;

use thiserror_no_std::Error;

/// Result type for solver operations
pub type SolveResult<T> = Result<T, SolveError>;

/// Pivot cap; Bland's rule terminates long before this on sane inputs
const MAX_PIVOTS: usize = 10_000;

/// Reduced-cost threshold for entering-variable selection
const COST_TOL: f64 = 1e-9;

/// Pivot-element threshold for the ratio test
const PIVOT_TOL: f64 = 1e-9;

/// Solver failures
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SolveError {
    /// No point satisfies the constraints within bounds
    #[error("No feasible solution")]
    Infeasible,

    /// Objective decreases without limit inside the feasible region
    #[error("Objective is unbounded")]
    Unbounded,

    /// Pivot cap reached; indicates a numerically degenerate program
    #[error("Iteration limit reached")]
    IterationLimit,

    /// Input shapes or values are unusable
    #[error("Malformed program: {reason}")]
    BadProgram {
        reason: &'static str,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for SolveError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Infeasible => defmt::write!(fmt, "Infeasible"),
            Self::Unbounded => defmt::write!(fmt, "Unbounded"),
            Self::IterationLimit => defmt::write!(fmt, "Iteration limit"),
            Self::BadProgram { reason } => defmt::write!(fmt, "Malformed program: {}", reason),
        }
    }
}

/// Linear program in inequality form: min c·x, G·x ≤ h, l ≤ x ≤ u
#[derive(Debug, Clone, PartialEq)]
pub struct LinearProgram {
    /// Cost vector c, one entry per variable
    pub objective: Vec<f32>,
    /// Constraint matrix G, rows are ≤ constraints
    pub constraints: Vec<Vec<f32>>,
    /// Right-hand side h, one entry per constraint row
    pub rhs: Vec<f32>,
    /// Per-variable (lower, upper) bounds; upper may be `f32::INFINITY`
    pub bounds: Vec<(f32, f32)>,
}

/// Optimal point and objective value
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Optimal variable values, clamped into bounds
    pub x: Vec<f32>,
    /// Objective value c·x at the optimum
    pub objective: f32,
}

impl LinearProgram {
    fn validate(&self) -> SolveResult<()> {
        let n = self.objective.len();
        if self.bounds.len() != n {
            return Err(SolveError::BadProgram {
                reason: "bounds length != variable count",
            });
        }
        if self.constraints.len() != self.rhs.len() {
            return Err(SolveError::BadProgram {
                reason: "constraint rows != rhs length",
            });
        }
        if self.objective.iter().any(|c| !c.is_finite()) {
            return Err(SolveError::BadProgram {
                reason: "non-finite objective",
            });
        }
        for row in &self.constraints {
            if row.len() != n {
                return Err(SolveError::BadProgram {
                    reason: "constraint row length != variable count",
                });
            }
            if row.iter().any(|g| !g.is_finite()) {
                return Err(SolveError::BadProgram {
                    reason: "non-finite constraint entry",
                });
            }
        }
        if self.rhs.iter().any(|h| !h.is_finite()) {
            return Err(SolveError::BadProgram {
                reason: "non-finite rhs",
            });
        }
        for &(l, u) in &self.bounds {
            if !l.is_finite() || u.is_nan() {
                return Err(SolveError::BadProgram {
                    reason: "non-finite lower bound",
                });
            }
            if l > u {
                return Err(SolveError::BadProgram {
                    reason: "lower bound exceeds upper bound",
                });
            }
        }
        Ok(())
    }
}

/// Solves the program, returning the optimal point or the failure kind
///
/// Infeasibility and unboundedness are ordinary outcomes for the caller to
/// handle (the dimming planner maps infeasibility to its full-brightness
/// fallback), not panics.
pub fn solve(lp: &LinearProgram) -> SolveResult<Solution> {
    lp.validate()?;

    let n = lp.objective.len();
    if n == 0 {
        // Nothing to optimize; constraints reduce to 0 ≤ h
        if lp.rhs.iter().any(|&h| (h as f64) < -feasibility_tol(&lp.rhs)) {
            return Err(SolveError::Infeasible);
        }
        return Ok(Solution {
            x: Vec::new(),
            objective: 0.0,
        });
    }

    let mut tableau = Tableau::build(lp);
    tableau.phase_one(&lp.rhs)?;
    tableau.phase_two(lp)?;
    Ok(tableau.extract(lp))
}

/// Scale-aware feasibility threshold for the phase-1 optimum
fn feasibility_tol(rhs: &[f32]) -> f64 {
    let max_abs = rhs
        .iter()
        .fold(0.0f64, |acc, &h| acc.max(libm::fabs(h as f64)));
    1e-7 * (1.0 + max_abs)
}

/// Row-major simplex tableau
///
/// Column layout: `[shifted variables | slacks | artificials]` with the
/// right-hand side stored as the final entry of each row. `cost` is the
/// reduced-cost row; its final entry is the negated objective value.
struct Tableau {
    rows: Vec<Vec<f64>>,
    cost: Vec<f64>,
    /// Column index of the basic variable for each row
    basis: Vec<usize>,
    /// Structural + slack column count (artificials live past this)
    ncols: usize,
    /// First artificial column; == ncols when none were needed
    art_start: usize,
}

impl Tableau {
    fn build(lp: &LinearProgram) -> Self {
        let n = lp.objective.len();

        // Shifted rhs: h' = h - G·l, and upper-bound rows u' = u - l
        let lower: Vec<f64> = lp.bounds.iter().map(|&(l, _)| l as f64).collect();

        let mut raw_rows: Vec<(Vec<f64>, f64)> = Vec::new();
        for (row, &h) in lp.constraints.iter().zip(lp.rhs.iter()) {
            let coeffs: Vec<f64> = row.iter().map(|&g| g as f64).collect();
            let shift: f64 = coeffs.iter().zip(lower.iter()).map(|(g, l)| g * l).sum();
            raw_rows.push((coeffs, h as f64 - shift));
        }
        for (j, &(l, u)) in lp.bounds.iter().enumerate() {
            if u.is_finite() {
                let mut coeffs = vec![0.0; n];
                coeffs[j] = 1.0;
                raw_rows.push((coeffs, (u - l) as f64));
            }
        }

        let m = raw_rows.len();
        let ncols = n + m;
        let art_count = raw_rows.iter().filter(|(_, b)| *b < 0.0).count();
        let width = ncols + art_count + 1;

        let mut rows = Vec::with_capacity(m);
        let mut basis = Vec::with_capacity(m);
        let mut next_art = ncols;

        for (i, (coeffs, b)) in raw_rows.into_iter().enumerate() {
            let mut row = vec![0.0; width];
            let negate = b < 0.0;
            let sign = if negate { -1.0 } else { 1.0 };

            for (j, g) in coeffs.into_iter().enumerate() {
                row[j] = sign * g;
            }
            row[n + i] = sign; // slack for this row
            row[width - 1] = sign * b;

            if negate {
                row[next_art] = 1.0;
                basis.push(next_art);
                next_art += 1;
            } else {
                basis.push(n + i);
            }
            rows.push(row);
        }

        Tableau {
            rows,
            cost: vec![0.0; width],
            basis,
            ncols,
            art_start: ncols,
        }
    }

    fn width(&self) -> usize {
        self.cost.len()
    }

    fn rhs_col(&self) -> usize {
        self.width() - 1
    }

    /// Minimizes the sum of artificials; errs if the optimum stays positive
    fn phase_one(&mut self, rhs: &[f32]) -> SolveResult<()> {
        let width = self.width();
        if self.art_start + 1 == width {
            return Ok(()); // no artificials, initial slack basis is feasible
        }

        // w-row: +1 on artificials, then eliminate the basic ones
        for j in self.art_start..width - 1 {
            self.cost[j] = 1.0;
        }
        for i in 0..self.rows.len() {
            if self.basis[i] >= self.art_start {
                for j in 0..width {
                    self.cost[j] -= self.rows[i][j];
                }
            }
        }

        self.run_pivots()?;

        let objective = -self.cost[self.rhs_col()];
        if objective > feasibility_tol(rhs) {
            return Err(SolveError::Infeasible);
        }

        self.evict_artificials();
        self.drop_artificial_columns();
        Ok(())
    }

    /// Pivots zero-valued basic artificials out; drops redundant rows
    fn evict_artificials(&mut self) {
        let mut i = 0;
        while i < self.rows.len() {
            if self.basis[i] < self.art_start {
                i += 1;
                continue;
            }
            let pivot_col = (0..self.art_start).find(|&j| libm::fabs(self.rows[i][j]) > PIVOT_TOL);
            match pivot_col {
                Some(j) => {
                    self.pivot(i, j);
                    i += 1;
                }
                None => {
                    // Constraint was linearly dependent; row carries nothing
                    self.rows.remove(i);
                    self.basis.remove(i);
                }
            }
        }
    }

    fn drop_artificial_columns(&mut self) {
        let rhs = self.rhs_col();
        let art_start = self.art_start;
        for row in &mut self.rows {
            let b = row[rhs];
            row.truncate(art_start);
            row.push(b);
        }
        let b = self.cost[rhs];
        self.cost.truncate(art_start);
        self.cost.push(b);
    }

    /// Minimizes the real objective from the feasible basis
    fn phase_two(&mut self, lp: &LinearProgram) -> SolveResult<()> {
        let width = self.width();
        let rhs = self.rhs_col();
        let n = lp.objective.len();

        for j in 0..width {
            self.cost[j] = 0.0;
        }
        for (j, &c) in lp.objective.iter().enumerate() {
            self.cost[j] = c as f64;
        }
        for i in 0..self.rows.len() {
            let c_basic = if self.basis[i] < n {
                lp.objective[self.basis[i]] as f64
            } else {
                0.0
            };
            if c_basic != 0.0 {
                for j in 0..=rhs {
                    self.cost[j] -= c_basic * self.rows[i][j];
                }
            }
        }

        self.run_pivots()
    }

    /// Bland's-rule pivot loop shared by both phases
    fn run_pivots(&mut self) -> SolveResult<()> {
        for _ in 0..MAX_PIVOTS {
            let entering = match self.entering_column() {
                Some(j) => j,
                None => return Ok(()),
            };
            let leaving = self
                .leaving_row(entering)
                .ok_or(SolveError::Unbounded)?;
            self.pivot(leaving, entering);
        }
        Err(SolveError::IterationLimit)
    }

    /// Lowest-index column with negative reduced cost
    ///
    /// Artificial columns are excluded: once an artificial leaves the basis
    /// it never comes back, which keeps phase 1 finite under Bland's rule.
    fn entering_column(&self) -> Option<usize> {
        (0..self.art_start).find(|&j| self.cost[j] < -COST_TOL)
    }

    /// Ratio test with Bland tie-breaking on the basic variable index
    fn leaving_row(&self, entering: usize) -> Option<usize> {
        let rhs = self.rhs_col();
        let mut best: Option<(usize, f64)> = None;

        for (i, row) in self.rows.iter().enumerate() {
            let coeff = row[entering];
            if coeff <= PIVOT_TOL {
                continue;
            }
            let ratio = row[rhs] / coeff;
            best = match best {
                None => Some((i, ratio)),
                Some((bi, br)) => {
                    if ratio < br - PIVOT_TOL
                        || (libm::fabs(ratio - br) <= PIVOT_TOL && self.basis[i] < self.basis[bi])
                    {
                        Some((i, ratio))
                    } else {
                        Some((bi, br))
                    }
                }
            };
        }
        best.map(|(i, _)| i)
    }

    fn pivot(&mut self, r: usize, c: usize) {
        let width = self.width();
        let scale = self.rows[r][c];
        for j in 0..width {
            self.rows[r][j] /= scale;
        }

        for i in 0..self.rows.len() {
            if i == r {
                continue;
            }
            let factor = self.rows[i][c];
            if factor != 0.0 {
                for j in 0..width {
                    self.rows[i][j] -= factor * self.rows[r][j];
                }
            }
        }
        let factor = self.cost[c];
        if factor != 0.0 {
            for j in 0..width {
                self.cost[j] -= factor * self.rows[r][j];
            }
        }

        self.basis[r] = c;
    }

    /// Reads the optimal point back out of the basis
    fn extract(&self, lp: &LinearProgram) -> Solution {
        let n = lp.objective.len();
        let rhs = self.rhs_col();

        let mut shifted = vec![0.0f64; n];
        for (i, &basic) in self.basis.iter().enumerate() {
            if basic < n {
                shifted[basic] = self.rows[i][rhs];
            }
        }

        let mut x = Vec::with_capacity(n);
        let mut objective = 0.0f64;
        for (j, &(l, u)) in lp.bounds.iter().enumerate() {
            let mut value = l as f64 + shifted[j];
            // Clean up pivot roundoff at the box edges
            value = value.max(l as f64);
            if u.is_finite() {
                value = value.min(u as f64);
            }
            objective += lp.objective[j] as f64 * value;
            x.push(value as f32);
        }

        Solution {
            x,
            objective: objective as f32,
        }
    }
}
