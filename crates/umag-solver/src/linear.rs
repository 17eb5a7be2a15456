//! Iterative solution of the assembled sparse system.
//!
//! The tangent-plane system is nonsymmetric because of the precession
//! term, so the solver is a stabilized bi-conjugate gradient with a
//! diagonal preconditioner rebuilt from the matrix on every call.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use crate::error::{Result, SolverError};

/// Outcome report of one linear solve.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    pub iterations: usize,
    pub residual_norm: Option<f64>,
    pub solver_name: String,
}

/// Preconditioned BiCGStab solver.
#[derive(Debug, Clone)]
pub struct BiCgStab {
    pub max_iter: usize,
    pub tolerance: f64,
}

impl BiCgStab {
    pub fn new(max_iter: usize, tolerance: f64) -> Self {
        BiCgStab {
            max_iter,
            tolerance,
        }
    }

    /// Solve `A x = b` starting from `x = 0`. Convergence is reached when
    /// the preconditioned residual drops below `tolerance * |b|`.
    pub fn solve(
        &self,
        matrix: &CsrMatrix<f64>,
        rhs: &DVector<f64>,
    ) -> Result<(DVector<f64>, SolveInfo)> {
        let n = rhs.len();
        let inv_diag = inverse_diagonal(matrix)?;

        let b_norm = rhs.norm();
        if b_norm == 0.0 {
            return Ok((
                DVector::zeros(n),
                SolveInfo {
                    iterations: 0,
                    residual_norm: Some(0.0),
                    solver_name: "bicgstab-jacobi".to_string(),
                },
            ));
        }
        let target = self.tolerance * b_norm;

        let mut x = DVector::zeros(n);
        let mut r = rhs.clone();
        let r0 = r.clone();
        let mut p = DVector::zeros(n);
        let mut v = DVector::zeros(n);
        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;

        for iter in 1..=self.max_iter {
            let rho_next = r0.dot(&r);
            if rho_next.abs() < f64::MIN_POSITIVE {
                // orthogonality breakdown
                return Err(SolverError::NoConvergence {
                    iterations: iter,
                    residual: r.norm() / b_norm,
                });
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;

            p = &r + beta * (&p - omega * &v);
            let p_hat = scale_by(&inv_diag, &p);
            v = spmv(matrix, &p_hat);

            let r0v = r0.dot(&v);
            if r0v.abs() < f64::MIN_POSITIVE {
                return Err(SolverError::NoConvergence {
                    iterations: iter,
                    residual: r.norm() / b_norm,
                });
            }
            alpha = rho / r0v;
            let s = &r - alpha * &v;
            if s.norm() <= target {
                x += alpha * &p_hat;
                return Ok((x, self.report(iter, s.norm() / b_norm)));
            }

            let s_hat = scale_by(&inv_diag, &s);
            let t = spmv(matrix, &s_hat);
            let tt = t.dot(&t);
            omega = if tt > 0.0 { t.dot(&s) / tt } else { 0.0 };

            x += alpha * &p_hat + omega * &s_hat;
            r = &s - omega * &t;

            if r.norm() <= target {
                return Ok((x, self.report(iter, r.norm() / b_norm)));
            }
            if omega == 0.0 {
                return Err(SolverError::NoConvergence {
                    iterations: iter,
                    residual: r.norm() / b_norm,
                });
            }
        }

        Err(SolverError::NoConvergence {
            iterations: self.max_iter,
            residual: r.norm() / b_norm,
        })
    }

    fn report(&self, iterations: usize, residual: f64) -> SolveInfo {
        SolveInfo {
            iterations,
            residual_norm: Some(residual),
            solver_name: "bicgstab-jacobi".to_string(),
        }
    }
}

/// Sparse matrix-vector product over the CSR rows.
fn spmv(matrix: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(matrix.nrows());
    for (row_idx, row) in matrix.row_iter().enumerate() {
        let mut acc = 0.0;
        for (&col_idx, &value) in row.col_indices().iter().zip(row.values().iter()) {
            acc += value * x[col_idx];
        }
        y[row_idx] = acc;
    }
    y
}

fn scale_by(inv_diag: &DVector<f64>, x: &DVector<f64>) -> DVector<f64> {
    x.component_mul(inv_diag)
}

fn inverse_diagonal(matrix: &CsrMatrix<f64>) -> Result<DVector<f64>> {
    let mut inv = DVector::zeros(matrix.nrows());
    for (row_idx, row) in matrix.row_iter().enumerate() {
        let diag = row
            .col_indices()
            .iter()
            .position(|&c| c == row_idx)
            .map(|pos| row.values()[pos])
            .unwrap_or(0.0);
        if diag == 0.0 {
            return Err(SolverError::ZeroDiagonal(row_idx));
        }
        inv[row_idx] = 1.0 / diag;
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn csr_from(triplets: &[(usize, usize, f64)], n: usize) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for &(i, j, v) in triplets {
            coo.push(i, j, v);
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn solves_diagonal_system() {
        let a = csr_from(&[(0, 0, 2.0), (1, 1, 3.0)], 2);
        let b = DVector::from_vec(vec![4.0, 9.0]);
        let solver = BiCgStab::new(100, 1e-12);
        let (x, info) = solver.solve(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
        assert_eq!(info.solver_name, "bicgstab-jacobi");
        assert!(info.iterations >= 1);
    }

    #[test]
    fn solves_nonsymmetric_system() {
        // A = [4 1 0; -1 4 1; 0 -1 4], x = [1; 2; 3]
        let a = csr_from(
            &[
                (0, 0, 4.0),
                (0, 1, 1.0),
                (1, 0, -1.0),
                (1, 1, 4.0),
                (1, 2, 1.0),
                (2, 1, -1.0),
                (2, 2, 4.0),
            ],
            3,
        );
        let x_ref = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = spmv(&a, &x_ref);
        let solver = BiCgStab::new(200, 1e-12);
        let (x, info) = solver.solve(&a, &b).unwrap();
        assert!((&x - &x_ref).norm() < 1e-9);
        assert!(info.residual_norm.unwrap() <= 1e-12);
    }

    #[test]
    fn zero_rhs_returns_zero() {
        let a = csr_from(&[(0, 0, 1.0), (1, 1, 1.0)], 2);
        let b = DVector::zeros(2);
        let (x, info) = BiCgStab::new(10, 1e-8).solve(&a, &b).unwrap();
        assert_eq!(x.norm(), 0.0);
        assert_eq!(info.iterations, 0);
    }

    #[test]
    fn missing_diagonal_is_reported() {
        let a = csr_from(&[(0, 1, 1.0), (1, 0, 1.0)], 2);
        let b = DVector::from_vec(vec![1.0, 1.0]);
        let err = BiCgStab::new(10, 1e-8).solve(&a, &b).unwrap_err();
        assert!(matches!(err, SolverError::ZeroDiagonal(0)));
    }

    #[test]
    fn reports_no_convergence_when_starved_of_iterations() {
        // larger tridiagonal system, one iteration is not enough
        let n = 50;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 4.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        let a = csr_from(&triplets, n);
        let b = DVector::from_element(n, 1.0);
        let err = BiCgStab::new(1, 1e-14).solve(&a, &b).unwrap_err();
        match err {
            SolverError::NoConvergence {
                iterations,
                residual,
            } => {
                assert_eq!(iterations, 1);
                assert!(residual > 0.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
