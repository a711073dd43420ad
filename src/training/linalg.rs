//! Small dense solvers used by the linear estimators

use crate::error::{EasyMlError, Result};
use ndarray::{Array1, Array2};

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Solve the symmetric system `A x = b`.
///
/// A matrix that is not numerically positive definite gets a growing ridge on
/// its diagonal until the factorization succeeds, which yields the minimum-norm
/// flavoured solution for collinear inputs.
pub(crate) fn solve_symmetric(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(EasyMlError::ShapeError {
            expected: format!("{}x{} system", n, n),
            actual: format!("{}x{} matrix, {} rhs", a.nrows(), a.ncols(), b.len()),
        });
    }
    if let Some(l) = cholesky(a) {
        return Ok(substitute(&l, b));
    }

    let scale = (a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64).max(1.0);
    let mut ridge = 1e-10 * scale;
    for _ in 0..12 {
        let mut regularized = a.clone();
        for k in 0..n {
            regularized[[k, k]] += ridge;
        }
        if let Some(l) = cholesky(&regularized) {
            return Ok(substitute(&l, b));
        }
        ridge *= 10.0;
    }

    Err(EasyMlError::ComputationError(
        "matrix is singular, cannot solve linear system".to_string(),
    ))
}

/// Least squares `min ||X w - y||` through the normal equations
pub(crate) fn least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    solve_symmetric(&xtx, &xty)
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and the matrix whose columns are the matching
/// eigenvectors, both in no particular order.
pub(crate) fn symmetric_eigen(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut m = a.clone();
    let mut v = Array2::eye(n);

    for _sweep in 0..100 {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += m[[p, q]] * m[[p, q]];
            }
        }
        if off < 1e-22 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq.abs() < 1e-300 {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (m.diag().to_owned(), v)
}

/// Moore-Penrose inverse of a symmetric positive semi-definite matrix.
/// Eigenvalues below `rtol * max_eigenvalue` are treated as zero.
pub(crate) fn symmetric_pinv(a: &Array2<f64>, rtol: f64) -> Array2<f64> {
    let n = a.nrows();
    let (values, vectors) = symmetric_eigen(a);
    let max_value = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let cutoff = rtol * max_value;

    let mut inv = Array2::zeros((n, n));
    for (k, &lambda) in values.iter().enumerate() {
        if lambda.abs() <= cutoff || lambda.abs() == 0.0 {
            continue;
        }
        let vk = vectors.column(k);
        for i in 0..n {
            for j in 0..n {
                inv[[i, j]] += vk[i] * vk[j] / lambda;
            }
        }
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_spd_system() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let x = solve_symmetric(&a, &b).unwrap();
        let residual = a.dot(&x) - &b;
        assert!(residual.iter().all(|r| r.abs() < 1e-10));
    }

    #[test]
    fn test_singular_system_falls_back_to_ridge() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![2.0, 2.0];
        let x = solve_symmetric(&a, &b).unwrap();
        assert!((x[0] + x[1] - 2.0).abs() < 1e-4, "x = {:?}", x);
    }

    #[test]
    fn test_symmetric_eigen_reconstructs() {
        let a = array![[2.0, 1.0, 0.0], [1.0, 2.0, 1.0], [0.0, 1.0, 2.0]];
        let (values, vectors) = symmetric_eigen(&a);
        let rebuilt = vectors.dot(&Array2::from_diag(&values)).dot(&vectors.t());
        for (x, y) in rebuilt.iter().zip(a.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pinv_of_rank_deficient_matrix() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let pinv = symmetric_pinv(&a, 1e-10);
        // pinv([[1,1],[1,1]]) = [[0.25,0.25],[0.25,0.25]]
        for v in pinv.iter() {
            assert!((v - 0.25).abs() < 1e-9);
        }
    }
}
