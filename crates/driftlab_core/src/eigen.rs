use crate::traits::Scalar;
use nalgebra::DMatrix;
use num_complex::Complex;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EigenError {
    #[error("matrix is {rows}x{cols}; eigenvalues need a square matrix")]
    NonSquare { rows: usize, cols: usize },
    #[error("matrix contains non-finite entries")]
    NonFinite,
    #[error("QR iteration did not converge after {iterations} sweeps")]
    NoConvergence { iterations: usize },
}

/// Eigenvalues of a real square matrix, sorted by real part (largest first).
///
/// Works in the matrix's own precision: Householder reduction to upper Hessenberg
/// form followed by Francis double-shift QR with deflation. Complex eigenvalues
/// come in conjugate pairs, positive imaginary part first.
pub fn eigenvalues<T: Scalar>(matrix: &DMatrix<T>) -> Result<Vec<Complex<T>>, EigenError> {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        return Err(EigenError::NonSquare { rows, cols });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(EigenError::NonFinite);
    }

    let n = rows;
    let mut values = match n {
        0 => Vec::new(),
        1 => vec![Complex::new(matrix[(0, 0)], T::zero())],
        2 => block_eigenvalues(
            matrix[(0, 0)],
            matrix[(0, 1)],
            matrix[(1, 0)],
            matrix[(1, 1)],
        )
        .to_vec(),
        _ => {
            let mut h: Vec<Vec<T>> = (0..n)
                .map(|i| (0..n).map(|j| matrix[(i, j)]).collect())
                .collect();
            reduce_to_hessenberg(&mut h);
            francis_qr(&mut h, 30 * n)?;
            read_quasi_triangular(&h)
        }
    };

    values.sort_by(|a, b| {
        b.re.partial_cmp(&a.re)
            .unwrap_or(Ordering::Equal)
            .then(b.im.partial_cmp(&a.im).unwrap_or(Ordering::Equal))
    });
    Ok(values)
}

/// Largest real part of a spectrum, `-inf` when empty.
pub fn spectral_abscissa<T: Scalar>(values: &[Complex<T>]) -> T {
    values
        .iter()
        .fold(T::neg_infinity(), |acc, lambda| acc.max(lambda.re))
}

/// Closed form for the 2x2 block `[[a, b], [c, d]]`.
fn block_eigenvalues<T: Scalar>(a: T, b: T, c: T, d: T) -> [Complex<T>; 2] {
    let half = T::constant(0.5);
    let mean = (a + d) * half;
    let gap = (a - d) * half;
    let disc = gap * gap + b * c;
    if disc >= T::zero() {
        let root = disc.sqrt();
        let big = if mean >= T::zero() { mean + root } else { mean - root };
        let det = a * d - b * c;
        let small = if big.is_zero() { mean - root } else { det / big };
        let (first, second) = if big >= small { (big, small) } else { (small, big) };
        [
            Complex::new(first, T::zero()),
            Complex::new(second, T::zero()),
        ]
    } else {
        let root = (-disc).sqrt();
        [Complex::new(mean, root), Complex::new(mean, -root)]
    }
}

fn reduce_to_hessenberg<T: Scalar>(a: &mut [Vec<T>]) {
    let n = a.len();
    let two = T::constant(2.0);
    for k in 0..n.saturating_sub(2) {
        let alpha_sq = (k + 1..n).fold(T::zero(), |acc, i| acc + a[i][k] * a[i][k]);
        if alpha_sq.is_zero() {
            continue;
        }
        let x0 = a[k + 1][k];
        let norm = alpha_sq.sqrt();
        let sigma = if x0 >= T::zero() { norm } else { -norm };

        let mut v = vec![T::zero(); n];
        v[k + 1] = x0 + sigma;
        for i in k + 2..n {
            v[i] = a[i][k];
        }
        let vtv = (k + 1..n).fold(T::zero(), |acc, i| acc + v[i] * v[i]);
        if vtv.is_zero() {
            continue;
        }
        let beta = two / vtv;

        for j in k..n {
            let dot = (k + 1..n).fold(T::zero(), |acc, i| acc + v[i] * a[i][j]) * beta;
            for i in k + 1..n {
                a[i][j] = a[i][j] - dot * v[i];
            }
        }
        for row in a.iter_mut() {
            let dot = (k + 1..n).fold(T::zero(), |acc, j| acc + row[j] * v[j]) * beta;
            for j in k + 1..n {
                row[j] = row[j] - dot * v[j];
            }
        }

        a[k + 1][k] = -sigma;
        for row in a.iter_mut().skip(k + 2) {
            row[k] = T::zero();
        }
    }
}

/// Reflector `I - tau * v v^T` with `v = (1, v1, v2)` mapping `(x, y, z)` onto the first axis.
fn reflector<T: Scalar>(x: T, y: T, z: T) -> (T, T, T) {
    let norm = (x * x + y * y + z * z).sqrt();
    if norm.is_zero() {
        return (T::zero(), T::zero(), T::zero());
    }
    let u0 = if x >= T::zero() { x + norm } else { x - norm };
    let v1 = y / u0;
    let v2 = z / u0;
    let tau = T::constant(2.0) / (T::one() + v1 * v1 + v2 * v2);
    (v1, v2, tau)
}

fn negligible<T: Scalar>(sub: T, left: T, right: T) -> bool {
    sub.abs() <= T::epsilon() * (left.abs() + right.abs())
}

/// Reduces an upper Hessenberg matrix to real Schur form in place.
fn francis_qr<T: Scalar>(h: &mut [Vec<T>], max_iterations: usize) -> Result<(), EigenError> {
    let n = h.len();
    let mut iterations = 0;
    let mut since_deflation = 0;
    let mut p = n;

    while p > 2 {
        if negligible(h[p - 1][p - 2], h[p - 2][p - 2], h[p - 1][p - 1]) {
            h[p - 1][p - 2] = T::zero();
            p -= 1;
            since_deflation = 0;
            continue;
        }
        if negligible(h[p - 2][p - 3], h[p - 3][p - 3], h[p - 2][p - 2]) {
            h[p - 2][p - 3] = T::zero();
            p -= 2;
            since_deflation = 0;
            continue;
        }

        iterations += 1;
        since_deflation += 1;
        if iterations > max_iterations {
            return Err(EigenError::NoConvergence { iterations: max_iterations });
        }

        // Start of the active unreduced block.
        let mut q = p - 1;
        while q > 0 {
            if negligible(h[q][q - 1], h[q - 1][q - 1], h[q][q]) {
                h[q][q - 1] = T::zero();
                break;
            }
            q -= 1;
        }

        // Shift polynomial x^2 - s x + t; exceptional shifts break cycles.
        let (s, t) = if since_deflation % 10 == 0 {
            let w = h[p - 1][p - 2].abs() + h[p - 2][p - 3].abs();
            (w + w, w * w)
        } else {
            let (a11, a12) = (h[p - 2][p - 2], h[p - 2][p - 1]);
            let (a21, a22) = (h[p - 1][p - 2], h[p - 1][p - 1]);
            (a11 + a22, a11 * a22 - a12 * a21)
        };

        let (h00, h01) = (h[q][q], h[q][q + 1]);
        let (h10, h11) = (h[q + 1][q], h[q + 1][q + 1]);
        let mut x = h00 * h00 + h01 * h10 - s * h00 + t;
        let mut y = h10 * (h00 + h11 - s);
        let mut z = if q + 2 < p {
            h10 * h[q + 2][q + 1]
        } else {
            T::zero()
        };

        for k in q..p - 1 {
            let wide = k + 2 < p;
            let (v1, v2, tau) = if wide {
                reflector(x, y, z)
            } else {
                reflector(x, y, T::zero())
            };

            let first_col = if k > q { k - 1 } else { k };
            for j in first_col..n {
                let mut dot = h[k][j] + v1 * h[k + 1][j];
                if wide {
                    dot = dot + v2 * h[k + 2][j];
                }
                dot = dot * tau;
                h[k][j] = h[k][j] - dot;
                h[k + 1][j] = h[k + 1][j] - dot * v1;
                if wide {
                    h[k + 2][j] = h[k + 2][j] - dot * v2;
                }
            }

            let last_row = if wide { (k + 4).min(p) } else { p };
            for row in h.iter_mut().take(last_row.min(n)) {
                let mut dot = row[k] + v1 * row[k + 1];
                if wide {
                    dot = dot + v2 * row[k + 2];
                }
                dot = dot * tau;
                row[k] = row[k] - dot;
                row[k + 1] = row[k + 1] - dot * v1;
                if wide {
                    row[k + 2] = row[k + 2] - dot * v2;
                }
            }

            if k + 2 < p - 1 {
                x = h[k + 1][k];
                y = h[k + 2][k];
                z = h[k + 3][k];
            } else if k + 1 < p - 1 {
                x = h[k + 1][k];
                y = h[k + 2][k];
                z = T::zero();
            }
        }

        // Clear round-off fill-in below the subdiagonal.
        for i in 0..n {
            for j in 0..i.saturating_sub(1) {
                if h[i][j].abs() < T::epsilon() * (h[i][i].abs() + h[j][j].abs()) {
                    h[i][j] = T::zero();
                }
            }
        }
    }

    if p == 2 && negligible(h[1][0], h[0][0], h[1][1]) {
        h[1][0] = T::zero();
    }
    Ok(())
}

fn read_quasi_triangular<T: Scalar>(h: &[Vec<T>]) -> Vec<Complex<T>> {
    let n = h.len();
    let mut values = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        if i + 1 < n && !h[i + 1][i].is_zero() {
            values.extend(block_eigenvalues(
                h[i][i],
                h[i][i + 1],
                h[i + 1][i],
                h[i + 1][i + 1],
            ));
            i += 2;
        } else {
            values.push(Complex::new(h[i][i], T::zero()));
            i += 1;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::{eigenvalues, spectral_abscissa, EigenError};
    use crate::double_double::ExtFloat;
    use crate::traits::Scalar;
    use nalgebra::DMatrix;
    use num_complex::Complex;
    use num_traits::Float;

    fn dd(value: f64) -> ExtFloat {
        ExtFloat::from(value)
    }

    fn sorted(mut values: Vec<Complex<f64>>) -> Vec<Complex<f64>> {
        values.sort_by(|a, b| {
            b.re.partial_cmp(&a.re)
                .unwrap()
                .then(b.im.partial_cmp(&a.im).unwrap())
        });
        values
    }

    fn assert_spectra_match(ours: &[Complex<f64>], reference: &[Complex<f64>], tol: f64) {
        assert_eq!(ours.len(), reference.len());
        let mut remaining = reference.to_vec();
        for lambda in ours {
            let (idx, dist) = remaining
                .iter()
                .enumerate()
                .map(|(i, r)| (i, (r - lambda).norm() / (1.0 + r.norm())))
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .unwrap();
            assert!(dist < tol, "eigenvalue {lambda} unmatched (distance {dist})");
            remaining.swap_remove(idx);
        }
    }

    #[test]
    fn matches_nalgebra_on_dense_matrices() {
        let matrices = [
            DMatrix::from_row_slice(3, 3, &[2.0, -1.0, 0.5, 1.0, 0.0, 3.0, -2.0, 1.5, 1.0]),
            DMatrix::from_row_slice(
                4,
                4,
                &[
                    0.3, 1.2, -0.7, 2.0, -1.1, 0.4, 0.9, -0.2, 1.7, -0.6, 0.1, 0.8, 0.5, 2.2,
                    -1.4, -0.9,
                ],
            ),
            DMatrix::from_fn(6, 6, |i, j| ((i * 7 + j * 3) % 5) as f64 - 2.0 + 0.1 * j as f64),
        ];
        for m in &matrices {
            let ours = eigenvalues(m).unwrap();
            let reference = sorted(m.complex_eigenvalues().iter().copied().collect());
            assert_spectra_match(&ours, &reference, 1e-10);
        }
    }

    #[test]
    fn handles_small_closed_forms() {
        let rotation = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]);
        let values = eigenvalues(&rotation).unwrap();
        assert_eq!(values, vec![Complex::new(0.0, 1.0), Complex::new(0.0, -1.0)]);

        let triangular = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, -1.0]);
        let values = eigenvalues(&triangular).unwrap();
        assert_eq!(values, vec![Complex::new(1.0, 0.0), Complex::new(-1.0, 0.0)]);

        let scalar = DMatrix::from_element(1, 1, -4.5);
        assert_eq!(eigenvalues(&scalar).unwrap(), vec![Complex::new(-4.5, 0.0)]);
    }

    #[test]
    fn repeated_and_zero_eigenvalues() {
        let minus_identity = DMatrix::from_diagonal_element(3, 3, -1.0);
        let values = eigenvalues(&minus_identity).unwrap();
        assert!(values.iter().all(|l| l.re == -1.0 && l.im == 0.0));

        // Rank-one matrix with eigenvalues {0, 0, -0.4}.
        let q1 = 0.3;
        let q2 = 1.0 - q1;
        let m = DMatrix::from_row_slice(3, 3, &[0.0, 0.0, -q1, 0.0, 0.0, q2, 0.0, 0.0, q1 - q2]);
        let values = eigenvalues(&m).unwrap();
        assert!(values[0].re.abs() < 1e-14 && values[1].re.abs() < 1e-14);
        assert!((values[2].re + 0.4).abs() < 1e-14);
    }

    #[test]
    fn extended_precision_companion_roots() {
        // Companion matrix of (x - 1)(x - 2)(x - 3)(x - 4) = x^4 - 10x^3 + 35x^2 - 50x + 24.
        let mut m = DMatrix::from_element(4, 4, dd(0.0));
        m[(0, 0)] = dd(10.0);
        m[(0, 1)] = dd(-35.0);
        m[(0, 2)] = dd(50.0);
        m[(0, 3)] = dd(-24.0);
        for i in 1..4 {
            m[(i, i - 1)] = dd(1.0);
        }
        let values = eigenvalues(&m).unwrap();
        for (lambda, expected) in values.iter().zip([4.0, 3.0, 2.0, 1.0]) {
            let err = (lambda.re - dd(expected)).abs().to_reference();
            assert!(err < 1e-24, "root {expected} off by {err}");
            assert!(lambda.im.abs().to_reference() < 1e-24);
        }
    }

    #[test]
    fn abscissa_picks_largest_real_part() {
        let values = vec![Complex::new(-0.5, 2.0), Complex::new(0.25, 0.0), Complex::new(-3.0, 0.0)];
        assert_eq!(spectral_abscissa(&values), 0.25);
        assert_eq!(spectral_abscissa::<f64>(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn rejects_bad_input() {
        let rect = DMatrix::from_element(2, 3, 1.0);
        assert_eq!(
            eigenvalues(&rect).unwrap_err(),
            EigenError::NonSquare { rows: 2, cols: 3 }
        );
        let mut nan = DMatrix::from_element(3, 3, 1.0);
        nan[(1, 2)] = f64::NAN;
        assert_eq!(eigenvalues(&nan).unwrap_err(), EigenError::NonFinite);
    }
}
