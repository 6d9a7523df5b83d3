use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::ops::{Add, AddAssign, Mul};

/// Dense row-major matrix. Batches are stored one sample per row, with the
/// sample's channels and voxels flattened along the columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix{
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f64>>
}

impl Matrix{
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Matrix {
        Matrix{
            rows,
            cols,
            data: vec![vec![value; cols]; rows]
        }
    }

    /// Builds a matrix from row vectors. All rows must share one length.
    pub fn from_data(data: Vec<Vec<f64>>) -> Matrix {
        let cols = data.first().map_or(0, |row| row.len());
        assert!(
            data.iter().all(|row| row.len() == cols),
            "Matrix rows must all have the same length"
        );
        Matrix {
            rows: data.len(),
            cols,
            data
        }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
        // Both uniforms live in (0, 1] so ln() never sees zero.
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = 1.0 - rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// Samples every entry from N(0, std_dev).
    pub fn gaussian<R: Rng + ?Sized>(rows: usize, cols: usize, std_dev: f64, rng: &mut R) -> Matrix {
        let mut res = Matrix::zeros(rows, cols);
        for row in res.data.iter_mut() {
            for x in row.iter_mut() {
                *x = Matrix::sample_standard_normal(rng) * std_dev;
            }
        }
        res
    }

    /// He initialization: N(0, sqrt(2 / rows)).
    ///
    /// Weights are stored as (fan_in, fan_out), so `rows` is the fan-in.
    pub fn he<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
        Matrix::gaussian(rows, cols, (2.0 / rows.max(1) as f64).sqrt(), rng)
    }

    /// Xavier (Glorot) initialization: N(0, sqrt(2 / (fan_in + fan_out))).
    pub fn xavier<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
        Matrix::gaussian(rows, cols, (2.0 / (rows + cols).max(1) as f64).sqrt(), rng)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i]
    }

    /// Row-major iterator over every entry.
    pub fn iter(&self) -> impl Iterator<Item = &f64> + '_ {
        self.data.iter().flat_map(|row| row.iter())
    }

    pub fn fill(&mut self, value: f64) {
        for row in self.data.iter_mut() {
            row.iter_mut().for_each(|x| *x = value);
        }
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);

        for i in 0..res.rows {
            for j in 0..res.cols {
                res.data[i][j] = self.data[j][i];
            }
        }

        res
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter()
                .map(|row| row.iter().map(|&x| functor(x)).collect())
                .collect(),
        }
    }

    /// Element-wise combination of two same-shape matrices.
    pub fn zip_map<F>(&self, other: &Matrix, functor: F) -> Matrix
    where
        F: Fn(f64, f64) -> f64,
    {
        assert_eq!(self.shape(), other.shape(), "Matrices are of incorrect sizes");
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(other.data.iter())
                .map(|(a, b)| a.iter().zip(b.iter()).map(|(&x, &y)| functor(x, y)).collect())
                .collect(),
        }
    }

    /// Element-wise (Hadamard) product.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        self.zip_map(other, |a, b| a * b)
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        self.map(|x| x * factor)
    }

    pub fn sum(&self) -> f64 {
        self.iter().sum()
    }

    /// Column sums over all rows, as a (1, cols) matrix.
    pub fn sum_rows(&self) -> Matrix {
        let mut res = Matrix::zeros(1, self.cols);
        for row in &self.data {
            for (acc, x) in res.data[0].iter_mut().zip(row.iter()) {
                *acc += x;
            }
        }
        res
    }

    /// Adds a (1, cols) row vector to every row.
    pub fn add_row(&self, bias: &Matrix) -> Matrix {
        assert_eq!((1, self.cols), bias.shape(), "Bias must be a single row of matching width");
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter()
                .map(|row| row.iter().zip(bias.data[0].iter()).map(|(x, b)| x + b).collect())
                .collect(),
        }
    }

    /// Concatenates matrices with equal row counts along the column axis.
    pub fn hconcat(parts: &[&Matrix]) -> Matrix {
        let rows = parts.first().map_or(0, |m| m.rows);
        assert!(parts.iter().all(|m| m.rows == rows), "Matrices are of incorrect sizes");
        let data = (0..rows)
            .map(|i| parts.iter().flat_map(|m| m.data[i].iter().copied()).collect())
            .collect();
        Matrix {
            rows,
            cols: parts.iter().map(|m| m.cols).sum(),
            data,
        }
    }

    /// Columns `start..end` of every row.
    pub fn columns(&self, start: usize, end: usize) -> Matrix {
        assert!(start <= end && end <= self.cols, "Column range out of bounds");
        Matrix {
            rows: self.rows,
            cols: end - start,
            data: self.data.iter().map(|row| row[start..end].to_vec()).collect(),
        }
    }

    /// Splits the columns into consecutive blocks of the given widths.
    pub fn split_columns(&self, widths: &[usize]) -> Vec<Matrix> {
        assert_eq!(widths.iter().sum::<usize>(), self.cols, "Split widths must cover every column");
        let mut start = 0;
        widths.iter()
            .map(|&w| {
                let part = self.columns(start, start + w);
                start += w;
                part
            })
            .collect()
    }

    /// Rotates rows so that row `i` of the result is row `(i + offset) % rows`.
    pub fn roll_rows(&self, offset: usize) -> Matrix {
        if self.rows == 0 {
            return self.clone();
        }
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: (0..self.rows)
                .map(|i| self.data[(i + offset) % self.rows].clone())
                .collect(),
        }
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix { rows: 0, cols: 0, data: vec![] }
    }
}

impl Add for &Matrix {
    type Output = Matrix;

    fn add(self, rhs: Self) -> Self::Output {
        self.zip_map(rhs, |a, b| a + b)
    }
}

impl AddAssign<&Matrix> for Matrix {
    fn add_assign(&mut self, rhs: &Matrix) {
        if self.shape() != rhs.shape() {
            panic!("Matrices are of incorrect sizes")
        }

        for (row, other) in self.data.iter_mut().zip(rhs.data.iter()) {
            for (x, y) in row.iter_mut().zip(other.iter()) {
                *x += y;
            }
        }
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.cols != rhs.rows {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, rhs.cols);

        for i in 0..res.rows {
            for k in 0..self.cols {
                let a = self.data[i][k];
                if a == 0.0 {
                    continue;
                }
                for j in 0..res.cols {
                    res.data[i][j] += a * rhs.data[k][j];
                }
            }
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_matches_hand_computation() {
        let a = Matrix::from_data(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = Matrix::from_data(vec![vec![5.0], vec![6.0]]);
        assert_eq!(&a * &b, Matrix::from_data(vec![vec![17.0], vec![39.0]]));
    }

    #[test]
    fn hconcat_and_split_are_inverse() {
        let a = Matrix::from_data(vec![vec![1.0], vec![2.0]]);
        let b = Matrix::from_data(vec![vec![3.0, 4.0], vec![5.0, 6.0]]);
        let joined = Matrix::hconcat(&[&a, &b]);
        assert_eq!(joined.shape(), (2, 3));
        let parts = joined.split_columns(&[1, 2]);
        assert_eq!(parts[0], a);
        assert_eq!(parts[1], b);
    }

    #[test]
    fn roll_rows_wraps_around() {
        let m = Matrix::from_data(vec![vec![0.0], vec![1.0], vec![2.0]]);
        let rolled = m.roll_rows(1);
        assert_eq!(rolled.data, vec![vec![1.0], vec![2.0], vec![0.0]]);
        assert_eq!(m.roll_rows(3), m);
    }

    #[test]
    fn sum_rows_collapses_the_batch() {
        let m = Matrix::from_data(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(m.sum_rows().data, vec![vec![4.0, 6.0]]);
        assert_eq!(m.sum(), 10.0);
    }
}
