use rand::prelude::*;
use serde::{Serialize, Deserialize};

use crate::error::ShapeError;

/// Dense row-major n-d tensor of `f64`.
///
/// Layers agree on a small set of layouts: `[N, F]` for fully connected
/// data and `[N, C, H, W]` for images. The first axis is always the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; numel(shape)],
        }
    }

    /// Wraps `data` with the given shape; the element count must match.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Tensor, ShapeError> {
        if numel(shape) != data.len() {
            return Err(ShapeError::Size { len: data.len(), shape: shape.to_vec() });
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    /// Stacks equally long rows into an `[N, F]` tensor.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Tensor, ShapeError> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(ShapeError::Mismatch {
                    op: "from_rows",
                    expected: vec![cols],
                    actual: vec![row.len()],
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Tensor { shape: vec![rows.len(), cols], data })
    }

    /// A 1-d tensor, typically a batch of integer class targets.
    pub fn from_slice(values: &[f64]) -> Tensor {
        Tensor { shape: vec![values.len()], data: values.to_vec() }
    }

    /// Samples every element from U(-bound, bound).
    pub fn uniform(shape: &[usize], bound: f64) -> Tensor {
        let mut rng = rand::thread_rng();
        let data = (0..numel(shape))
            .map(|_| rng.gen_range(-bound..=bound))
            .collect();
        Tensor { shape: shape.to_vec(), data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Size of the leading (batch) axis; a 0-d tensor counts as one row.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of elements per leading-axis row.
    pub fn row_len(&self) -> usize {
        if self.shape.is_empty() {
            1
        } else {
            numel(&self.shape[1..])
        }
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let w = self.row_len();
        &self.data[i * w..(i + 1) * w]
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor, ShapeError> {
        Tensor::from_vec(shape, self.data.clone())
    }

    pub fn require_rank(&self, op: &'static str, rank: usize) -> Result<(), ShapeError> {
        if self.ndim() != rank {
            return Err(ShapeError::Rank { op, expected: rank, actual: self.shape.clone() });
        }
        Ok(())
    }

    pub fn require_shape(&self, op: &'static str, shape: &[usize]) -> Result<(), ShapeError> {
        if self.shape != shape {
            return Err(ShapeError::Mismatch {
                op,
                expected: shape.to_vec(),
                actual: self.shape.clone(),
            });
        }
        Ok(())
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Element-wise combination of two same-shape tensors.
    pub fn zip_map<F>(&self, other: &Tensor, op: &'static str, functor: F) -> Result<Tensor, ShapeError>
    where
        F: Fn(f64, f64) -> f64,
    {
        other.require_shape(op, &self.shape)?;
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| functor(a, b)).collect(),
        })
    }

    /// `self += alpha * other`, in place.
    pub fn add_scaled(&mut self, other: &Tensor, alpha: f64) -> Result<(), ShapeError> {
        other.require_shape("add_scaled", &self.shape)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += alpha * b;
        }
        Ok(())
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f64
    }

    /// 2-d matrix product `[m, k] x [k, n] -> [m, n]`.
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor, ShapeError> {
        self.require_rank("matmul", 2)?;
        rhs.require_rank("matmul", 2)?;
        let (m, k) = (self.shape[0], self.shape[1]);
        let n = rhs.shape[1];
        if rhs.shape[0] != k {
            return Err(ShapeError::Mismatch {
                op: "matmul",
                expected: vec![k, n],
                actual: rhs.shape.clone(),
            });
        }

        let mut res = Tensor::zeros(&[m, n]);
        for i in 0..m {
            for p in 0..k {
                let a = self.data[i * k + p];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs.data[p * n..(p + 1) * n];
                let out_row = &mut res.data[i * n..(i + 1) * n];
                for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        Ok(res)
    }

    pub fn transpose(&self) -> Result<Tensor, ShapeError> {
        self.require_rank("transpose", 2)?;
        let (rows, cols) = (self.shape[0], self.shape[1]);
        let mut res = Tensor::zeros(&[cols, rows]);
        for i in 0..rows {
            for j in 0..cols {
                res.data[j * rows + i] = self.data[i * cols + j];
            }
        }
        Ok(res)
    }

    /// Index of the maximum element in every leading-axis row.
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows()).map(|i| argmax(self.row(i))).collect()
    }

    /// Gathers the given leading-axis rows into a new tensor.
    pub fn select_rows(&self, indices: &[usize]) -> Tensor {
        let w = self.row_len();
        let mut data = Vec::with_capacity(indices.len() * w);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        let mut shape = self.shape.clone();
        if shape.is_empty() {
            shape.push(indices.len());
        } else {
            shape[0] = indices.len();
        }
        Tensor { shape, data }
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}

/// Number of elements described by a shape.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Index of the maximum element in a slice; NaNs compare equal.
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
