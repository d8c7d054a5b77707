use rand::seq::SliceRandom;

use crate::error::DataError;
use crate::math::tensor::Tensor;

/// One mini-batch: inputs with a leading batch axis and matching targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub input: Tensor,
    pub target: Tensor,
}

/// Anything that can yield one epoch's worth of batches.
///
/// `batches` is called once per epoch (training sources) or once per
/// evaluation pass (validation sources); each call starts a fresh pass.
pub trait BatchSource: Send {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_>;
}

/// Samples held in memory, cut into batches of `batch_size` rows.
///
/// Targets are either one value per sample (`[N]`, e.g. class indices) or
/// one row per sample (`[N, k]`).
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    inputs: Tensor,
    targets: Tensor,
    batch_size: usize,
    shuffle: bool,
}

impl InMemoryDataset {
    pub fn new(inputs: Tensor, targets: Tensor, batch_size: usize) -> Result<InMemoryDataset, DataError> {
        if batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        if inputs.ndim() == 0 || targets.ndim() == 0 || inputs.rows() != targets.rows() {
            return Err(DataError::LengthMismatch { inputs: inputs.rows(), targets: targets.rows() });
        }
        Ok(InMemoryDataset { inputs, targets, batch_size, shuffle: false })
    }

    /// Feature rows with one integer class per row.
    pub fn from_rows(features: &[Vec<f64>], classes: &[usize], batch_size: usize) -> Result<InMemoryDataset, DataError> {
        if features.len() != classes.len() {
            return Err(DataError::LengthMismatch { inputs: features.len(), targets: classes.len() });
        }
        if features.is_empty() {
            return Err(DataError::Empty);
        }
        let inputs = Tensor::from_rows(features)?;
        let targets = Tensor::from_slice(&classes.iter().map(|&c| c as f64).collect::<Vec<_>>());
        InMemoryDataset::new(inputs, targets, batch_size)
    }

    /// Reshuffles sample order at the start of every pass.
    pub fn with_shuffle(mut self, shuffle: bool) -> InMemoryDataset {
        self.shuffle = shuffle;
        self
    }

    pub fn len(&self) -> usize {
        self.inputs.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches one pass yields (the last one may be short).
    pub fn batch_count(&self) -> usize {
        (self.len() + self.batch_size - 1) / self.batch_size
    }

    /// Splits off the trailing `fraction` of samples as a validation set.
    ///
    /// Samples are shuffled once before splitting when shuffling is enabled.
    /// Both halves keep this dataset's batch size and shuffle flag.
    pub fn split(self, fraction: f64) -> (InMemoryDataset, InMemoryDataset) {
        let n = self.len();
        let n_val = ((n as f64) * fraction.clamp(0.0, 1.0)).round() as usize;
        let mut order: Vec<usize> = (0..n).collect();
        if self.shuffle {
            order.shuffle(&mut rand::thread_rng());
        }
        let (train_idx, val_idx) = order.split_at(n - n_val);
        let part = |idx: &[usize]| InMemoryDataset {
            inputs: self.inputs.select_rows(idx),
            targets: self.targets.select_rows(idx),
            batch_size: self.batch_size,
            shuffle: self.shuffle,
        };
        (part(train_idx), part(val_idx))
    }
}

impl BatchSource for InMemoryDataset {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if self.shuffle {
            order.shuffle(&mut rand::thread_rng());
        }
        let chunks: Vec<Vec<usize>> = order.chunks(self.batch_size).map(|c| c.to_vec()).collect();
        Box::new(chunks.into_iter().map(move |idx| Batch {
            input: self.inputs.select_rows(&idx),
            target: self.targets.select_rows(&idx),
        }))
    }
}
