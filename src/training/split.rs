//! Shuffled train/test partitioning

use crate::error::{EasyMlError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

/// Conventional held-out fraction
pub const DEFAULT_TEST_SIZE: f64 = 0.25;

/// Row indices of a single train/test partition
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Materialized tables of a [`HoldoutSplit`]
#[derive(Debug, Clone)]
pub struct SplitData {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

impl HoldoutSplit {
    /// Shuffle `n_samples` row indices and hold out `ceil(n * test_size)` of them.
    pub fn shuffled<R: Rng + ?Sized>(n_samples: usize, test_size: f64, rng: &mut R) -> Result<Self> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(EasyMlError::invalid_parameter(
                "test_size",
                test_size,
                "must be strictly between 0 and 1",
            ));
        }

        let n_test = (n_samples as f64 * test_size).ceil() as usize;
        if n_test == 0 || n_test >= n_samples {
            return Err(EasyMlError::InsufficientData(format!(
                "{} samples cannot be split into non-empty train and test sets",
                n_samples
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(rng);
        let train_indices = indices.split_off(n_test);

        Ok(Self {
            train_indices,
            test_indices: indices,
        })
    }

    /// Gather the rows of both parts
    pub fn apply(&self, x: &Array2<f64>, y: &Array1<f64>) -> SplitData {
        SplitData {
            x_train: x.select(Axis(0), &self.train_indices),
            x_test: x.select(Axis(0), &self.test_indices),
            y_train: y.select(Axis(0), &self.train_indices),
            y_test: y.select(Axis(0), &self.test_indices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_default_split_is_75_25() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let split = HoldoutSplit::shuffled(100, DEFAULT_TEST_SIZE, &mut rng).unwrap();
        assert_eq!(split.test_indices.len(), 25);
        assert_eq!(split.train_indices.len(), 75);

        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible_with_seed() {
        let a = HoldoutSplit::shuffled(40, 0.25, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        let b = HoldoutSplit::shuffled(40, 0.25, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tiny_dataset_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            HoldoutSplit::shuffled(1, 0.25, &mut rng),
            Err(EasyMlError::InsufficientData(_))
        ));
        assert!(HoldoutSplit::shuffled(2, 0.25, &mut rng).is_ok());
    }

    #[test]
    fn test_apply_keeps_rows_aligned() {
        let x = Array2::from_shape_fn((8, 2), |(i, j)| (i * 10 + j) as f64);
        let y = Array1::from_iter((0..8).map(|i| i as f64));
        let split = HoldoutSplit::shuffled(8, 0.25, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        let data = split.apply(&x, &y);

        for (row, target) in data.x_test.rows().into_iter().zip(data.y_test.iter()) {
            assert_eq!(row[0], target * 10.0);
        }
        assert_eq!(data.x_train.nrows(), 6);
    }
}
