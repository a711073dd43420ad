//! Nearest centroid classifier

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::models::{check_n_features, check_xy, class_index, sorted_classes, Model, Task};
use crate::error::{EasyMlError, Result};

/// Assigns each sample the label of the closest class mean (Euclidean)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearestCentroid {
    classes: Vec<f64>,
    /// `n_classes x n_features`
    centroids: Option<Array2<f64>>,
}

impl NearestCentroid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }
}

impl Model for NearestCentroid {
    fn task(&self) -> Task {
        Task::Classification
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let classes = sorted_classes(y);
        let mut sums: Array2<f64> = Array2::zeros((classes.len(), x.ncols()));
        let mut counts = vec![0usize; classes.len()];

        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            if let Some(c) = class_index(&classes, label) {
                let mut sum = sums.row_mut(c);
                sum += &row;
                counts[c] += 1;
            }
        }
        for (mut sum, &count) in sums.rows_mut().into_iter().zip(counts.iter()) {
            sum /= count as f64;
        }

        self.classes = classes;
        self.centroids = Some(sums);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let centroids = self.centroids.as_ref().ok_or(EasyMlError::ModelNotFitted)?;
        check_n_features(centroids.ncols(), x)?;

        Ok(x.rows()
            .into_iter()
            .map(|sample| {
                let mut best = 0;
                let mut best_dist = f64::INFINITY;
                for (c, centroid) in centroids.rows().into_iter().enumerate() {
                    let dist: f64 = sample
                        .iter()
                        .zip(centroid.iter())
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum();
                    // Strict comparison keeps the lowest class on ties
                    if dist < best_dist {
                        best = c;
                        best_dist = dist;
                    }
                }
                self.classes[best]
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_centroids_are_class_means() {
        let x = array![[0.0, 0.0], [2.0, 2.0], [10.0, 10.0], [12.0, 12.0]];
        let y = array![1.0, 1.0, 5.0, 5.0];

        let mut clf = NearestCentroid::new();
        clf.fit(&x, &y).unwrap();

        let centroids = clf.centroids().unwrap();
        assert_eq!(centroids.row(0).to_vec(), vec![1.0, 1.0]);
        assert_eq!(centroids.row(1).to_vec(), vec![11.0, 11.0]);
        assert_eq!(clf.predict(&array![[3.0, 3.0], [9.0, 8.0]]).unwrap(), array![1.0, 5.0]);
    }

    #[test]
    fn test_equidistant_sample_takes_lowest_class() {
        let x = array![[0.0], [2.0]];
        let y = array![3.0, 1.0];

        let mut clf = NearestCentroid::new();
        clf.fit(&x, &y).unwrap();
        assert_eq!(clf.predict(&array![[1.0]]).unwrap()[0], 1.0);
    }

    #[test]
    fn test_predict_before_fit() {
        assert!(NearestCentroid::new().predict(&array![[1.0]]).is_err());
    }
}
