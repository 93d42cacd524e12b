//! Estimator contract
//!
//! The storage does not train anything itself. Estimators implement these
//! traits and are fed from a [`LabeledDataStorage`] through [`fit_storage`]
//! and friends, which assemble features, targets and weights in one aligned
//! row order.

use ndarray::{Array1, Array2, Axis};
use tracing::{debug, warn};

use crate::columns::frame_to_array2;
use crate::error::{Result, StorageError};
use crate::storage::{LabeledDataStorage, Resolved};

/// Features, targets and weights in one aligned row order
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    pub x: Array2<f64>,
    pub y: Option<Array1<f64>>,
    pub sample_weight: Resolved,
    pub feature_names: Vec<String>,
}

impl TrainingBatch {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    /// Targets, or `MissingTarget` for prediction-only storages
    pub fn targets(&self) -> Result<&Array1<f64>> {
        self.y.as_ref().ok_or(StorageError::MissingTarget)
    }
}

impl LabeledDataStorage {
    /// Collect features, targets and weights.
    ///
    /// `None` selects the configured features, or every column when none
    /// were configured.
    pub fn to_batch(&self, features: Option<&[&str]>) -> Result<TrainingBatch> {
        let data = self.get_features(features)?;
        let feature_names = data
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let y = if self.has_target() {
            Some(self.get_targets()?)
        } else {
            None
        };

        Ok(TrainingBatch {
            x: frame_to_array2(&data)?,
            y,
            sample_weight: self.get_weights(true),
            feature_names,
        })
    }
}

/// Anything trainable with `fit(X, y, sample_weight)`
pub trait Estimator: Send + Sync {
    /// Fit to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: Option<&Array1<f64>>) -> Result<()>;

    /// Whether `fit` honors non-uniform sample weights
    fn supports_weight(&self) -> bool {
        true
    }

    fn is_fitted(&self) -> bool;
}

/// Estimator predicting class probabilities
pub trait Classifier: Estimator {
    /// Class labels, in the column order of `predict_proba`
    fn classes(&self) -> &[f64];

    /// One row per sample, one column per class
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Most probable class per sample
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        let classes = self.classes();
        let labels = proba
            .axis_iter(Axis(0))
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc })
                    .0;
                classes.get(best).copied().ok_or(StorageError::ModelNotFitted)
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Array1::from(labels))
    }
}

/// Estimator predicting continuous values
pub trait Regressor: Estimator {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Estimator that can keep training on new data
pub trait PartialFit: Estimator {
    fn partial_fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: Option<&Array1<f64>>,
    ) -> Result<()>;
}

/// Weights to hand to `estimator`.
///
/// Estimators without weight support accept only uniform unit weights.
fn weights_for<'a, E: Estimator + ?Sized>(estimator: &E, weights: &'a Resolved) -> Result<Option<&'a Array1<f64>>> {
    match weights {
        Resolved::Absent => Ok(None),
        Resolved::Values(w) if estimator.supports_weight() => Ok(Some(w)),
        Resolved::Values(w) => {
            if w.iter().all(|&v| v == 1.0) {
                Ok(None)
            } else {
                warn!(rows = w.len(), "Estimator does not support non-uniform sample weights");
                Err(StorageError::UnsupportedWeights(
                    "sample weights must all be 1 for this estimator".to_string(),
                ))
            }
        }
    }
}

/// Fit `estimator` from a storage
pub fn fit_storage<E: Estimator + ?Sized>(
    estimator: &mut E,
    storage: &LabeledDataStorage,
    features: Option<&[&str]>,
) -> Result<TrainingBatch> {
    let batch = storage.to_batch(features)?;
    let y = batch.targets()?;
    let weights = weights_for(estimator, &batch.sample_weight)?;

    debug!(
        samples = batch.n_samples(),
        features = batch.x.ncols(),
        weighted = weights.is_some(),
        shuffled = storage.is_shuffled(),
        "Fitting estimator from storage"
    );
    estimator.fit(&batch.x, y, weights)?;
    Ok(batch)
}

/// Continue training `estimator` from a storage
pub fn partial_fit_storage<E: PartialFit + ?Sized>(
    estimator: &mut E,
    storage: &LabeledDataStorage,
    features: Option<&[&str]>,
) -> Result<()> {
    let batch = storage.to_batch(features)?;
    let y = batch.targets()?;
    let weights = weights_for(estimator, &batch.sample_weight)?;

    debug!(samples = batch.n_samples(), "Partial fit from storage");
    estimator.partial_fit(&batch.x, y, weights)
}

/// Regression predictions for every storage row, in storage order
pub fn predict_storage<R: Regressor + ?Sized>(
    regressor: &R,
    storage: &LabeledDataStorage,
    features: Option<&[&str]>,
) -> Result<Array1<f64>> {
    if !regressor.is_fitted() {
        return Err(StorageError::ModelNotFitted);
    }
    let x = frame_to_array2(&storage.get_features(features)?)?;
    regressor.predict(&x)
}

/// Class probabilities for every storage row, in storage order
pub fn predict_proba_storage<C: Classifier + ?Sized>(
    classifier: &C,
    storage: &LabeledDataStorage,
    features: Option<&[&str]>,
) -> Result<Array2<f64>> {
    if !classifier.is_fitted() {
        return Err(StorageError::ModelNotFitted);
    }
    let x = frame_to_array2(&storage.get_features(features)?)?;
    classifier.predict_proba(&x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LabeledDataStorage;
    use polars::prelude::*;

    /// Predicts the weighted mean of the training targets
    #[derive(Default)]
    struct MeanRegressor {
        mean: Option<f64>,
        weighted: bool,
        accepts_weights: bool,
    }

    impl Estimator for MeanRegressor {
        fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>, sample_weight: Option<&Array1<f64>>) -> Result<()> {
            self.weighted = sample_weight.is_some();
            let mean = match sample_weight {
                Some(w) => (y * w).sum() / w.sum(),
                None => y.mean().unwrap_or(0.0),
            };
            self.mean = Some(mean);
            Ok(())
        }

        fn supports_weight(&self) -> bool {
            self.accepts_weights
        }

        fn is_fitted(&self) -> bool {
            self.mean.is_some()
        }
    }

    impl Regressor for MeanRegressor {
        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            let mean = self.mean.ok_or(StorageError::ModelNotFitted)?;
            Ok(Array1::from_elem(x.nrows(), mean))
        }
    }

    fn frame() -> DataFrame {
        df!(
            "x" => &[1.0, 2.0, 3.0, 4.0],
            "y" => &[0.0, 0.0, 0.0, 4.0],
            "w" => &[1.0, 1.0, 1.0, 5.0],
        )
        .unwrap()
    }

    #[test]
    fn test_batch_is_aligned() {
        let storage = LabeledDataStorage::new(frame(), "y", "w", 3u64, true).unwrap();
        let batch = storage.to_batch(Some(&["x"][..])).unwrap();
        let y = batch.targets().unwrap();
        let w = batch.sample_weight.values().unwrap();

        for i in 0..batch.n_samples() {
            // the only row with y=4 has x=4 and w=5
            if y[i] == 4.0 {
                assert_eq!(batch.x[[i, 0]], 4.0);
                assert_eq!(w[i], 5.0);
            }
        }
        assert_eq!(batch.feature_names, vec!["x".to_string()]);
    }

    #[test]
    fn test_fit_storage_passes_weights() {
        let storage = LabeledDataStorage::new(frame(), "y", "w", 3u64, false).unwrap();
        let mut model = MeanRegressor { accepts_weights: true, ..Default::default() };
        fit_storage(&mut model, &storage, Some(&["x"][..])).unwrap();
        assert!(model.weighted);
        assert!((model.mean.unwrap() - 20.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_storage_without_weights() {
        let storage = LabeledDataStorage::new(frame(), "y", None::<f64>, 3u64, false).unwrap();
        let mut model = MeanRegressor { accepts_weights: true, ..Default::default() };
        fit_storage(&mut model, &storage, None).unwrap();
        assert!(!model.weighted);
        assert_eq!(model.mean, Some(1.0));
    }

    #[test]
    fn test_unsupported_weights_rejected() {
        let storage = LabeledDataStorage::new(frame(), "y", "w", 3u64, false).unwrap();
        let mut model = MeanRegressor::default();
        let result = fit_storage(&mut model, &storage, None);
        assert!(matches!(result, Err(StorageError::UnsupportedWeights(_))));
    }

    #[test]
    fn test_unit_weights_accepted_without_support() {
        let storage = LabeledDataStorage::new(frame(), "y", 1.0, 3u64, false).unwrap();
        let mut model = MeanRegressor::default();
        fit_storage(&mut model, &storage, None).unwrap();
        assert!(!model.weighted);
    }

    #[test]
    fn test_missing_target_cannot_fit() {
        let storage = LabeledDataStorage::builder(frame())
            .allow_absent_target(true)
            .build()
            .unwrap();
        let mut model = MeanRegressor::default();
        let result = fit_storage(&mut model, &storage, None);
        assert!(matches!(result, Err(StorageError::MissingTarget)));
    }

    #[test]
    fn test_predict_requires_fit() {
        let storage = LabeledDataStorage::new(frame(), "y", None::<f64>, 3u64, false).unwrap();
        let model = MeanRegressor::default();
        let result = predict_storage(&model, &storage, None);
        assert!(matches!(result, Err(StorageError::ModelNotFitted)));
    }
}
