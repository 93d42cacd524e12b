//! Estimator check kit
//!
//! Synthetic datasets and generic checks that any [`Classifier`] or
//! [`Regressor`] should pass when trained through a storage. The checks
//! assert (panic) on broken behavior and return `Err` only when the
//! estimator itself errors.

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::error::Result;
use crate::estimator::{
    fit_storage, partial_fit_storage, predict_proba_storage, predict_storage, Classifier, PartialFit, Regressor,
};
use crate::storage::{LabeledDataStorage, Specifier};

/// Options shared by the estimator checks
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub n_samples: usize,
    pub n_features: usize,
    pub n_classes: usize,
    /// Shift between class means, in standard deviations
    pub distance: f64,
    /// Train with the generated sample weights
    pub supports_weight: bool,
    /// Minimum ROC AUC on the training data (binary problems only)
    pub min_auc: f64,
    /// Largest accepted MSE as a fraction of the target variance
    pub max_relative_mse: f64,
    /// Largest probability difference between a complete fit and a fit
    /// continued with `partial_fit`
    pub partial_fit_tolerance: f64,
    pub seed: u64,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            n_samples: 500,
            n_features: 5,
            n_classes: 2,
            distance: 1.5,
            supports_weight: true,
            min_auc: 0.6,
            max_relative_mse: 1.0,
            partial_fit_tolerance: 1e-6,
            seed: 42,
        }
    }
}

impl CheckOptions {
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    pub fn with_supports_weight(mut self, supports_weight: bool) -> Self {
        self.supports_weight = supports_weight;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    pub fn with_partial_fit_tolerance(mut self, tolerance: f64) -> Self {
        self.partial_fit_tolerance = tolerance;
        self
    }
}

fn feature_frame(x: &Array2<f64>) -> Result<DataFrame> {
    let columns: Vec<Column> = x
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(j, col)| Column::new(format!("column{}", j).into(), col.to_vec()))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Normally distributed features shifted by `label * distance`.
///
/// Returns `(features, labels, weights)` with labels in `0..n_classes` and
/// weights uniform in `[0, 1)`.
pub fn generate_classification_data(
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    distance: f64,
    seed: u64,
) -> Result<(DataFrame, Array1<f64>, Array1<f64>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_classes = n_classes.max(1);

    let y: Array1<f64> = (0..n_samples)
        .map(|_| rng.gen_range(0..n_classes) as f64)
        .collect();
    let x = Array2::from_shape_fn((n_samples, n_features), |(i, _)| {
        let noise: f64 = rng.sample(StandardNormal);
        noise + y[i] * distance
    });
    let weights: Array1<f64> = (0..n_samples).map(|_| rng.gen::<f64>()).collect();

    Ok((feature_frame(&x)?, y, weights))
}

/// Linear targets with Gaussian noise.
///
/// Returns `(features, targets, weights)`.
pub fn generate_regression_data(
    n_samples: usize,
    n_features: usize,
    seed: u64,
) -> Result<(DataFrame, Array1<f64>, Array1<f64>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let x = Array2::from_shape_fn((n_samples, n_features), |_| rng.sample::<f64, _>(StandardNormal));
    let coefs: Array1<f64> = (0..n_features).map(|j| (j + 1) as f64).collect();
    let noise: Array1<f64> = (0..n_samples)
        .map(|_| 0.1 * rng.sample::<f64, _>(StandardNormal))
        .collect();
    let y = x.dot(&coefs) + noise;
    let weights: Array1<f64> = (0..n_samples).map(|_| rng.gen::<f64>()).collect();

    Ok((feature_frame(&x)?, y, weights))
}

/// Area under the ROC curve, with tied scores sharing their average rank
pub fn roc_auc_score(y_true: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let n_pos = y_true.iter().filter(|&&v| v > 0.5).count() as f64;
    let n_neg = y_true.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return 0.5;
    }

    let rank_sum: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(&label, _)| label > 0.5)
        .map(|(_, &rank)| rank)
        .sum();
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let diff = y_true - y_pred;
    diff.mapv(|d| d * d).mean().unwrap_or(0.0)
}

fn training_storage(
    data: DataFrame,
    y: Array1<f64>,
    weights: Array1<f64>,
    opts: &CheckOptions,
) -> Result<LabeledDataStorage> {
    let sample_weight = if opts.supports_weight {
        Specifier::Values(weights)
    } else {
        Specifier::Absent
    };
    LabeledDataStorage::new(data, y, sample_weight, opts.seed, true)
}

fn assert_probabilities(proba: &Array2<f64>, n_samples: usize, n_classes: usize) {
    assert_eq!(proba.dim(), (n_samples, n_classes), "predict_proba has wrong shape");
    for row in proba.axis_iter(Axis(0)) {
        assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)), "probability out of range");
        assert!((row.sum() - 1.0).abs() < 1e-6, "probabilities do not sum to one");
    }
}

/// Train through a shuffled storage and check predictions on the original order
pub fn check_classifier<C: Classifier + ?Sized>(classifier: &mut C, opts: &CheckOptions) -> Result<()> {
    let (data, y, weights) =
        generate_classification_data(opts.n_samples, opts.n_features, opts.n_classes, opts.distance, opts.seed)?;

    let train = training_storage(data.clone(), y.clone(), weights, opts)?;
    fit_storage(&mut *classifier, &train, None)?;
    assert!(classifier.is_fitted(), "classifier not fitted after fit");

    let test = LabeledDataStorage::builder(data).allow_absent_target(true).build()?;
    let proba = predict_proba_storage(&*classifier, &test, None)?;
    assert_probabilities(&proba, opts.n_samples, opts.n_classes);

    let x = train.to_batch(None)?.x;
    let labels = classifier.predict(&x)?;
    assert_eq!(labels.len(), opts.n_samples);
    assert!(
        labels.iter().all(|l| classifier.classes().contains(l)),
        "predict returned an unknown class"
    );

    if opts.n_classes == 2 {
        let auc = roc_auc_score(&y, &proba.column(1).to_owned());
        assert!(auc >= opts.min_auc, "AUC {} below {}", auc, opts.min_auc);
    }
    Ok(())
}

/// Train through a shuffled storage and require beating a constant predictor
pub fn check_regression<R: Regressor + ?Sized>(regressor: &mut R, opts: &CheckOptions) -> Result<()> {
    let (data, y, weights) = generate_regression_data(opts.n_samples, opts.n_features, opts.seed)?;

    let train = training_storage(data.clone(), y.clone(), weights, opts)?;
    fit_storage(&mut *regressor, &train, None)?;
    assert!(regressor.is_fitted(), "regressor not fitted after fit");

    let test = LabeledDataStorage::builder(data).allow_absent_target(true).build()?;
    let predictions = predict_storage(&*regressor, &test, None)?;
    assert_eq!(predictions.len(), opts.n_samples);
    assert!(predictions.iter().all(|p| p.is_finite()), "non-finite prediction");

    let variance = y.var(0.0);
    let mse = mean_squared_error(&y, &predictions);
    assert!(
        mse <= variance * opts.max_relative_mse,
        "MSE {} exceeds {} x variance {}",
        mse,
        opts.max_relative_mse,
        variance
    );
    Ok(())
}

/// Two clones fitted on identically seeded storages must agree exactly
pub fn check_classification_reproducibility<C: Classifier + Clone>(
    classifier: &C,
    data: &DataFrame,
    y: &Array1<f64>,
    seed: u64,
) -> Result<()> {
    let mut first = classifier.clone();
    let mut second = classifier.clone();

    let storage_a = LabeledDataStorage::new(data.clone(), y.clone(), Specifier::Absent, seed, true)?;
    let storage_b = LabeledDataStorage::new(data.clone(), y.clone(), Specifier::Absent, seed, true)?;
    assert_eq!(storage_a.get_indices(), storage_b.get_indices(), "same seed, different shuffle");

    fit_storage(&mut first, &storage_a, None)?;
    fit_storage(&mut second, &storage_b, None)?;

    let x = storage_a.to_batch(None)?.x;
    assert_eq!(
        first.predict_proba(&x)?,
        second.predict_proba(&x)?,
        "identically trained classifiers disagree"
    );
    Ok(())
}

/// Fit on the first half of the rows and continue on the second with
/// `partial_fit`; the result must match a clone fitted on all rows at once
pub fn check_partial_fit<C: Classifier + PartialFit + Clone>(classifier: &C, opts: &CheckOptions) -> Result<()> {
    let (data, y, _) =
        generate_classification_data(opts.n_samples, opts.n_features, opts.n_classes, opts.distance, opts.seed)?;
    let half = opts.n_samples / 2;
    let full = LabeledDataStorage::new(data.clone(), y.clone(), Specifier::Absent, opts.seed, true)?;
    let head = LabeledDataStorage::new(
        data.head(Some(half)),
        y.slice(ndarray::s![..half]).to_owned(),
        Specifier::Absent,
        opts.seed,
        true,
    )?;
    let tail = LabeledDataStorage::new(
        data.slice(half as i64, opts.n_samples - half),
        y.slice(ndarray::s![half..]).to_owned(),
        Specifier::Absent,
        opts.seed,
        true,
    )?;

    let mut complete = classifier.clone();
    fit_storage(&mut complete, &full, None)?;

    let mut partial = classifier.clone();
    fit_storage(&mut partial, &head, None)?;
    partial_fit_storage(&mut partial, &tail, None)?;

    assert_eq!(complete.classes(), partial.classes(), "partial fit changed the classes");

    let x = full.to_batch(None)?.x;
    let expected = complete.predict_proba(&x)?;
    let actual = partial.predict_proba(&x)?;
    assert_probabilities(&actual, opts.n_samples, opts.n_classes);

    let max_diff = expected
        .iter()
        .zip(actual.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(
        max_diff <= opts.partial_fit_tolerance,
        "partial fit differs from a complete fit by {}",
        max_diff
    );
    Ok(())
}
