//! Integration test: estimators trained through storages
//!
//! The estimators here are deliberately tiny; the point is the storage
//! boundary, not the learning.

use labeled_storage::prelude::*;
use labeled_storage::testing::{
    check_classification_reproducibility, check_classifier, check_partial_fit, check_regression,
    generate_classification_data, CheckOptions,
};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;

/// Weighted class centroids, probabilities from a softmax over distances
#[derive(Clone, Default)]
struct NearestCentroid {
    weighted: bool,
    classes: Vec<f64>,
    sums: Vec<Array1<f64>>,
    totals: Vec<f64>,
}

impl NearestCentroid {
    fn weighted() -> Self {
        Self { weighted: true, ..Default::default() }
    }

    fn accumulate(&mut self, x: &Array2<f64>, y: &Array1<f64>, w: Option<&Array1<f64>>) {
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            let label = y[i];
            let weight = w.map_or(1.0, |w| w[i]);
            let k = match self.classes.iter().position(|&c| c == label) {
                Some(k) => k,
                None => {
                    self.classes.push(label);
                    self.sums.push(Array1::zeros(x.ncols()));
                    self.totals.push(0.0);
                    self.classes.len() - 1
                }
            };
            self.sums[k] = &self.sums[k] + &(&row * weight);
            self.totals[k] += weight;
        }
        self.sort_classes();
    }

    fn sort_classes(&mut self) {
        let mut order: Vec<usize> = (0..self.classes.len()).collect();
        order.sort_by(|&a, &b| self.classes[a].total_cmp(&self.classes[b]));
        self.classes = order.iter().map(|&k| self.classes[k]).collect();
        self.sums = order.iter().map(|&k| self.sums[k].clone()).collect();
        self.totals = order.iter().map(|&k| self.totals[k]).collect();
    }
}

impl Estimator for NearestCentroid {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: Option<&Array1<f64>>) -> Result<()> {
        self.classes.clear();
        self.sums.clear();
        self.totals.clear();
        self.accumulate(x, y, sample_weight);
        Ok(())
    }

    fn supports_weight(&self) -> bool {
        self.weighted
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }
}

impl PartialFit for NearestCentroid {
    fn partial_fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: Option<&Array1<f64>>) -> Result<()> {
        self.accumulate(x, y, sample_weight);
        Ok(())
    }
}

impl Classifier for NearestCentroid {
    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(StorageError::ModelNotFitted);
        }
        let centroids: Vec<Array1<f64>> = self
            .sums
            .iter()
            .zip(&self.totals)
            .map(|(s, &t)| s / t)
            .collect();

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            let scores: Vec<f64> = centroids
                .iter()
                .map(|c| -(&row - c).mapv(|d| d * d).sum().sqrt())
                .collect();
            let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
            let total: f64 = exp.iter().sum();
            for (k, e) in exp.iter().enumerate() {
                proba[[i, k]] = e / total;
            }
        }
        Ok(proba)
    }
}

/// Weighted k-nearest-neighbors average
#[derive(Clone)]
struct KnnRegressor {
    k: usize,
    x: Option<Array2<f64>>,
    y: Array1<f64>,
    w: Array1<f64>,
}

impl KnnRegressor {
    fn new(k: usize) -> Self {
        Self { k, x: None, y: Array1::zeros(0), w: Array1::zeros(0) }
    }
}

impl Estimator for KnnRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: Option<&Array1<f64>>) -> Result<()> {
        self.x = Some(x.clone());
        self.y = y.clone();
        self.w = sample_weight.cloned().unwrap_or_else(|| Array1::ones(y.len()));
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.x.is_some()
    }
}

impl Regressor for KnnRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let train = self.x.as_ref().ok_or(StorageError::ModelNotFitted)?;
        let predictions = x
            .axis_iter(Axis(0))
            .map(|row| {
                let mut dist: Vec<(f64, usize)> = train
                    .axis_iter(Axis(0))
                    .enumerate()
                    .map(|(j, t)| ((&row - &t).mapv(|d| d * d).sum(), j))
                    .collect();
                dist.sort_by(|a, b| a.0.total_cmp(&b.0));
                let neighbors = &dist[..self.k.min(dist.len())];
                // small floor so a zero-weight neighborhood still averages
                let weights: Vec<f64> = neighbors.iter().map(|&(_, j)| self.w[j] + 1e-3).collect();
                let total: f64 = weights.iter().sum();
                neighbors
                    .iter()
                    .zip(&weights)
                    .map(|(&(_, j), w)| self.y[j] * w)
                    .sum::<f64>()
                    / total
            })
            .collect::<Vec<f64>>();
        Ok(Array1::from(predictions))
    }
}

/// Averages members trained on different shuffled subsamples
#[derive(Clone)]
struct BaggingClassifier<C: Classifier + Clone> {
    base: C,
    n_estimators: usize,
    max_samples: f64,
    seed: u64,
    members: Vec<C>,
}

impl<C: Classifier + Clone> BaggingClassifier<C> {
    fn new(base: C, n_estimators: usize) -> Self {
        Self { base, n_estimators, max_samples: 0.7, seed: 0, members: Vec::new() }
    }
}

impl<C: Classifier + Clone> Estimator for BaggingClassifier<C> {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: Option<&Array1<f64>>) -> Result<()> {
        let columns: Vec<Column> = x
            .axis_iter(Axis(1))
            .enumerate()
            .map(|(j, col)| Column::new(format!("f{}", j).into(), col.to_vec()))
            .collect();
        let frame = DataFrame::new(columns)?;
        let n_take = ((x.nrows() as f64) * self.max_samples) as usize;

        self.members.clear();
        for i in 0..self.n_estimators {
            let storage = LabeledDataStorage::new(
                frame.clone(),
                y.clone(),
                sample_weight.cloned(),
                self.seed + i as u64,
                true,
            )?;
            let batch = storage.to_batch(None)?;
            let rows: Vec<usize> = (0..n_take).collect();
            let x_sub = batch.x.select(Axis(0), &rows);
            let y_sub = batch.targets()?.select(Axis(0), &rows);
            let w_sub = batch.sample_weight.values().map(|w| w.select(Axis(0), &rows));

            let mut member = self.base.clone();
            member.fit(&x_sub, &y_sub, w_sub.as_ref())?;
            self.members.push(member);
        }
        Ok(())
    }

    fn supports_weight(&self) -> bool {
        self.base.supports_weight()
    }

    fn is_fitted(&self) -> bool {
        !self.members.is_empty()
    }
}

impl<C: Classifier + Clone> Classifier for BaggingClassifier<C> {
    fn classes(&self) -> &[f64] {
        match self.members.first() {
            Some(member) => member.classes(),
            None => &[],
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let first = self.members.first().ok_or(StorageError::ModelNotFitted)?;
        let mut total = first.predict_proba(x)?;
        for member in &self.members[1..] {
            total = total + member.predict_proba(x)?;
        }
        Ok(total / self.members.len() as f64)
    }
}

#[test]
fn test_single_classification() {
    let mut clf = NearestCentroid::default();
    let opts = CheckOptions::default().with_supports_weight(false);
    check_classifier(&mut clf, &opts).unwrap();
}

#[test]
fn test_weighted_classification() {
    let mut clf = NearestCentroid::weighted();
    check_classifier(&mut clf, &CheckOptions::default()).unwrap();
}

#[test]
fn test_multiclassification() {
    let mut clf = NearestCentroid::default();
    let opts = CheckOptions::default()
        .with_n_classes(4)
        .with_supports_weight(false);
    check_classifier(&mut clf, &opts).unwrap();
    assert_eq!(clf.classes(), &[0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_regression() {
    let mut reg = KnnRegressor::new(3);
    check_regression(&mut reg, &CheckOptions::default()).unwrap();
}

#[test]
fn test_reproducibility() {
    let (data, y, _) = generate_classification_data(300, 4, 2, 1.0, 5).unwrap();
    check_classification_reproducibility(&NearestCentroid::default(), &data, &y, 17).unwrap();
}

#[test]
fn test_partial_fit() {
    let opts = CheckOptions::default().with_supports_weight(false);
    check_partial_fit(&NearestCentroid::default(), &opts).unwrap();
}

#[test]
fn test_simple_stacking() {
    let mut bagging = BaggingClassifier::new(NearestCentroid::default(), 3);
    let opts = CheckOptions::default().with_supports_weight(false);
    check_classifier(&mut bagging, &opts).unwrap();
    assert_eq!(bagging.members.len(), 3);
}

#[test]
fn test_unsupported_weights_are_rejected() {
    let (data, y, weights) = generate_classification_data(50, 2, 2, 1.0, 3).unwrap();
    let storage = LabeledDataStorage::new(data, y, weights, 3u64, true).unwrap();
    let mut clf = NearestCentroid::default();
    let result = fit_storage(&mut clf, &storage, None);
    assert!(matches!(result, Err(StorageError::UnsupportedWeights(_))));
    assert!(!clf.is_fitted());
}

#[test]
fn test_prediction_follows_storage_order() {
    let (data, y, _) = generate_classification_data(100, 3, 2, 2.0, 12).unwrap();
    let train = LabeledDataStorage::new(data.clone(), y, None::<f64>, 1u64, false).unwrap();
    let mut clf = NearestCentroid::default();
    fit_storage(&mut clf, &train, None).unwrap();

    let plain = LabeledDataStorage::builder(data.clone())
        .allow_absent_target(true)
        .build()
        .unwrap();
    let shuffled = LabeledDataStorage::builder(data)
        .allow_absent_target(true)
        .random_state(4u64)
        .shuffle(true)
        .build()
        .unwrap();

    let p_plain = predict_proba_storage(&clf, &plain, None).unwrap();
    let p_shuffled = predict_proba_storage(&clf, &shuffled, None).unwrap();
    for (i, &row) in shuffled.get_indices().iter().enumerate() {
        assert_eq!(p_shuffled.row(i), p_plain.row(row));
    }
}
