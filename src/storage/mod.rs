//! Labeled data storage
//!
//! Wraps a polars `DataFrame` together with per-row targets and sample
//! weights so that any estimator can be fed through one interface:
//!
//! - Targets and weights may be given as a column selector, a constant, or
//!   explicit values, and are resolved once at construction
//! - Missing weights stay absent until a reader asks for unit weights
//! - An optional shuffle applies one memoized permutation to data, targets
//!   and weights alike, so row `i` of each always describes the same record

mod specifier;

pub use specifier::{ColumnSelector, Expression, Resolved, Scalar, Selection, Specifier};

use std::sync::OnceLock;

use ndarray::{Array1, Axis};
use polars::prelude::*;
use tracing::{debug, trace};

use crate::columns::{column_to_array, ensure_length, get_columns_dict, get_columns_in_df, ColumnSpec};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::random::{derive_seed, permutation, RandomState};

/// Data, targets and weights for estimator training
#[derive(Debug)]
pub struct LabeledDataStorage {
    data: DataFrame,
    target: Resolved,
    sample_weight: Resolved,
    /// Seed drawn once from the caller's `random_state`
    random_state: u64,
    shuffle: bool,
    /// Default selection for `get_features`
    features: Option<Vec<String>>,
    indices: OnceLock<Vec<usize>>,
}

/// Builder for [`LabeledDataStorage`]
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    data: DataFrame,
    target: Specifier,
    sample_weight: Specifier,
    random_state: RandomState,
    shuffle: bool,
    allow_absent_target: bool,
    features: Option<Vec<String>>,
}

impl StorageBuilder {
    pub fn target(mut self, target: impl Into<Specifier>) -> Self {
        self.target = target.into();
        self
    }

    pub fn sample_weight(mut self, sample_weight: impl Into<Specifier>) -> Self {
        self.sample_weight = sample_weight.into();
        self
    }

    pub fn random_state(mut self, random_state: impl Into<RandomState>) -> Self {
        self.random_state = random_state.into();
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Keep an absent target absent instead of filling it with ones.
    /// Only meaningful for prediction, where no target is needed.
    pub fn allow_absent_target(mut self, allow: bool) -> Self {
        self.allow_absent_target = allow;
        self
    }

    /// Feature selectors used when a reader passes no explicit selection
    pub fn features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<LabeledDataStorage> {
        let n_rows = self.data.height();
        let target = resolve_specifier(&self.data, self.target, self.allow_absent_target)?;
        let sample_weight = resolve_specifier(&self.data, self.sample_weight, true)?;

        if let Resolved::Values(values) = &target {
            ensure_length("target", n_rows, values.len())?;
        }
        if let Resolved::Values(values) = &sample_weight {
            ensure_length("sample_weight", n_rows, values.len())?;
        }

        let random_state = derive_seed(&self.random_state);

        debug!(
            rows = n_rows,
            columns = self.data.width(),
            shuffle = self.shuffle,
            seed = random_state,
            has_target = !target.is_absent(),
            has_weights = !sample_weight.is_absent(),
            "Built labeled data storage"
        );

        Ok(LabeledDataStorage {
            data: self.data,
            target,
            sample_weight,
            random_state,
            shuffle: self.shuffle,
            features: self.features,
            indices: OnceLock::new(),
        })
    }
}

/// Resolve a specifier into `n_rows` values.
///
/// An absent specifier stays absent when `allow_absent`, otherwise it
/// becomes an array of ones.
pub fn resolve_specifier(data: &DataFrame, key: Specifier, allow_absent: bool) -> Result<Resolved> {
    match key {
        Specifier::Column(selector) => {
            let specs = get_columns_dict(&[selector.as_str()]);
            let name = specs
                .first()
                .map(|spec| spec.name.clone())
                .ok_or_else(|| StorageError::InvalidExpression(selector.clone()))?;
            let frame = get_columns_in_df(data, Some(&[selector.as_str()][..]))?;
            let column = frame.column(&name)?;
            Ok(Resolved::Values(column_to_array(column.as_materialized_series())?))
        }
        Specifier::Constant(value) => Ok(Resolved::Values(Array1::from_elem(data.height(), value))),
        Specifier::Values(values) => Ok(Resolved::Values(values)),
        Specifier::Absent if allow_absent => Ok(Resolved::Absent),
        Specifier::Absent => Ok(Resolved::Values(Array1::ones(data.height()))),
    }
}

impl LabeledDataStorage {
    /// Build a storage in one call
    pub fn new(
        data: DataFrame,
        target: impl Into<Specifier>,
        sample_weight: impl Into<Specifier>,
        random_state: impl Into<RandomState>,
        shuffle: bool,
    ) -> Result<Self> {
        Self::builder(data)
            .target(target)
            .sample_weight(sample_weight)
            .random_state(random_state)
            .shuffle(shuffle)
            .build()
    }

    /// Start a builder with no target, no weights, entropy seeding and no shuffle
    pub fn builder(data: DataFrame) -> StorageBuilder {
        StorageBuilder {
            data,
            target: Specifier::Absent,
            sample_weight: Specifier::Absent,
            random_state: RandomState::Entropy,
            shuffle: false,
            allow_absent_target: false,
            features: None,
        }
    }

    /// Build from a [`StorageConfig`]
    pub fn from_config(
        data: DataFrame,
        target: impl Into<Specifier>,
        sample_weight: impl Into<Specifier>,
        config: &StorageConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::builder(data)
            .target(target)
            .sample_weight(sample_weight)
            .random_state(config.random_state)
            .shuffle(config.shuffle)
            .allow_absent_target(config.allow_absent_target);
        if let Some(features) = &config.features {
            builder = builder.features(features.iter().cloned());
        }
        builder.build()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.data.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// The seed derived from `random_state` at construction
    pub fn derived_seed(&self) -> u64 {
        self.random_state
    }

    /// Columns `features` (all when `None`), reordered when shuffling
    pub fn get_data(&self, features: Option<&[&str]>) -> Result<DataFrame> {
        let df = get_columns_in_df(&self.data, features)?;
        if self.shuffle {
            return Ok(df.take(&self.index_chunked())?);
        }
        Ok(df)
    }

    /// Configured default feature selectors, if any
    pub fn features(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    /// Like [`get_data`](Self::get_data), but `None` falls back to the
    /// configured features before falling back to every column
    pub fn get_features(&self, features: Option<&[&str]>) -> Result<DataFrame> {
        let defaults: Option<Vec<&str>> = self
            .features
            .as_ref()
            .map(|names| names.iter().map(String::as_str).collect());
        self.get_data(features.or(defaults.as_deref()))
    }

    /// Targets in the same row order as [`get_data`](Self::get_data)
    pub fn get_targets(&self) -> Result<Array1<f64>> {
        match &self.target {
            Resolved::Values(values) => Ok(self.reorder(values)),
            Resolved::Absent => Err(StorageError::MissingTarget),
        }
    }

    pub fn has_target(&self) -> bool {
        !self.target.is_absent()
    }

    /// Sample weights in the same row order as [`get_data`](Self::get_data).
    ///
    /// Without configured weights this is `Absent` when `allow_absent`,
    /// otherwise a fresh array of ones.
    pub fn get_weights(&self, allow_absent: bool) -> Resolved {
        match &self.sample_weight {
            Resolved::Values(values) => Resolved::Values(self.reorder(values)),
            Resolved::Absent if allow_absent => Resolved::Absent,
            Resolved::Absent => {
                trace!(rows = self.len(), "No sample weights configured, using ones");
                Resolved::Values(Array1::ones(self.len()))
            }
        }
    }

    /// Sample weights, with unit weights when none were configured
    pub fn weights(&self) -> Array1<f64> {
        self.get_weights(false).unwrap_or_ones(self.len())
    }

    /// The row permutation, computed on first use and reused afterwards.
    ///
    /// It exists whether or not the storage shuffles; `shuffle` only decides
    /// whether the other accessors apply it.
    pub fn get_indices(&self) -> &[usize] {
        self.indices.get_or_init(|| {
            debug!(rows = self.len(), seed = self.random_state, "Materializing row permutation");
            permutation(self.len(), self.random_state)
        })
    }

    /// A single column by name, or a frame for any other selector
    pub fn col(&self, selector: impl Into<ColumnSelector>) -> Result<Selection> {
        match selector.into() {
            ColumnSelector::Name(selector) => {
                let name = ColumnSpec::parse(&selector).name;
                let frame = self.get_data(Some(&[selector.as_str()][..]))?;
                let series = frame.column(&name)?.as_materialized_series().clone();
                Ok(Selection::Column(series))
            }
            ColumnSelector::Names(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                Ok(Selection::Frame(self.get_data(Some(names.as_slice()))?))
            }
            ColumnSelector::All => Ok(Selection::Frame(self.get_data(None)?)),
        }
    }

    /// Evaluate an expression into one value per row.
    ///
    /// Explicit values must already have one entry per row and are returned
    /// as given, without reordering.
    pub fn eval_column(&self, expression: impl Into<Expression>) -> Result<Series> {
        let n = self.len();
        match expression.into() {
            Expression::Constant(Scalar::Int(value)) => Ok(Series::new("literal".into(), vec![value; n])),
            Expression::Constant(Scalar::Float(value)) => Ok(Series::new("literal".into(), vec![value; n])),
            Expression::Column(selector) => match self.col(selector)? {
                Selection::Column(series) => Ok(series),
                Selection::Frame(_) => Err(StorageError::InvalidExpression(
                    "column selector produced a frame".to_string(),
                )),
            },
            Expression::Function(f) => f(&self.get_data(None)?),
            Expression::Values(series) => {
                ensure_length("expression", n, series.len())?;
                Ok(series)
            }
        }
    }

    /// [`eval_column`](Self::eval_column) cast to `f64`
    pub fn eval_column_f64(&self, expression: impl Into<Expression>) -> Result<Array1<f64>> {
        column_to_array(&self.eval_column(expression)?)
    }

    fn reorder(&self, values: &Array1<f64>) -> Array1<f64> {
        if self.shuffle {
            values.select(Axis(0), self.get_indices())
        } else {
            values.clone()
        }
    }

    fn index_chunked(&self) -> IdxCa {
        let idx: Vec<IdxSize> = self.get_indices().iter().map(|&i| i as IdxSize).collect();
        IdxCa::from_vec("idx".into(), idx)
    }
}
