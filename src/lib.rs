//! Labeled Storage - dataset normalization for estimator training
//!
//! This crate wraps a polars `DataFrame` into a labeled dataset: feature rows,
//! per-row targets and optional sample weights, with deterministic shuffling
//! that keeps all three aligned.
//!
//! # Modules
//!
//! - [`storage`] - `LabeledDataStorage` and its input specifiers
//! - [`columns`] - Column selectors and derived column expressions
//! - [`random`] - Seed coercion and permutations
//! - [`estimator`] - The `fit(X, y, sample_weight)` contract and storage-driven fitting
//! - [`testing`] - Synthetic data and generic estimator checks
//! - [`config`] - Serializable storage settings
//!
//! # Example
//!
//! ```
//! use labeled_storage::prelude::*;
//! use polars::prelude::*;
//!
//! let df = df!(
//!     "x" => &[1.0, 2.0, 3.0, 4.0],
//!     "label" => &[0.0, 1.0, 0.0, 1.0],
//! ).unwrap();
//!
//! let storage = LabeledDataStorage::new(df, "label", None::<f64>, 42u64, true).unwrap();
//! let data = storage.get_data(Some(&["x"][..])).unwrap();
//! let targets = storage.get_targets().unwrap();
//! assert_eq!(data.height(), targets.len());
//! assert_eq!(storage.weights().sum(), 4.0);
//! ```

// Core error handling
pub mod error;

// Dataset abstraction
pub mod columns;
pub mod config;
pub mod random;
pub mod storage;

// Estimator boundary
pub mod estimator;
pub mod testing;

pub use error::{Result, StorageError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::columns::{get_columns_dict, get_columns_in_df, ColumnExpr, ColumnSpec};
    pub use crate::config::StorageConfig;
    pub use crate::error::{Result, StorageError};
    pub use crate::estimator::{
        fit_storage, partial_fit_storage, predict_proba_storage, predict_storage, Classifier, Estimator,
        PartialFit, Regressor, TrainingBatch,
    };
    pub use crate::random::{RandomState, SharedRng};
    pub use crate::storage::{
        ColumnSelector, Expression, LabeledDataStorage, Resolved, Scalar, Selection, Specifier, StorageBuilder,
    };
}
