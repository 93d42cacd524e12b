//! Input specifiers accepted by [`LabeledDataStorage`](super::LabeledDataStorage)

use std::fmt;

use ndarray::Array1;
use polars::prelude::*;

use crate::error::Result;

/// How to obtain per-row target or weight values
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Specifier {
    /// Column selector, plain or derived (`"name: expression"`)
    Column(String),
    /// One value broadcast to every row
    Constant(f64),
    /// Explicit per-row values
    Values(Array1<f64>),
    /// Nothing given
    #[default]
    Absent,
}

impl From<&str> for Specifier {
    fn from(name: &str) -> Self {
        Specifier::Column(name.to_string())
    }
}

impl From<String> for Specifier {
    fn from(name: String) -> Self {
        Specifier::Column(name)
    }
}

impl From<f64> for Specifier {
    fn from(value: f64) -> Self {
        Specifier::Constant(value)
    }
}

impl From<i64> for Specifier {
    fn from(value: i64) -> Self {
        Specifier::Constant(value as f64)
    }
}

impl From<i32> for Specifier {
    fn from(value: i32) -> Self {
        Specifier::Constant(value as f64)
    }
}

impl From<Vec<f64>> for Specifier {
    fn from(values: Vec<f64>) -> Self {
        Specifier::Values(Array1::from(values))
    }
}

impl From<&[f64]> for Specifier {
    fn from(values: &[f64]) -> Self {
        Specifier::Values(Array1::from(values.to_vec()))
    }
}

impl From<Array1<f64>> for Specifier {
    fn from(values: Array1<f64>) -> Self {
        Specifier::Values(values)
    }
}

impl<T: Into<Specifier>> From<Option<T>> for Specifier {
    fn from(value: Option<T>) -> Self {
        value.map_or(Specifier::Absent, Into::into)
    }
}

/// A resolved per-row array, or the explicit absence of one
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Values(Array1<f64>),
    Absent,
}

impl Resolved {
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }

    pub fn values(&self) -> Option<&Array1<f64>> {
        match self {
            Resolved::Values(values) => Some(values),
            Resolved::Absent => None,
        }
    }

    pub fn into_values(self) -> Option<Array1<f64>> {
        match self {
            Resolved::Values(values) => Some(values),
            Resolved::Absent => None,
        }
    }

    /// Values, or `n` ones when absent
    pub fn unwrap_or_ones(self, n: usize) -> Array1<f64> {
        self.into_values().unwrap_or_else(|| Array1::ones(n))
    }
}

/// Numeric constant that keeps its type through `eval_column`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

type FrameFn = Box<dyn Fn(&DataFrame) -> Result<Series> + Send + Sync>;

/// Expression accepted by `eval_column`
pub enum Expression {
    /// Broadcast to every row, keeping the numeric type
    Constant(Scalar),
    /// Column selector, resolved through `col`
    Column(String),
    /// Computed from the current (possibly shuffled) data view
    Function(FrameFn),
    /// Caller-aligned values, returned as-is after a length check
    Values(Series),
}

impl Expression {
    /// Wrap a closure over the data view
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&DataFrame) -> Result<Series> + Send + Sync + 'static,
    {
        Expression::Function(Box::new(f))
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Expression::Column(name) => f.debug_tuple("Column").field(name).finish(),
            Expression::Function(_) => f.write_str("Function(..)"),
            Expression::Values(series) => f.debug_tuple("Values").field(&series.len()).finish(),
        }
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::Constant(Scalar::Int(value))
    }
}

impl From<i32> for Expression {
    fn from(value: i32) -> Self {
        Expression::Constant(Scalar::Int(value as i64))
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Constant(Scalar::Float(value))
    }
}

impl From<&str> for Expression {
    fn from(name: &str) -> Self {
        Expression::Column(name.to_string())
    }
}

impl From<String> for Expression {
    fn from(name: String) -> Self {
        Expression::Column(name)
    }
}

impl From<Series> for Expression {
    fn from(series: Series) -> Self {
        Expression::Values(series)
    }
}

impl From<Vec<f64>> for Expression {
    fn from(values: Vec<f64>) -> Self {
        Expression::Values(Series::new("values".into(), values))
    }
}

impl From<Array1<f64>> for Expression {
    fn from(values: Array1<f64>) -> Self {
        Expression::Values(Series::new("values".into(), values.to_vec()))
    }
}

/// Selector accepted by `col`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    /// One column, plain or derived
    Name(String),
    /// Several columns
    Names(Vec<String>),
    /// Every column
    All,
}

impl From<&str> for ColumnSelector {
    fn from(name: &str) -> Self {
        ColumnSelector::Name(name.to_string())
    }
}

impl From<String> for ColumnSelector {
    fn from(name: String) -> Self {
        ColumnSelector::Name(name)
    }
}

impl From<Vec<&str>> for ColumnSelector {
    fn from(names: Vec<&str>) -> Self {
        ColumnSelector::Names(names.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for ColumnSelector {
    fn from(names: Vec<String>) -> Self {
        ColumnSelector::Names(names)
    }
}

impl From<&[&str]> for ColumnSelector {
    fn from(names: &[&str]) -> Self {
        ColumnSelector::Names(names.iter().map(|s| s.to_string()).collect())
    }
}

/// Result of `col`: a single column or a frame
#[derive(Debug, Clone)]
pub enum Selection {
    Column(Series),
    Frame(DataFrame),
}

impl Selection {
    pub fn into_series(self) -> Option<Series> {
        match self {
            Selection::Column(series) => Some(series),
            Selection::Frame(_) => None,
        }
    }

    pub fn into_frame(self) -> DataFrame {
        match self {
            Selection::Column(series) => series.into_frame(),
            Selection::Frame(df) => df,
        }
    }
}
