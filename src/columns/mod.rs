//! Column resolution
//!
//! Turns column selectors into concrete columns of a frame. A selector is
//! either a plain column name (`"age"`) or a derived column written as
//! `"name: expression"` (`"bmi: weight / height ** 2"`). A selector without
//! a colon that is not an existing column is evaluated as an expression and
//! named after its own text (`"x * 2"`).

mod convert;
pub mod expr;

pub use convert::{column_to_array, column_to_vec, frame_to_array2};
pub use expr::{BinaryOp, ColumnExpr, Function};

pub(crate) use convert::ensure_length;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// A resolved selector: output column name and the expression producing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub expression: String,
}

impl ColumnSpec {
    /// Parse a single selector
    pub fn parse(selector: &str) -> Self {
        match selector.split_once(':') {
            Some((name, expression)) => Self {
                name: name.trim().to_string(),
                expression: expression.trim().to_string(),
            },
            None => {
                let trimmed = selector.trim().to_string();
                Self {
                    name: trimmed.clone(),
                    expression: trimmed,
                }
            }
        }
    }

    /// Materialize this column over `df`.
    ///
    /// Existing columns are taken as-is (keeping their dtype); anything else
    /// is parsed and evaluated to `Float64`.
    pub fn materialize(&self, df: &DataFrame) -> Result<Series> {
        if let Ok(column) = df.column(&self.expression) {
            let mut series = column.as_materialized_series().clone();
            series.rename(self.name.as_str().into());
            return Ok(series);
        }
        ColumnExpr::parse(&self.expression)?.evaluate_series(df, &self.name)
    }
}

/// Resolve selectors into ordered `(name, expression)` specs
pub fn get_columns_dict<S: AsRef<str>>(selectors: &[S]) -> Vec<ColumnSpec> {
    selectors
        .iter()
        .map(|s| ColumnSpec::parse(s.as_ref()))
        .collect()
}

/// Select (and derive) columns of `df`.
///
/// `None` returns the frame unchanged; otherwise the result holds one column
/// per selector, in selector order. An empty selector list is an error, as
/// a frame without columns cannot keep the row count.
pub fn get_columns_in_df<S: AsRef<str>>(df: &DataFrame, selectors: Option<&[S]>) -> Result<DataFrame> {
    let Some(selectors) = selectors else {
        return Ok(df.clone());
    };
    if selectors.is_empty() {
        return Err(StorageError::InvalidExpression(
            "empty column selection; use None for all columns".to_string(),
        ));
    }

    let columns: Vec<Column> = get_columns_dict(selectors)
        .iter()
        .map(|spec| spec.materialize(df).map(Column::from))
        .collect::<Result<Vec<_>>>()?;

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "weight" => &[60.0, 80.0, 100.0],
            "height" => &[2.0, 2.0, 2.0],
            "label" => &[0i64, 1, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_plain_selector() {
        let spec = ColumnSpec::parse("weight");
        assert_eq!(spec.name, "weight");
        assert_eq!(spec.expression, "weight");
    }

    #[test]
    fn test_parse_named_expression() {
        let spec = ColumnSpec::parse("bmi : weight / height ** 2");
        assert_eq!(spec.name, "bmi");
        assert_eq!(spec.expression, "weight / height ** 2");
    }

    #[test]
    fn test_columns_dict_keeps_order() {
        let specs = get_columns_dict(&["b", "a: b + 1", "c"]);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_none_returns_full_frame() {
        let df = frame();
        let out = get_columns_in_df::<&str>(&df, None).unwrap();
        assert_eq!(out.width(), 3);
        assert!(out.equals(&df));
    }

    #[test]
    fn test_plain_columns_keep_dtype() {
        let df = frame();
        let out = get_columns_in_df(&df, Some(&["label", "weight"][..])).unwrap();
        let names: Vec<&str> = out.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["label", "weight"]);
        assert_eq!(out.column("label").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_derived_column() {
        let df = frame();
        let out = get_columns_in_df(&df, Some(&["bmi: weight / height ** 2"][..])).unwrap();
        let bmi = column_to_vec(out.column("bmi").unwrap().as_materialized_series()).unwrap();
        assert_eq!(bmi, vec![15.0, 20.0, 25.0]);
    }

    #[test]
    fn test_unnamed_expression_uses_its_text() {
        let df = frame();
        let out = get_columns_in_df(&df, Some(&["weight * 2"][..])).unwrap();
        assert!(out.column("weight * 2").is_ok());
    }

    #[test]
    fn test_unknown_column_propagates() {
        let df = frame();
        let result = get_columns_in_df(&df, Some(&["missing"][..]));
        assert!(matches!(result, Err(StorageError::ColumnNotFound(_))));
    }

    #[test]
    fn test_empty_selection_rejected() {
        let df = frame();
        let result = get_columns_in_df::<&str>(&df, Some(&[]));
        assert!(matches!(result, Err(StorageError::InvalidExpression(_))));
    }
}
