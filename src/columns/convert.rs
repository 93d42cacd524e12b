//! Conversions between polars columns and ndarray buffers

use ndarray::{Array1, Array2};
use polars::prelude::*;

use crate::error::{Result, StorageError};

/// Cast a series to `f64` values; nulls become NaN.
///
/// Values that cannot be represented as numbers are an error, never NaN.
pub fn column_to_vec(series: &Series) -> Result<Vec<f64>> {
    if matches!(series.dtype(), DataType::String) {
        return Err(StorageError::DataError(format!(
            "column '{}' holds strings, expected numeric values",
            series.name()
        )));
    }
    let cast = series.strict_cast(&DataType::Float64)?;
    let values = cast
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

/// Cast a series to a dense `f64` array; nulls become NaN
pub fn column_to_array(series: &Series) -> Result<Array1<f64>> {
    Ok(Array1::from(column_to_vec(series)?))
}

/// Row-major `f64` matrix of every column in `df`
pub fn frame_to_array2(df: &DataFrame) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = df.width();

    let col_data: Vec<Vec<f64>> = df
        .get_columns()
        .iter()
        .map(|column| column_to_vec(column.as_materialized_series()))
        .collect::<Result<Vec<_>>>()?;

    // Polars data is column-major, build row-major directly
    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}

/// Length check used wherever a caller hands in per-row values
pub(crate) fn ensure_length(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(StorageError::dimension_mismatch(what, expected, actual));
    }
    Ok(())
}
