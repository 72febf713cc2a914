//! Convert an in-memory DataFrame into a [`Dataset`]

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array1, Array2, Array3};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::debug;

use super::{Dataset, FeatureTensor, MultiEmbeddingTensor, MultiNestedTensor, TaskType, TensorFrame};
use crate::error::{Result, TabFrameError};
use crate::stats::{to_time_fields, ColStats, TimeFields, NUM_TIME_FIELDS};
use crate::stype::Stype;

const DEFAULT_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y/%m/%d %H:%M:%S"];
const DEFAULT_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Options for parsing raw cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeConfig {
    /// Separator for multicategorical string cells
    pub multicategorical_separator: String,
    /// chrono format for timestamp string cells; defaults cover ISO-like formats.
    /// Native `Date`/`Datetime` columns are read directly.
    pub timestamp_format: Option<String>,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            multicategorical_separator: "|".to_string(),
            timestamp_format: None,
        }
    }
}

impl MaterializeConfig {
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.multicategorical_separator = separator.into();
        self
    }

    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = Some(format.into());
        self
    }
}

/// Raw values of one column, pulled out of polars
enum RawColumn {
    Numerical(Series),
    Categorical(Series),
    MultiCategorical(Vec<Option<Vec<String>>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Embedding { rows: Vec<Option<Vec<f64>>>, dim: usize },
}

/// One column after mapping to tensor values
enum EncodedColumn {
    Numerical(Vec<f64>),
    Categorical(Vec<i64>),
    MultiCategorical(Vec<Vec<i64>>),
    Timestamp(Vec<TimeFields>),
    Embedding(Array2<f64>),
}

/// Materialize `df` into a tensor frame and compute column statistics.
///
/// Feature columns are the columns of `col_to_stype` other than `target_col`,
/// taken in DataFrame order. A target with no entry in `col_to_stype` is
/// treated as numerical if its dtype is numeric, categorical otherwise.
pub fn materialize(
    df: &DataFrame,
    col_to_stype: &HashMap<String, Stype>,
    target_col: Option<&str>,
    config: &MaterializeConfig,
) -> Result<Dataset> {
    let start = Instant::now();

    for name in col_to_stype.keys() {
        if df.column(name).is_err() {
            return Err(TabFrameError::FeatureNotFound(name.clone()));
        }
    }
    if let Some(target) = target_col {
        if df.column(target).is_err() {
            return Err(TabFrameError::FeatureNotFound(target.to_string()));
        }
    }

    let mut raw_columns = Vec::new();
    for column in df.get_columns() {
        let name = column.name().to_string();
        if Some(name.as_str()) == target_col {
            continue;
        }
        if let Some(&stype) = col_to_stype.get(&name) {
            let raw = extract(column.as_materialized_series(), stype, config)?;
            raw_columns.push((name, stype, raw));
        }
    }

    let encoded: Vec<(String, Stype, ColStats, EncodedColumn)> = raw_columns
        .into_par_iter()
        .map(|(name, stype, raw)| {
            let (stats, column) = encode_column(&name, raw)?;
            Ok((name, stype, stats, column))
        })
        .collect::<Result<Vec<_>>>()?;

    let num_rows = df.height();
    let mut col_stats = HashMap::new();
    let mut grouped: BTreeMap<Stype, Vec<(String, EncodedColumn)>> = BTreeMap::new();
    for (name, stype, stats, column) in encoded {
        col_stats.insert(name.clone(), stats);
        grouped.entry(stype).or_default().push((name, column));
    }

    let mut feat_dict = BTreeMap::new();
    let mut col_names_dict = BTreeMap::new();
    for (stype, columns) in grouped {
        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let feat = stack_columns(stype, columns.into_iter().map(|(_, c)| c).collect(), num_rows)?;
        feat_dict.insert(stype, feat);
        col_names_dict.insert(stype, names);
    }

    let (y, task_type) = match target_col {
        Some(target) => {
            let series = df.column(target)?.as_materialized_series();
            let stype = match col_to_stype.get(target) {
                Some(&stype) => stype,
                None if is_numeric_dtype(series.dtype()) => Stype::Numerical,
                None => Stype::Categorical,
            };
            let (stats, y, task) = materialize_target(target, series, stype)?;
            col_stats.insert(target.to_string(), stats);
            (Some(y), Some(task))
        }
        None => (None, None),
    };

    let tensor_frame = TensorFrame::new(feat_dict, col_names_dict, y)?;
    debug!(
        rows = tensor_frame.num_rows(),
        cols = tensor_frame.num_cols(),
        elapsed = ?start.elapsed(),
        "Materialized tensor frame"
    );

    Ok(Dataset {
        tensor_frame,
        col_stats,
        target_col: target_col.map(str::to_string),
        task_type,
    })
}

fn materialize_target(name: &str, series: &Series, stype: Stype) -> Result<(ColStats, Array1<f64>, TaskType)> {
    if series.null_count() > 0 {
        return Err(TabFrameError::DataError(format!(
            "target column '{}' contains {} missing values",
            name,
            series.null_count()
        )));
    }

    match stype {
        Stype::Numerical => {
            let values = extract_f64(series)?;
            if values.iter().any(|v| v.is_nan()) {
                return Err(TabFrameError::DataError(format!(
                    "target column '{}' is not numeric",
                    name
                )));
            }
            let stats = ColStats::from_numerical_series(series)?;
            Ok((stats, Array1::from(values), TaskType::Regression))
        }
        Stype::Categorical => {
            let strings = series.cast(&DataType::String)?;
            let stats = ColStats::from_categorical_series(&strings)?;
            let (y, task) = {
                let counts = stats.require_count()?;
                let index = counts.index();
                let y: Array1<f64> = strings
                    .str()?
                    .into_iter()
                    .map(|v| v.and_then(|v| index.get(v)).map(|&i| i as f64).unwrap_or(-1.0))
                    .collect();
                let task = if counts.num_categories() == 2 {
                    TaskType::BinaryClassification
                } else {
                    TaskType::MulticlassClassification
                };
                (y, task)
            };
            Ok((stats, y, task))
        }
        other => Err(TabFrameError::InvalidParameter {
            name: "target stype".to_string(),
            value: other.to_string(),
            reason: "target must be numerical or categorical".to_string(),
        }),
    }
}

fn extract(series: &Series, stype: Stype, config: &MaterializeConfig) -> Result<RawColumn> {
    match stype {
        Stype::Numerical => Ok(RawColumn::Numerical(series.cast(&DataType::Float64)?)),
        Stype::Categorical => Ok(RawColumn::Categorical(series.cast(&DataType::String)?)),
        Stype::MultiCategorical => {
            let cells = match series.dtype() {
                DataType::List(_) => {
                    let ca = series.list()?;
                    (0..ca.len())
                        .map(|i| match ca.get_as_series(i) {
                            Some(inner) => Ok(Some(extract_strings(&inner)?.into_iter().flatten().collect())),
                            None => Ok(None),
                        })
                        .collect::<Result<Vec<_>>>()?
                }
                _ => {
                    let sep = config.multicategorical_separator.as_str();
                    extract_strings(series)?
                        .into_iter()
                        .map(|cell| {
                            cell.map(|s| {
                                s.split(sep)
                                    .map(str::trim)
                                    .filter(|item| !item.is_empty())
                                    .map(str::to_string)
                                    .collect()
                            })
                        })
                        .collect()
                }
            };
            Ok(RawColumn::MultiCategorical(cells))
        }
        Stype::Timestamp => Ok(RawColumn::Timestamp(extract_timestamps(series, config)?)),
        Stype::Embedding | Stype::TextEmbedded => {
            let ca = series.list()?;
            let mut dim: Option<usize> = None;
            let mut rows = Vec::with_capacity(ca.len());
            for i in 0..ca.len() {
                match ca.get_as_series(i) {
                    Some(inner) => {
                        let values = extract_f64(&inner)?;
                        match dim {
                            None => dim = Some(values.len()),
                            Some(d) if d != values.len() => {
                                return Err(TabFrameError::ShapeError {
                                    expected: format!("embedding dim {}", d),
                                    actual: format!("dim {} in row {} of '{}'", values.len(), i, series.name()),
                                });
                            }
                            _ => {}
                        }
                        rows.push(Some(values));
                    }
                    None => rows.push(None),
                }
            }
            let dim = dim.ok_or_else(|| {
                TabFrameError::DataError(format!("embedding column '{}' has no values", series.name()))
            })?;
            Ok(RawColumn::Embedding { rows, dim })
        }
    }
}

fn encode_column(name: &str, raw: RawColumn) -> Result<(ColStats, EncodedColumn)> {
    Ok(match raw {
        RawColumn::Numerical(series) => {
            let stats = ColStats::from_numerical_series(&series)?;
            (stats, EncodedColumn::Numerical(extract_f64(&series)?))
        }
        RawColumn::Categorical(series) => {
            let stats = ColStats::from_categorical_series(&series)?;
            let encoded = {
                let index = stats.require_count()?.index();
                series
                    .str()?
                    .into_iter()
                    .map(|v| v.and_then(|v| index.get(v)).copied().unwrap_or(-1))
                    .collect()
            };
            (stats, EncodedColumn::Categorical(encoded))
        }
        RawColumn::MultiCategorical(values) => {
            let stats = ColStats::multicategorical(name, &values)?;
            let encoded = {
                let index = stats.require_multi_count()?.index();
                values
                    .iter()
                    .map(|cell| match cell {
                        Some(items) => items.iter().filter_map(|item| index.get(item.as_str()).copied()).collect(),
                        None => vec![-1],
                    })
                    .collect()
            };
            (stats, EncodedColumn::MultiCategorical(encoded))
        }
        RawColumn::Timestamp(values) => {
            let stats = ColStats::timestamp(name, &values)?;
            let encoded = values
                .iter()
                .map(|v| v.as_ref().map(to_time_fields).unwrap_or([-1; NUM_TIME_FIELDS]))
                .collect();
            (stats, EncodedColumn::Timestamp(encoded))
        }
        RawColumn::Embedding { rows, dim } => {
            let mut values = Array2::from_elem((rows.len(), dim), f64::NAN);
            for (i, row) in rows.iter().enumerate() {
                if let Some(row) = row {
                    for (j, v) in row.iter().enumerate() {
                        values[[i, j]] = *v;
                    }
                }
            }
            (ColStats::embedding(name, dim), EncodedColumn::Embedding(values))
        }
    })
}

fn stack_columns(stype: Stype, columns: Vec<EncodedColumn>, num_rows: usize) -> Result<FeatureTensor> {
    let num_cols = columns.len();
    let mismatch = || TabFrameError::ValidationError(format!("mixed column encodings under stype {}", stype));

    match stype {
        Stype::Numerical => {
            let cols = columns
                .into_iter()
                .map(|c| match c {
                    EncodedColumn::Numerical(v) => Ok(v),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureTensor::Numerical(Array2::from_shape_fn((num_rows, num_cols), |(i, j)| cols[j][i])))
        }
        Stype::Categorical => {
            let cols = columns
                .into_iter()
                .map(|c| match c {
                    EncodedColumn::Categorical(v) => Ok(v),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureTensor::Categorical(Array2::from_shape_fn((num_rows, num_cols), |(i, j)| cols[j][i])))
        }
        Stype::MultiCategorical => {
            let cols = columns
                .into_iter()
                .map(|c| match c {
                    EncodedColumn::MultiCategorical(v) => Ok(v),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureTensor::MultiCategorical(MultiNestedTensor::from_columns(cols)?))
        }
        Stype::Timestamp => {
            let cols = columns
                .into_iter()
                .map(|c| match c {
                    EncodedColumn::Timestamp(v) => Ok(v),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureTensor::Timestamp(Array3::from_shape_fn(
                (num_rows, num_cols, NUM_TIME_FIELDS),
                |(i, j, k)| cols[j][i][k],
            )))
        }
        Stype::Embedding | Stype::TextEmbedded => {
            let cols = columns
                .into_iter()
                .map(|c| match c {
                    EncodedColumn::Embedding(v) => Ok(v),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureTensor::Embedding(MultiEmbeddingTensor::from_tensor_list(&cols)?))
        }
    }
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

fn extract_f64(series: &Series) -> Result<Vec<f64>> {
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn extract_strings(series: &Series) -> Result<Vec<Option<String>>> {
    let casted = series.cast(&DataType::String)?;
    Ok(casted.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Native temporal columns are converted directly; the configured format
/// applies to string cells only.
fn extract_timestamps(series: &Series, config: &MaterializeConfig) -> Result<Vec<Option<NaiveDateTime>>> {
    match series.dtype() {
        DataType::Datetime(_, _) => Ok(series.datetime()?.as_datetime_iter().collect()),
        DataType::Date => Ok(series
            .date()?
            .as_date_iter()
            .map(|d| d.and_then(|d| d.and_hms_opt(0, 0, 0)))
            .collect()),
        _ => {
            let format = match series.dtype() {
                DataType::String => config.timestamp_format.as_deref(),
                _ => None,
            };
            extract_strings(series)?
                .into_iter()
                .map(|cell| match cell {
                    Some(s) => parse_timestamp(&s, format).map(Some).ok_or_else(|| {
                        TabFrameError::DataError(format!(
                            "cannot parse '{}' in column '{}' as a timestamp",
                            s,
                            series.name()
                        ))
                    }),
                    None => Ok(None),
                })
                .collect()
        }
    }
}

fn parse_timestamp(s: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(s, fmt).ok().and_then(|d| d.and_hms_opt(0, 0, 0)));
    }
    DEFAULT_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DEFAULT_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_defaults() {
        let dt = parse_timestamp("2021-04-05 10:11:12", None).unwrap();
        assert_eq!(to_time_fields(&dt), [2021, 3, 4, 0, 10, 11, 12]);
        assert!(parse_timestamp("2021-04-05T10:11:12.250", None).is_some());
        assert!(parse_timestamp("2021-04-05", None).is_some());
        assert!(parse_timestamp("yesterday", None).is_none());
    }

    #[test]
    fn test_parse_timestamp_custom_format() {
        let dt = parse_timestamp("05/04/2021", Some("%d/%m/%Y")).unwrap();
        assert_eq!(to_time_fields(&dt)[..3], [2021, 3, 4]);
    }

    #[test]
    fn test_materialize_numerical_and_categorical() {
        let df = df!(
            "x" => &[Some(1.0), None, Some(3.0)],
            "c" => &[Some("b"), Some("a"), Some("b")],
            "ignored" => &[1, 2, 3],
            "y" => &[0.5, 1.5, 2.5],
        )
        .unwrap();
        let col_to_stype = HashMap::from([
            ("x".to_string(), Stype::Numerical),
            ("c".to_string(), Stype::Categorical),
            ("y".to_string(), Stype::Numerical),
        ]);
        let ds = materialize(&df, &col_to_stype, Some("y"), &MaterializeConfig::default()).unwrap();

        assert_eq!(ds.task_type, Some(TaskType::Regression));
        assert_eq!(ds.tensor_frame.col_names(), vec!["x", "c"]);
        match &ds.tensor_frame.feat_dict[&Stype::Numerical] {
            FeatureTensor::Numerical(x) => {
                assert_eq!(x[[0, 0]], 1.0);
                assert!(x[[1, 0]].is_nan());
            }
            other => panic!("unexpected {}", other.kind()),
        }
        match &ds.tensor_frame.feat_dict[&Stype::Categorical] {
            FeatureTensor::Categorical(c) => assert_eq!(c.column(0).to_vec(), vec![0, 1, 0]),
            other => panic!("unexpected {}", other.kind()),
        }
        assert!(ds.col_stats.contains_key("y"));
        assert!(!ds.col_stats.contains_key("ignored"));
    }

    #[test]
    fn test_materialize_unknown_column() {
        let df = df!("x" => &[1.0]).unwrap();
        let col_to_stype = HashMap::from([("nope".to_string(), Stype::Numerical)]);
        let err = materialize(&df, &col_to_stype, None, &MaterializeConfig::default()).unwrap_err();
        assert!(matches!(err, TabFrameError::FeatureNotFound(_)));
    }

    fn native_timestamp_frame() -> DataFrame {
        let at = |y, m, d, h, mi, s| {
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, mi, s)
                .unwrap()
        };
        let datetimes = Series::new("t".into(), &[at(2021, 4, 5, 10, 11, 12), at(2022, 1, 2, 1, 2, 3)]);
        let dates = Series::new(
            "d".into(),
            &[NaiveDate::from_ymd_opt(2019, 7, 1).unwrap(), NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()],
        );
        DataFrame::new(vec![datetimes.into(), dates.into()]).unwrap()
    }

    #[test]
    fn test_materialize_native_temporal_columns() {
        let df = native_timestamp_frame();
        let col_to_stype = HashMap::from([
            ("t".to_string(), Stype::Timestamp),
            ("d".to_string(), Stype::Timestamp),
        ]);

        // the string format must not apply to native temporal columns
        for config in [
            MaterializeConfig::default(),
            MaterializeConfig::default().with_timestamp_format("%d/%m/%Y"),
        ] {
            let ds = materialize(&df, &col_to_stype, None, &config).unwrap();
            assert_eq!(ds.col_stats["t"].year_range, Some([2021, 2022]));
            assert_eq!(ds.col_stats["d"].year_range, Some([2019, 2020]));
            match &ds.tensor_frame.feat_dict[&Stype::Timestamp] {
                FeatureTensor::Timestamp(t) => {
                    assert_eq!(t.slice(ndarray::s![0, 0, ..]).to_vec(), vec![2021, 3, 4, 0, 10, 11, 12]);
                    // 2020-02-29 is a Saturday
                    assert_eq!(t.slice(ndarray::s![1, 1, ..]).to_vec(), vec![2020, 1, 28, 5, 0, 0, 0]);
                }
                other => panic!("unexpected {}", other.kind()),
            }
        }
    }

    #[test]
    fn test_materialize_string_timestamp_format() {
        let df = df!("t" => &["05/04/2021", "31/12/2022"]).unwrap();
        let col_to_stype = HashMap::from([("t".to_string(), Stype::Timestamp)]);
        let config = MaterializeConfig::default().with_timestamp_format("%d/%m/%Y");
        let ds = materialize(&df, &col_to_stype, None, &config).unwrap();
        assert_eq!(ds.col_stats["t"].year_range, Some([2021, 2022]));
        assert!(materialize(&df, &col_to_stype, None, &MaterializeConfig::default()).is_err());
    }

    #[test]
    fn test_materialize_bad_timestamp() {
        let df = df!("t" => &["2020-01-01", "not a date"]).unwrap();
        let col_to_stype = HashMap::from([("t".to_string(), Stype::Timestamp)]);
        assert!(materialize(&df, &col_to_stype, None, &MaterializeConfig::default()).is_err());
    }
}
