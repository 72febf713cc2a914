//! Per-column statistics
//!
//! Encoders are initialized from these: numerical encoders normalize with
//! mean/std or bin by quantiles, categorical encoders size their tables from
//! the category counts, timestamp encoders need the year range and the fill
//! values for missing timestamps.

use chrono::{Datelike, NaiveDateTime, Timelike};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TabFrameError};
use crate::stype::Stype;

/// Number of fields in a materialized timestamp.
pub const NUM_TIME_FIELDS: usize = 7;

/// `[year, month - 1, day - 1, weekday (Mon = 0), hour, minute, second]`
pub type TimeFields = [i64; NUM_TIME_FIELDS];

/// Quantile levels stored under [`StatType::Quantiles`].
pub const QUANTILE_LEVELS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Split a datetime into its time fields.
pub fn to_time_fields(dt: &NaiveDateTime) -> TimeFields {
    [
        dt.year() as i64,
        dt.month0() as i64,
        dt.day0() as i64,
        dt.weekday().num_days_from_monday() as i64,
        dt.hour() as i64,
        dt.minute() as i64,
        dt.second() as i64,
    ]
}

/// Kind of statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    Mean,
    Std,
    Quantiles,
    Count,
    MultiCount,
    YearRange,
    NewestTime,
    OldestTime,
    MedianTime,
    EmbDim,
}

impl StatType {
    /// Stats computed for a column of the given stype.
    pub fn stats_for_stype(stype: Stype) -> &'static [StatType] {
        match stype {
            Stype::Numerical => &[StatType::Mean, StatType::Std, StatType::Quantiles],
            Stype::Categorical => &[StatType::Count],
            Stype::MultiCategorical => &[StatType::MultiCount],
            Stype::Timestamp => &[
                StatType::YearRange,
                StatType::NewestTime,
                StatType::OldestTime,
                StatType::MedianTime,
            ],
            Stype::TextEmbedded | Stype::Embedding => &[StatType::EmbDim],
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatType::Mean => "MEAN",
            StatType::Std => "STD",
            StatType::Quantiles => "QUANTILES",
            StatType::Count => "COUNT",
            StatType::MultiCount => "MULTI_COUNT",
            StatType::YearRange => "YEAR_RANGE",
            StatType::NewestTime => "NEWEST_TIME",
            StatType::OldestTime => "OLDEST_TIME",
            StatType::MedianTime => "MEDIAN_TIME",
            StatType::EmbDim => "EMB_DIM",
        };
        f.write_str(name)
    }
}

/// Categories ordered by descending frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub categories: Vec<String>,
    pub counts: Vec<usize>,
}

impl CategoryCounts {
    /// Count the non-null values of `series`. Ties are ordered by category name.
    pub fn from_series(series: &Series) -> Result<Self> {
        let series = series
            .cast(&DataType::String)?
            .drop_nulls()
            .with_name("category".into());
        let counts = series.value_counts(false, false, "count".into(), false)?;

        let column = |idx: usize| {
            counts
                .select_at_idx(idx)
                .map(|c| c.as_materialized_series().clone())
                .ok_or_else(|| TabFrameError::DataError("value counts are missing a column".to_string()))
        };
        let categories = column(0)?;
        let totals = column(1)?.cast(&DataType::UInt64)?;

        let mut pairs: Vec<(String, usize)> = categories
            .str()?
            .into_iter()
            .zip(totals.u64()?.into_iter())
            .filter_map(|(c, n)| Some((c?.to_string(), n? as usize)))
            .collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            categories: pairs.iter().map(|(c, _)| c.clone()).collect(),
            counts: pairs.iter().map(|(_, n)| *n).collect(),
        })
    }

    pub fn num_categories(&self) -> usize {
        self.categories.len()
    }

    /// Lookup table from category to index.
    pub fn index(&self) -> HashMap<&str, i64> {
        self.categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i as i64))
            .collect()
    }
}

/// Statistics of a single column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColStats {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantiles: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<CategoryCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_count: Option<CategoryCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_range: Option<[i64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_time: Option<TimeFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_time: Option<TimeFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_time: Option<TimeFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emb_dim: Option<usize>,
}

impl ColStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Mean, population std and linear quantiles of a numeric series.
    /// Nulls and NaN are ignored; an all-missing column gets mean 0, std 1.
    pub fn from_numerical_series(series: &Series) -> Result<Self> {
        let casted = series.cast(&DataType::Float64)?;
        let ca: Float64Chunked = casted
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        let mut stats = Self::new(series.name().to_string());

        if ca.null_count() == ca.len() {
            stats.mean = Some(0.0);
            stats.std = Some(1.0);
            stats.quantiles = Some(vec![0.0; QUANTILE_LEVELS.len()]);
            return Ok(stats);
        }

        let quantiles = QUANTILE_LEVELS
            .iter()
            .map(|&q| Ok(ca.quantile(q, QuantileMethod::Linear)?.unwrap_or(0.0)))
            .collect::<Result<Vec<_>>>()?;

        stats.mean = Some(ca.mean().unwrap_or(0.0));
        stats.std = Some(ca.std(0).unwrap_or(1.0));
        stats.quantiles = Some(quantiles);
        Ok(stats)
    }

    pub fn numerical(name: impl Into<String>, values: &[f64]) -> Result<Self> {
        let name: String = name.into();
        Self::from_numerical_series(&Series::new(name.into(), values))
    }

    /// Category counts of a categorical series. Nulls are missing.
    pub fn from_categorical_series(series: &Series) -> Result<Self> {
        let mut stats = Self::new(series.name().to_string());
        stats.count = Some(CategoryCounts::from_series(series)?);
        Ok(stats)
    }

    pub fn categorical(name: impl Into<String>, values: &[Option<String>]) -> Result<Self> {
        let name: String = name.into();
        Self::from_categorical_series(&Series::new(name.into(), values))
    }

    /// Category counts over the flattened cells of a multicategorical column.
    pub fn multicategorical(name: impl Into<String>, values: &[Option<Vec<String>>]) -> Result<Self> {
        let name: String = name.into();
        let items: Vec<&str> = values
            .iter()
            .flatten()
            .flat_map(|cell| cell.iter().map(String::as_str))
            .collect();
        let mut stats = Self::new(name.clone());
        stats.multi_count = Some(CategoryCounts::from_series(&Series::new(name.into(), items))?);
        Ok(stats)
    }

    /// Year range and newest/oldest/median timestamps.
    pub fn timestamp(name: impl Into<String>, values: &[Option<NaiveDateTime>]) -> Result<Self> {
        let name = name.into();
        let mut present: Vec<NaiveDateTime> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return Err(TabFrameError::DataError(format!(
                "timestamp column '{}' has no valid values",
                name
            )));
        }
        present.sort();

        let oldest = to_time_fields(&present[0]);
        let newest = to_time_fields(&present[present.len() - 1]);
        let median = to_time_fields(&present[(present.len() - 1) / 2]);

        let mut stats = Self::new(name);
        stats.year_range = Some([oldest[0], newest[0]]);
        stats.newest_time = Some(newest);
        stats.oldest_time = Some(oldest);
        stats.median_time = Some(median);
        Ok(stats)
    }

    pub fn embedding(name: impl Into<String>, emb_dim: usize) -> Self {
        let mut stats = Self::new(name);
        stats.emb_dim = Some(emb_dim);
        stats
    }

    fn missing(&self, stat: StatType) -> TabFrameError {
        TabFrameError::MissingStat {
            column: self.name.clone(),
            stat: stat.to_string(),
        }
    }

    pub fn require_mean(&self) -> Result<f64> {
        self.mean.ok_or_else(|| self.missing(StatType::Mean))
    }

    pub fn require_std(&self) -> Result<f64> {
        self.std.ok_or_else(|| self.missing(StatType::Std))
    }

    pub fn require_quantiles(&self) -> Result<&[f64]> {
        self.quantiles
            .as_deref()
            .ok_or_else(|| self.missing(StatType::Quantiles))
    }

    pub fn require_count(&self) -> Result<&CategoryCounts> {
        self.count.as_ref().ok_or_else(|| self.missing(StatType::Count))
    }

    pub fn require_multi_count(&self) -> Result<&CategoryCounts> {
        self.multi_count
            .as_ref()
            .ok_or_else(|| self.missing(StatType::MultiCount))
    }

    pub fn require_year_range(&self) -> Result<[i64; 2]> {
        self.year_range.ok_or_else(|| self.missing(StatType::YearRange))
    }

    /// Fill value for a timestamp NA strategy.
    pub fn require_time(&self, stat: StatType) -> Result<TimeFields> {
        let value = match stat {
            StatType::NewestTime => self.newest_time,
            StatType::OldestTime => self.oldest_time,
            StatType::MedianTime => self.median_time,
            _ => None,
        };
        value.ok_or_else(|| self.missing(stat))
    }

    pub fn require_emb_dim(&self) -> Result<usize> {
        self.emb_dim.ok_or_else(|| self.missing(StatType::EmbDim))
    }

    /// Whether every stat listed for `stype` is present.
    pub fn has_stats_for(&self, stype: Stype) -> bool {
        StatType::stats_for_stype(stype).iter().all(|stat| match stat {
            StatType::Mean => self.mean.is_some(),
            StatType::Std => self.std.is_some(),
            StatType::Quantiles => self.quantiles.is_some(),
            StatType::Count => self.count.is_some(),
            StatType::MultiCount => self.multi_count.is_some(),
            StatType::YearRange => self.year_range.is_some(),
            StatType::NewestTime => self.newest_time.is_some(),
            StatType::OldestTime => self.oldest_time.is_some(),
            StatType::MedianTime => self.median_time.is_some(),
            StatType::EmbDim => self.emb_dim.is_some(),
        })
    }
}
