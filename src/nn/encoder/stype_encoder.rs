//! Base contract shared by all per-stype encoders

use ndarray::{Array3, Axis};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::data::FeatureTensor;
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::ParamMut;
use crate::stats::{ColStats, StatType};
use crate::stype::Stype;

/// How missing values are replaced before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaStrategy {
    /// Column mean (numerical)
    Mean,
    /// Zero, or category 0 for categorical columns
    Zeros,
    /// The most frequent category (categorical, multicategorical)
    MostFrequent,
    NewestTimestamp,
    OldestTimestamp,
    MedianTimestamp,
}

impl NaStrategy {
    pub fn supports(self, stype: Stype) -> bool {
        match self {
            NaStrategy::Mean => stype == Stype::Numerical,
            NaStrategy::Zeros => !matches!(stype, Stype::Timestamp),
            NaStrategy::MostFrequent => matches!(stype, Stype::Categorical | Stype::MultiCategorical),
            NaStrategy::NewestTimestamp | NaStrategy::OldestTimestamp | NaStrategy::MedianTimestamp => {
                stype == Stype::Timestamp
            }
        }
    }

    fn time_stat(self) -> Option<StatType> {
        match self {
            NaStrategy::NewestTimestamp => Some(StatType::NewestTime),
            NaStrategy::OldestTimestamp => Some(StatType::OldestTime),
            NaStrategy::MedianTimestamp => Some(StatType::MedianTime),
            _ => None,
        }
    }
}

impl fmt::Display for NaStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NaStrategy::Mean => "mean",
            NaStrategy::Zeros => "zeros",
            NaStrategy::MostFrequent => "most_frequent",
            NaStrategy::NewestTimestamp => "newest_timestamp",
            NaStrategy::OldestTimestamp => "oldest_timestamp",
            NaStrategy::MedianTimestamp => "median_timestamp",
        };
        f.write_str(name)
    }
}

/// What an encoder was initialized with.
#[derive(Debug, Clone)]
pub struct EncoderState {
    pub out_channels: usize,
    pub stype: Stype,
    pub stats_list: Vec<ColStats>,
}

impl EncoderState {
    pub fn num_cols(&self) -> usize {
        self.stats_list.len()
    }
}

/// Encoder for the columns of one stype.
///
/// An encoder is created with its options only; [`StypeEncoder::init`] binds
/// it to a stype, the column statistics and the output width. `forward`
/// returns `[rows, cols, out_channels]`; `backward` accumulates parameter
/// gradients for the most recent `forward`.
pub trait StypeEncoder: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_stypes(&self) -> &'static [Stype];

    fn na_strategy(&self) -> Option<NaStrategy>;

    fn clone_box(&self) -> Box<dyn StypeEncoder>;

    /// `None` until initialized.
    fn state(&self) -> Option<&EncoderState>;

    /// Store `state` and allocate parameters.
    fn init_modules(&mut self, state: EncoderState, rng: &mut Xoshiro256PlusPlus) -> Result<()>;

    /// Encode NA-filled features. Missing inputs may produce NaN outputs.
    fn encode_forward(&mut self, feat: &FeatureTensor) -> Result<Array3<f64>>;

    /// Accumulate parameter gradients. Cells whose output was NaN contribute nothing.
    fn encode_backward(&mut self, grad: &Array3<f64>) -> Result<()>;

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>>;

    fn out_channels(&self) -> Option<usize> {
        self.state().map(|s| s.out_channels)
    }

    /// Validate and initialize for `stype` columns described by `stats_list`.
    fn init(
        &mut self,
        out_channels: usize,
        stats_list: Vec<ColStats>,
        stype: Stype,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<()> {
        if !self.supported_stypes().contains(&stype) {
            return Err(TabFrameError::UnsupportedStype {
                encoder: self.name().to_string(),
                stype,
            });
        }
        if let Some(strategy) = self.na_strategy() {
            if !strategy.supports(stype) {
                return Err(TabFrameError::InvalidParameter {
                    name: "na_strategy".to_string(),
                    value: strategy.to_string(),
                    reason: format!("not applicable to {} columns", stype),
                });
            }
        }
        if out_channels == 0 {
            return Err(TabFrameError::InvalidParameter {
                name: "out_channels".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(stats) = stats_list.iter().find(|s| !s.has_stats_for(stype)) {
            return Err(TabFrameError::ValidationError(format!(
                "column '{}' lacks the statistics required for {}",
                stats.name, stype
            )));
        }

        debug!(
            encoder = self.name(),
            %stype,
            cols = stats_list.len(),
            out_channels,
            "Initializing stype encoder"
        );
        self.init_modules(
            EncoderState {
                out_channels,
                stype,
                stats_list,
            },
            rng,
        )
    }

    /// NA handling, encoding, and NaN replacement.
    fn forward(&mut self, feat: &FeatureTensor, col_names: &[String]) -> Result<Array3<f64>> {
        let state = self
            .state()
            .ok_or_else(|| TabFrameError::EncoderNotInitialized(self.name().to_string()))?;

        if !feat.matches_stype(state.stype) {
            return Err(TabFrameError::ValidationError(format!(
                "{} expects {} features, got {} tensor",
                self.name(),
                state.stype,
                feat.kind()
            )));
        }
        if feat.num_cols() != state.num_cols() || col_names.len() != state.num_cols() {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} columns", state.num_cols()),
                actual: format!("{} features, {} names", feat.num_cols(), col_names.len()),
            });
        }
        if let Some((name, stats)) = col_names
            .iter()
            .zip(&state.stats_list)
            .find(|(name, stats)| **name != stats.name)
        {
            return Err(TabFrameError::ValidationError(format!(
                "column '{}' does not match initialized column '{}'",
                name, stats.name
            )));
        }

        let mut out = match self.na_strategy() {
            Some(strategy) => {
                let filled = fill_na(feat, strategy, &state.stats_list)?;
                self.encode_forward(&filled)?
            }
            None => self.encode_forward(feat)?,
        };
        out.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
        Ok(out)
    }

    fn backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let state = self
            .state()
            .ok_or_else(|| TabFrameError::EncoderNotInitialized(self.name().to_string()))?;
        if grad.len_of(Axis(1)) != state.num_cols() || grad.len_of(Axis(2)) != state.out_channels {
            return Err(TabFrameError::ShapeError {
                expected: format!("[*, {}, {}]", state.num_cols(), state.out_channels),
                actual: format!("{:?}", grad.shape()),
            });
        }
        self.encode_backward(grad)
    }
}

impl Clone for Box<dyn StypeEncoder> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Replace missing entries according to `strategy`.
pub fn fill_na(feat: &FeatureTensor, strategy: NaStrategy, stats_list: &[ColStats]) -> Result<FeatureTensor> {
    let mut filled = feat.clone();
    match (&mut filled, strategy) {
        (FeatureTensor::Numerical(x), NaStrategy::Mean) => {
            for (mut col, stats) in x.axis_iter_mut(Axis(1)).zip(stats_list) {
                let mean = stats.require_mean()?;
                col.mapv_inplace(|v| if v.is_nan() { mean } else { v });
            }
        }
        (FeatureTensor::Numerical(x), NaStrategy::Zeros) => {
            x.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
        }
        (FeatureTensor::Categorical(x), NaStrategy::MostFrequent | NaStrategy::Zeros) => {
            // category 0 is the most frequent one
            x.mapv_inplace(|v| if v == -1 { 0 } else { v });
        }
        (FeatureTensor::MultiCategorical(x), NaStrategy::MostFrequent | NaStrategy::Zeros) => {
            x.fill_missing(0);
        }
        (FeatureTensor::Timestamp(x), strategy) if strategy.time_stat().is_some() => {
            let stat = strategy.time_stat().unwrap_or(StatType::MedianTime);
            for (mut col, stats) in x.axis_iter_mut(Axis(1)).zip(stats_list) {
                let fill = stats.require_time(stat)?;
                for mut row in col.axis_iter_mut(Axis(0)) {
                    for (v, f) in row.iter_mut().zip(fill.iter()) {
                        if *v == -1 {
                            *v = *f;
                        }
                    }
                }
            }
        }
        (FeatureTensor::Embedding(x), NaStrategy::Zeros) => {
            x.values_mut().mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
        }
        (other, strategy) => {
            return Err(TabFrameError::InvalidParameter {
                name: "na_strategy".to_string(),
                value: strategy.to_string(),
                reason: format!("not applicable to {} features", other.kind()),
            });
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_strategy_support() {
        assert!(NaStrategy::Mean.supports(Stype::Numerical));
        assert!(!NaStrategy::Mean.supports(Stype::Categorical));
        assert!(NaStrategy::MedianTimestamp.supports(Stype::Timestamp));
        assert!(!NaStrategy::Zeros.supports(Stype::Timestamp));
        assert!(NaStrategy::Zeros.supports(Stype::Embedding));
    }

    #[test]
    fn test_fill_mean() {
        let feat = FeatureTensor::Numerical(array![[1.0, f64::NAN], [f64::NAN, 4.0]]);
        let stats = vec![ColStats::numerical("a", &[1.0, 3.0]).unwrap(), ColStats::numerical("b", &[4.0]).unwrap()];
        match fill_na(&feat, NaStrategy::Mean, &stats).unwrap() {
            FeatureTensor::Numerical(x) => assert_eq!(x, array![[1.0, 4.0], [2.0, 4.0]]),
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_fill_timestamp() {
        let mut raw = Array3::<i64>::zeros((2, 1, 7));
        raw.slice_mut(ndarray::s![1, 0, ..]).fill(-1);
        let mut stats = ColStats::new("t");
        stats.median_time = Some([2020, 1, 2, 3, 4, 5, 6]);
        let filled = fill_na(&FeatureTensor::Timestamp(raw), NaStrategy::MedianTimestamp, &[stats]).unwrap();
        match filled {
            FeatureTensor::Timestamp(x) => {
                assert_eq!(x.slice(ndarray::s![1, 0, ..]).to_vec(), vec![2020, 1, 2, 3, 4, 5, 6]);
                assert_eq!(x[[0, 0, 0]], 0);
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_fill_mismatch() {
        let feat = FeatureTensor::Categorical(array![[0]]);
        assert!(fill_na(&feat, NaStrategy::Mean, &[]).is_err());
    }
}
