//! Sinusoidal encoder for timestamp columns

use ndarray::{s, Array1, Array2, Array3, Axis};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::f64::consts::PI;

use super::stype_encoder::{EncoderState, NaStrategy, StypeEncoder};
use crate::data::FeatureTensor;
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::{glorot_bound, Param2, Param3, ParamMut};
use crate::stats::NUM_TIME_FIELDS;
use crate::stype::Stype;

/// Period of month, day, weekday, hour, minute and second.
pub const CYCLIC_PERIODS: [f64; NUM_TIME_FIELDS - 1] = [12.0, 31.0, 7.0, 24.0, 60.0, 60.0];

pub const DEFAULT_OUT_SIZE: usize = 8;

/// Encodes the year offset from the column's first year with a positional
/// encoding and the remaining fields with cyclic harmonics. Each field yields
/// `out_size` features; the `7 * out_size` features of a column are mapped to
/// `out_channels` by a per-column linear layer.
#[derive(Debug, Clone)]
pub struct TimestampEncoder {
    na_strategy: Option<NaStrategy>,
    out_size: usize,
    state: Option<EncoderState>,
    min_years: Array1<f64>,
    weight: Option<Param3>,
    bias: Option<Param2>,
    cache: Option<Array3<f64>>,
}

impl Default for TimestampEncoder {
    fn default() -> Self {
        Self {
            na_strategy: Some(NaStrategy::MedianTimestamp),
            out_size: DEFAULT_OUT_SIZE,
            state: None,
            min_years: Array1::zeros(0),
            weight: None,
            bias: None,
            cache: None,
        }
    }
}

/// `[sin(y * m_0), .., sin(y * m_{h-1}), cos(y * m_0), ..]` with
/// `m_i = 10000^(-2i / size)` and `h = size / 2`.
pub fn positional_encoding(y: f64, size: usize, out: &mut [f64]) {
    let half = size / 2;
    for i in 0..half {
        let mult = 10000f64.powf(-2.0 * i as f64 / size as f64);
        out[i] = (y * mult).sin();
        out[half + i] = (y * mult).cos();
    }
}

/// `[sin(2πkx) for k in 1..=h, cos(2πkx) for k in 1..=h]` with `h = size / 2`.
pub fn cyclic_encoding(x: f64, size: usize, out: &mut [f64]) {
    let half = size / 2;
    for k in 0..half {
        let angle = 2.0 * PI * (k + 1) as f64 * x;
        out[k] = angle.sin();
        out[half + k] = angle.cos();
    }
}

impl TimestampEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_na_strategy(mut self, na_strategy: NaStrategy) -> Self {
        self.na_strategy = Some(na_strategy);
        self
    }

    /// Keep missing timestamps; their cells encode to zeros.
    pub fn without_na_strategy(mut self) -> Self {
        self.na_strategy = None;
        self
    }

    pub fn with_out_size(mut self, out_size: usize) -> Self {
        self.out_size = out_size;
        self
    }

    pub fn out_size(&self) -> usize {
        self.out_size
    }

    /// `[rows, cols, 7 * out_size]`; rows with a missing field are NaN.
    fn time_features(&self, x: &Array3<i64>) -> Array3<f64> {
        let (num_rows, num_cols, _) = x.dim();
        let size = self.out_size;
        let mut feats = Array3::zeros((num_rows, num_cols, NUM_TIME_FIELDS * size));

        for i in 0..num_rows {
            for j in 0..num_cols {
                let fields = x.slice(s![i, j, ..]);
                let mut cell = feats.slice_mut(s![i, j, ..]);
                if fields.iter().any(|&v| v == -1) {
                    cell.fill(f64::NAN);
                    continue;
                }
                let Some(buf) = cell.as_slice_mut() else {
                    continue;
                };
                let year = fields[0] as f64 - self.min_years[j];
                positional_encoding(year, size, &mut buf[..size]);
                for (f, period) in CYCLIC_PERIODS.iter().enumerate() {
                    let start = (f + 1) * size;
                    cyclic_encoding(fields[f + 1] as f64 / period, size, &mut buf[start..start + size]);
                }
            }
        }
        feats
    }
}

impl StypeEncoder for TimestampEncoder {
    fn name(&self) -> &'static str {
        "TimestampEncoder"
    }

    fn supported_stypes(&self) -> &'static [Stype] {
        &[Stype::Timestamp]
    }

    fn na_strategy(&self) -> Option<NaStrategy> {
        self.na_strategy
    }

    fn clone_box(&self) -> Box<dyn StypeEncoder> {
        Box::new(self.clone())
    }

    fn state(&self) -> Option<&EncoderState> {
        self.state.as_ref()
    }

    fn init_modules(&mut self, state: EncoderState, rng: &mut Xoshiro256PlusPlus) -> Result<()> {
        if self.out_size == 0 || self.out_size % 2 != 0 {
            return Err(TabFrameError::InvalidParameter {
                name: "out_size".to_string(),
                value: self.out_size.to_string(),
                reason: "must be a positive even number".to_string(),
            });
        }
        self.min_years = state
            .stats_list
            .iter()
            .map(|s| s.require_year_range().map(|range| range[0] as f64))
            .collect::<Result<Array1<f64>>>()?;

        let in_features = NUM_TIME_FIELDS * self.out_size;
        let num_cols = state.num_cols();
        let bound = glorot_bound(in_features, state.out_channels);
        self.weight = Some(Param3::uniform((num_cols, in_features, state.out_channels), bound, rng));
        self.bias = Some(Param2::zeros((num_cols, state.out_channels)));
        self.state = Some(state);
        self.cache = None;
        Ok(())
    }

    fn encode_forward(&mut self, feat: &FeatureTensor) -> Result<Array3<f64>> {
        let FeatureTensor::Timestamp(x) = feat else {
            return Err(TabFrameError::ValidationError(format!(
                "TimestampEncoder got {} features",
                feat.kind()
            )));
        };
        if x.len_of(Axis(2)) != NUM_TIME_FIELDS {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} time fields", NUM_TIME_FIELDS),
                actual: x.len_of(Axis(2)).to_string(),
            });
        }
        let (weight, bias) = match (&self.weight, &self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(TabFrameError::EncoderNotInitialized(self.name().to_string())),
        };

        let feats = self.time_features(x);
        let (num_rows, num_cols, _) = feats.dim();
        let mut out = Array3::zeros((num_rows, num_cols, bias.value.ncols()));
        for j in 0..num_cols {
            let mixed = feats.index_axis(Axis(1), j).dot(&weight.value.index_axis(Axis(0), j)) + &bias.value.row(j);
            out.index_axis_mut(Axis(1), j).assign(&mixed);
        }

        self.cache = Some(feats);
        Ok(out)
    }

    fn encode_backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let feats = self
            .cache
            .as_ref()
            .ok_or_else(|| TabFrameError::BackwardBeforeForward("TimestampEncoder".to_string()))?;
        let (weight, bias) = match (&mut self.weight, &mut self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(TabFrameError::EncoderNotInitialized("TimestampEncoder".to_string())),
        };
        if grad.len_of(Axis(0)) != feats.len_of(Axis(0)) {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} rows", feats.len_of(Axis(0))),
                actual: format!("{} rows", grad.len_of(Axis(0))),
            });
        }

        for j in 0..feats.len_of(Axis(1)) {
            let f = feats.index_axis(Axis(1), j);
            let present: Vec<usize> = (0..f.nrows()).filter(|&i| !f[[i, 0]].is_nan()).collect();
            let fs: Array2<f64> = f.select(Axis(0), &present);
            let gs = grad.index_axis(Axis(1), j).select(Axis(0), &present);

            let mut gw = weight.grad.index_axis_mut(Axis(0), j);
            gw += &fs.t().dot(&gs);
            let mut gb = bias.grad.row_mut(j);
            gb += &gs.sum_axis(Axis(0));
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = Vec::new();
        if let Some(w) = self.weight.as_mut() {
            params.push(ParamMut::from(w));
        }
        if let Some(b) = self.bias.as_mut() {
            params.push(ParamMut::from(b));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{to_time_fields, ColStats};
    use chrono::NaiveDate;
    use rand::SeedableRng;

    fn stats() -> ColStats {
        let times = [
            NaiveDate::from_ymd_opt(2019, 3, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            NaiveDate::from_ymd_opt(2021, 7, 15).and_then(|d| d.and_hms_opt(12, 30, 0)),
            NaiveDate::from_ymd_opt(2020, 1, 1).and_then(|d| d.and_hms_opt(6, 0, 0)),
        ];
        ColStats::timestamp("listed_at", &times).unwrap()
    }

    fn frame(rows: &[[i64; 7]]) -> FeatureTensor {
        let flat: Vec<i64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        FeatureTensor::Timestamp(Array3::from_shape_vec((rows.len(), 1, 7), flat).unwrap())
    }

    #[test]
    fn test_encodings() {
        let mut buf = [0.0; 4];
        positional_encoding(0.0, 4, &mut buf);
        assert_eq!(buf, [0.0, 0.0, 1.0, 1.0]);

        cyclic_encoding(0.25, 4, &mut buf);
        assert!((buf[0] - 1.0).abs() < 1e-12);
        assert!(buf[1].abs() < 1e-12);
        assert!(buf[2].abs() < 1e-12);
        assert!((buf[3] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_forward_shape_and_median_fill() {
        let mut enc = TimestampEncoder::new();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        enc.init(6, vec![stats()], Stype::Timestamp, &mut rng).unwrap();

        let median = stats().median_time.unwrap();
        let out = enc
            .forward(&frame(&[median, [-1; 7]]), &["listed_at".to_string()])
            .unwrap();
        assert_eq!(out.shape(), &[2, 1, 6]);
        assert_eq!(out.index_axis(Axis(0), 0), out.index_axis(Axis(0), 1));
    }

    #[test]
    fn test_missing_without_fill_is_zero() {
        let mut enc = TimestampEncoder::new().without_na_strategy();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        enc.init(3, vec![stats()], Stype::Timestamp, &mut rng).unwrap();
        let dt = NaiveDate::from_ymd_opt(2020, 5, 5)
            .and_then(|d| d.and_hms_opt(1, 2, 3))
            .unwrap();
        let out = enc
            .forward(&frame(&[to_time_fields(&dt), [-1; 7]]), &["listed_at".to_string()])
            .unwrap();
        assert!(out.index_axis(Axis(0), 1).iter().all(|&v| v == 0.0));

        enc.backward(&Array3::ones((2, 1, 3))).unwrap();
        assert_eq!(enc.bias.as_ref().unwrap().grad.row(0).to_vec(), vec![1.0; 3]);
    }

    #[test]
    fn test_odd_out_size_rejected() {
        let mut enc = TimestampEncoder::new().with_out_size(5);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        assert!(enc.init(3, vec![stats()], Stype::Timestamp, &mut rng).is_err());
    }

    #[test]
    fn test_rejects_zeros_strategy() {
        let mut enc = TimestampEncoder::new().with_na_strategy(NaStrategy::Zeros);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        assert!(enc.init(3, vec![stats()], Stype::Timestamp, &mut rng).is_err());
    }
}
