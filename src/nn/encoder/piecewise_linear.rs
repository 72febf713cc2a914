//! Piecewise linear encoding of numerical columns over quantile bins

use ndarray::{Array2, Array3, Axis};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::stype_encoder::{EncoderState, NaStrategy, StypeEncoder};
use crate::data::FeatureTensor;
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::{glorot_bound, Param2, Param3, ParamMut};
use crate::stype::Stype;

const WIDTH_EPS: f64 = 1e-8;

/// Expands each value into one activation per quantile bin, then mixes the
/// bins with a per-column `[bins, out_channels]` weight.
///
/// A value inside bin `t` activates every lower bin fully, bin `t` by its
/// relative position, and leaves higher bins at zero. The outer bins are
/// unclamped on their open side so values beyond the observed range still
/// extrapolate.
#[derive(Debug, Clone, Default)]
pub struct PiecewiseLinearEncoder {
    na_strategy: Option<NaStrategy>,
    state: Option<EncoderState>,
    /// `[cols, bins + 1]`
    boundaries: Array2<f64>,
    weight: Option<Param3>,
    bias: Option<Param2>,
    cache: Option<Array3<f64>>,
}

impl PiecewiseLinearEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_na_strategy(mut self, na_strategy: NaStrategy) -> Self {
        self.na_strategy = Some(na_strategy);
        self
    }

    pub fn num_bins(&self) -> usize {
        self.boundaries.ncols().saturating_sub(1)
    }

    /// Bin activations, `[rows, cols, bins]`. NaN inputs give NaN rows.
    pub fn bin_values(&self, x: &Array2<f64>) -> Array3<f64> {
        let (num_rows, num_cols) = x.dim();
        let num_bins = self.num_bins();
        let mut out = Array3::zeros((num_rows, num_cols, num_bins));

        for ((i, j), &v) in x.indexed_iter() {
            for t in 0..num_bins {
                let lo = self.boundaries[[j, t]];
                let width = (self.boundaries[[j, t + 1]] - lo).max(WIDTH_EPS);
                let r = (v - lo) / width;
                out[[i, j, t]] = if num_bins == 1 {
                    r
                } else if t == 0 {
                    r.min(1.0)
                } else if t == num_bins - 1 {
                    r.max(0.0)
                } else {
                    r.clamp(0.0, 1.0)
                };
                // min/max/clamp drop NaN, put it back
                if v.is_nan() {
                    out[[i, j, t]] = f64::NAN;
                }
            }
        }
        out
    }
}

impl StypeEncoder for PiecewiseLinearEncoder {
    fn name(&self) -> &'static str {
        "PiecewiseLinearEncoder"
    }

    fn supported_stypes(&self) -> &'static [Stype] {
        &[Stype::Numerical]
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
        let num_cols = state.num_cols();
        let quantiles = state
            .stats_list
            .iter()
            .map(|s| s.require_quantiles())
            .collect::<Result<Vec<_>>>()?;
        let width = quantiles.first().map(|q| q.len()).unwrap_or(0);
        if width < 2 || quantiles.iter().any(|q| q.len() != width) {
            return Err(TabFrameError::ValidationError(
                "piecewise linear encoding needs at least two quantiles per column, equal across columns"
                    .to_string(),
            ));
        }

        let flat: Vec<f64> = quantiles.iter().flat_map(|q| q.iter().copied()).collect();
        self.boundaries = Array2::from_shape_vec((num_cols, width), flat)?;

        let num_bins = width - 1;
        let bound = glorot_bound(num_bins, state.out_channels);
        self.weight = Some(Param3::uniform((num_cols, num_bins, state.out_channels), bound, rng));
        self.bias = Some(Param2::zeros((num_cols, state.out_channels)));
        self.state = Some(state);
        self.cache = None;
        Ok(())
    }

    fn encode_forward(&mut self, feat: &FeatureTensor) -> Result<Array3<f64>> {
        let FeatureTensor::Numerical(x) = feat else {
            return Err(TabFrameError::ValidationError(format!(
                "PiecewiseLinearEncoder got {} features",
                feat.kind()
            )));
        };
        let (weight, bias) = match (&self.weight, &self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(TabFrameError::EncoderNotInitialized(self.name().to_string())),
        };

        let bins = self.bin_values(x);
        let (num_rows, num_cols, _) = bins.dim();
        let out_channels = bias.value.ncols();
        let mut out = Array3::zeros((num_rows, num_cols, out_channels));
        for j in 0..num_cols {
            let w = weight.value.index_axis(Axis(0), j);
            let b = bias.value.row(j);
            let mixed = bins.index_axis(Axis(1), j).dot(&w) + &b;
            out.index_axis_mut(Axis(1), j).assign(&mixed);
        }

        self.cache = Some(bins);
        Ok(out)
    }

    fn encode_backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let bins = self
            .cache
            .as_ref()
            .ok_or_else(|| TabFrameError::BackwardBeforeForward("PiecewiseLinearEncoder".to_string()))?;
        let (weight, bias) = match (&mut self.weight, &mut self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(TabFrameError::EncoderNotInitialized("PiecewiseLinearEncoder".to_string())),
        };
        if grad.len_of(Axis(0)) != bins.len_of(Axis(0)) {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} rows", bins.len_of(Axis(0))),
                actual: format!("{} rows", grad.len_of(Axis(0))),
            });
        }

        for j in 0..bins.len_of(Axis(1)) {
            let v = bins.index_axis(Axis(1), j);
            let g = grad.index_axis(Axis(1), j);
            // rows with a missing input produced zeros downstream
            let present: Vec<usize> = (0..v.nrows()).filter(|&i| !v[[i, 0]].is_nan()).collect();
            let v = v.select(Axis(0), &present);
            let g = g.select(Axis(0), &present);

            let mut gw = weight.grad.index_axis_mut(Axis(0), j);
            gw += &v.t().dot(&g);
            let mut gb = bias.grad.row_mut(j);
            gb += &g.sum_axis(Axis(0));
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
