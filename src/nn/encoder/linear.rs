//! Per-column linear encoder for numerical columns

use ndarray::{Array1, Array2, Array3, Axis};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::stype_encoder::{EncoderState, NaStrategy, StypeEncoder};
use crate::data::FeatureTensor;
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::{glorot_bound, Param2, ParamMut};
use crate::stype::Stype;

const STD_EPS: f64 = 1e-6;

/// `out[i, j, :] = (x[i, j] - mean_j) / (std_j + eps) * weight[j, :] + bias[j, :]`
#[derive(Debug, Clone, Default)]
pub struct LinearEncoder {
    na_strategy: Option<NaStrategy>,
    state: Option<EncoderState>,
    mean: Array1<f64>,
    std: Array1<f64>,
    weight: Option<Param2>,
    bias: Option<Param2>,
    /// normalized input of the last forward
    cache: Option<Array2<f64>>,
}

impl LinearEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_na_strategy(mut self, na_strategy: NaStrategy) -> Self {
        self.na_strategy = Some(na_strategy);
        self
    }

    pub fn weight(&self) -> Option<&Param2> {
        self.weight.as_ref()
    }

    pub fn bias(&self) -> Option<&Param2> {
        self.bias.as_ref()
    }
}

impl StypeEncoder for LinearEncoder {
    fn name(&self) -> &'static str {
        "LinearEncoder"
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
        self.mean = state
            .stats_list
            .iter()
            .map(|s| s.require_mean())
            .collect::<Result<Array1<f64>>>()?;
        self.std = state
            .stats_list
            .iter()
            .map(|s| s.require_std())
            .collect::<Result<Array1<f64>>>()?;

        let bound = glorot_bound(1, state.out_channels);
        self.weight = Some(Param2::uniform((num_cols, state.out_channels), bound, rng));
        self.bias = Some(Param2::zeros((num_cols, state.out_channels)));
        self.state = Some(state);
        self.cache = None;
        Ok(())
    }

    fn encode_forward(&mut self, feat: &FeatureTensor) -> Result<Array3<f64>> {
        let FeatureTensor::Numerical(x) = feat else {
            return Err(TabFrameError::ValidationError(format!(
                "LinearEncoder got {} features",
                feat.kind()
            )));
        };
        let (weight, bias) = match (&self.weight, &self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(TabFrameError::EncoderNotInitialized(self.name().to_string())),
        };

        let x_norm = (x - &self.mean) / &self.std.mapv(|s| s + STD_EPS);
        let out = &x_norm.view().insert_axis(Axis(2)) * &weight.value + &bias.value;
        self.cache = Some(x_norm);
        Ok(out)
    }

    fn encode_backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let x_norm = self
            .cache
            .as_ref()
            .ok_or_else(|| TabFrameError::BackwardBeforeForward("LinearEncoder".to_string()))?;
        let (weight, bias) = match (&mut self.weight, &mut self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(TabFrameError::EncoderNotInitialized("LinearEncoder".to_string())),
        };
        if grad.len_of(Axis(0)) != x_norm.nrows() {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} rows", x_norm.nrows()),
                actual: format!("{} rows", grad.len_of(Axis(0))),
            });
        }

        let present = x_norm.mapv(|v| if v.is_nan() { 0.0 } else { 1.0 });
        let x_masked = x_norm.mapv(|v| if v.is_nan() { 0.0 } else { v });
        weight.grad += &(grad * &x_masked.insert_axis(Axis(2))).sum_axis(Axis(0));
        bias.grad += &(grad * &present.insert_axis(Axis(2))).sum_axis(Axis(0));
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
    use crate::stats::ColStats;
    use ndarray::{array, s};
    use rand::SeedableRng;

    fn encoder(na: Option<NaStrategy>) -> LinearEncoder {
        let stats = vec![
            ColStats::numerical("a", &[1.0, 3.0]).unwrap(),
            ColStats::numerical("b", &[10.0, 10.0]).unwrap(),
        ];
        let mut enc = match na {
            Some(s) => LinearEncoder::new().with_na_strategy(s),
            None => LinearEncoder::new(),
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        enc.init(5, stats, Stype::Numerical, &mut rng).unwrap();
        enc
    }

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn test_normalized_affine() {
        let mut enc = encoder(None);
        let out = enc.forward(&FeatureTensor::Numerical(array![[3.0, 10.0]]), &names()).unwrap();
        assert_eq!(out.shape(), &[1, 2, 5]);
        let w = enc.weight().unwrap().value.row(0).to_owned();
        // (3 - 2) / (1 + eps) ~ 1
        for k in 0..5 {
            assert!((out[[0, 0, k]] - w[k]).abs() < 1e-5);
            // zero std column maps its mean to the bias (zero at init)
            assert_eq!(out[[0, 1, k]], 0.0);
        }
    }

    #[test]
    fn test_nan_without_strategy_is_zero() {
        let mut enc = encoder(None);
        let out = enc
            .forward(&FeatureTensor::Numerical(array![[f64::NAN, 10.0]]), &names())
            .unwrap();
        assert!(out.slice(s![0, 0, ..]).iter().all(|&v| v == 0.0));

        enc.backward(&Array3::ones((1, 2, 5))).unwrap();
        let w = enc.weight().unwrap();
        assert!(w.grad.iter().all(|g| g.is_finite()));
        // only column b contributed to the bias gradient
        assert_eq!(enc.bias().unwrap().grad.row(0).sum(), 0.0);
        assert_eq!(enc.bias().unwrap().grad.row(1).sum(), 5.0);
    }

    #[test]
    fn test_mean_strategy() {
        let mut enc = encoder(Some(NaStrategy::Mean));
        let out = enc
            .forward(&FeatureTensor::Numerical(array![[f64::NAN, 10.0]]), &names())
            .unwrap();
        // filled with the mean -> normalized 0 -> bias only
        assert!(out.slice(s![0, 0, ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_column_name_mismatch() {
        let mut enc = encoder(None);
        let wrong = vec!["b".to_string(), "a".to_string()];
        assert!(enc.forward(&FeatureTensor::Numerical(array![[1.0, 1.0]]), &wrong).is_err());
    }
}
