//! Linear projection of pre-computed embedding columns

use ndarray::{Array2, Array3, Axis};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::stype_encoder::{EncoderState, NaStrategy, StypeEncoder};
use crate::data::{FeatureTensor, MultiEmbeddingTensor};
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::{glorot_bound, Param1, Param2, ParamMut};
use crate::stype::Stype;

/// Projects column `j` from `emb_dim_j` to `out_channels` with its own
/// weight and bias.
#[derive(Debug, Clone, Default)]
pub struct LinearEmbeddingEncoder {
    na_strategy: Option<NaStrategy>,
    state: Option<EncoderState>,
    weights: Vec<Param2>,
    biases: Vec<Param1>,
    cache: Option<MultiEmbeddingTensor>,
}

impl LinearEmbeddingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_na_strategy(mut self, na_strategy: NaStrategy) -> Self {
        self.na_strategy = Some(na_strategy);
        self
    }

    pub fn emb_dims(&self) -> Vec<usize> {
        self.weights.iter().map(|w| w.value.nrows()).collect()
    }
}

impl StypeEncoder for LinearEmbeddingEncoder {
    fn name(&self) -> &'static str {
        "LinearEmbeddingEncoder"
    }

    fn supported_stypes(&self) -> &'static [Stype] {
        &[Stype::Embedding, Stype::TextEmbedded]
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
        let out_channels = state.out_channels;
        let dims = state
            .stats_list
            .iter()
            .map(|s| s.require_emb_dim())
            .collect::<Result<Vec<_>>>()?;

        self.weights = dims
            .iter()
            .map(|&d| Param2::uniform((d, out_channels), glorot_bound(d, out_channels), rng))
            .collect();
        self.biases = dims.iter().map(|_| Param1::zeros(out_channels)).collect();
        self.state = Some(state);
        self.cache = None;
        Ok(())
    }

    fn encode_forward(&mut self, feat: &FeatureTensor) -> Result<Array3<f64>> {
        let FeatureTensor::Embedding(x) = feat else {
            return Err(TabFrameError::ValidationError(format!(
                "LinearEmbeddingEncoder got {} features",
                feat.kind()
            )));
        };
        let expected = self.emb_dims();
        if x.emb_dims() != expected {
            return Err(TabFrameError::ShapeError {
                expected: format!("embedding dims {:?}", expected),
                actual: format!("{:?}", x.emb_dims()),
            });
        }

        let out_channels = self.biases.first().map(|b| b.len()).unwrap_or(0);
        let mut out = Array3::zeros((x.num_rows(), x.num_cols(), out_channels));
        for (j, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let projected = x.col(j).dot(&w.value) + &b.value;
            out.index_axis_mut(Axis(1), j).assign(&projected);
        }

        self.cache = Some(x.clone());
        Ok(out)
    }

    fn encode_backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let x = self
            .cache
            .as_ref()
            .ok_or_else(|| TabFrameError::BackwardBeforeForward("LinearEmbeddingEncoder".to_string()))?;
        if grad.len_of(Axis(0)) != x.num_rows() {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} rows", x.num_rows()),
                actual: format!("{} rows", grad.len_of(Axis(0))),
            });
        }

        for (j, (w, b)) in self.weights.iter_mut().zip(self.biases.iter_mut()).enumerate() {
            let col = x.col(j);
            let present: Vec<usize> = (0..col.nrows())
                .filter(|&i| col.row(i).iter().all(|v| !v.is_nan()))
                .collect();
            let xs: Array2<f64> = col.select(Axis(0), &present);
            let gs = grad.index_axis(Axis(1), j).select(Axis(0), &present);

            w.grad += &xs.t().dot(&gs);
            b.grad += &gs.sum_axis(Axis(0));
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = Vec::with_capacity(self.weights.len() * 2);
        for (w, b) in self.weights.iter_mut().zip(self.biases.iter_mut()) {
            params.push(ParamMut::from(w));
            params.push(ParamMut::from(b));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ColStats;
    use ndarray::array;
    use rand::SeedableRng;

    fn setup() -> (LinearEmbeddingEncoder, Vec<String>) {
        let stats = vec![ColStats::embedding("e1", 2), ColStats::embedding("e2", 3)];
        let mut enc = LinearEmbeddingEncoder::new();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        enc.init(4, stats, Stype::TextEmbedded, &mut rng).unwrap();
        (enc, vec!["e1".to_string(), "e2".to_string()])
    }

    #[test]
    fn test_projection_per_column() {
        let (mut enc, names) = setup();
        let x = MultiEmbeddingTensor::from_tensor_list(&[
            array![[1.0, 0.0], [0.0, 1.0]],
            array![[0.0, 0.0, 1.0], [f64::NAN, f64::NAN, f64::NAN]],
        ])
        .unwrap();
        let out = enc.forward(&FeatureTensor::Embedding(x), &names).unwrap();
        assert_eq!(out.shape(), &[2, 2, 4]);
        assert_eq!(out.index_axis(Axis(0), 0).row(0), enc.weights[0].value.row(0));
        assert_eq!(out.index_axis(Axis(0), 1).row(0), enc.weights[0].value.row(1));
        assert_eq!(out.index_axis(Axis(0), 0).row(1), enc.weights[1].value.row(2));
        // missing embedding encodes to zeros
        assert!(out.index_axis(Axis(0), 1).row(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_backward_masks_missing_rows() {
        let (mut enc, names) = setup();
        let x = MultiEmbeddingTensor::from_tensor_list(&[
            array![[1.0, 2.0], [3.0, 4.0]],
            array![[1.0, 1.0, 1.0], [f64::NAN, 0.0, 0.0]],
        ])
        .unwrap();
        enc.forward(&FeatureTensor::Embedding(x), &names).unwrap();
        enc.backward(&Array3::ones((2, 2, 4))).unwrap();
        assert_eq!(enc.weights[0].grad.column(0).to_vec(), vec![4.0, 6.0]);
        assert_eq!(enc.weights[1].grad.column(0).to_vec(), vec![1.0, 1.0, 1.0]);
        assert_eq!(enc.biases[1].grad.to_vec(), vec![1.0; 4]);
    }

    #[test]
    fn test_dim_mismatch() {
        let (mut enc, names) = setup();
        let x = MultiEmbeddingTensor::from_tensor_list(&[array![[1.0]], array![[1.0, 2.0, 3.0]]]).unwrap();
        assert!(enc.forward(&FeatureTensor::Embedding(x), &names).is_err());
    }
}
