//! Feature encoder dispatching column groups to per-stype encoders

use ndarray::{concatenate, s, Array3, ArrayView3, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::stype_encoder::StypeEncoder;
use crate::data::TensorFrame;
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::{Module, ParamMut};
use crate::stats::ColStats;
use crate::stype::Stype;

/// Maps a tensor frame to `[rows, num_cols, out_channels]`.
pub trait FeatureEncoder: Module + Send + Sync {
    /// Encoded features and the column name of every position along axis 1.
    fn forward(&mut self, tf: &TensorFrame) -> Result<(Array3<f64>, Vec<String>)>;

    /// Accumulate gradients for the last `forward`.
    fn backward(&mut self, grad: &Array3<f64>) -> Result<()>;

    fn out_channels(&self) -> usize;
}

/// Encodes each stype group with its own [`StypeEncoder`] and concatenates
/// the results in stype order.
#[derive(Debug, Clone)]
pub struct StypeWiseFeatureEncoder {
    out_channels: usize,
    col_names_dict: BTreeMap<Stype, Vec<String>>,
    encoders: BTreeMap<Stype, Box<dyn StypeEncoder>>,
    /// column count per group of the last forward
    last_split: Option<Vec<(Stype, usize)>>,
}

impl StypeWiseFeatureEncoder {
    /// Initialize one encoder per stype group of `col_names_dict`.
    ///
    /// A group uses the encoder registered for its stype, or the one
    /// registered for the stype's parent. Every column needs an entry in
    /// `col_stats`. Parameters are initialized from `seed`.
    pub fn new(
        out_channels: usize,
        col_stats: &HashMap<String, ColStats>,
        col_names_dict: BTreeMap<Stype, Vec<String>>,
        stype_encoder_dict: &HashMap<Stype, Box<dyn StypeEncoder>>,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut encoders = BTreeMap::new();

        for (&stype, col_names) in &col_names_dict {
            let template = stype_encoder_dict
                .get(&stype)
                .or_else(|| stype_encoder_dict.get(&stype.parent()))
                .ok_or_else(|| {
                    TabFrameError::ConfigError(format!("no encoder registered for stype {}", stype))
                })?;

            let stats_list = col_names
                .iter()
                .map(|name| {
                    col_stats.get(name).cloned().ok_or_else(|| {
                        TabFrameError::ConfigError(format!("no column stats for '{}'", name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut encoder = template.clone_box();
            encoder.init(out_channels, stats_list, stype, &mut rng)?;
            encoders.insert(stype, encoder);
        }

        debug!(
            out_channels,
            groups = encoders.len(),
            cols = col_names_dict.values().map(Vec::len).sum::<usize>(),
            "Built stype-wise feature encoder"
        );
        Ok(Self {
            out_channels,
            col_names_dict,
            encoders,
            last_split: None,
        })
    }

    pub fn col_names_dict(&self) -> &BTreeMap<Stype, Vec<String>> {
        &self.col_names_dict
    }

    pub fn num_cols(&self) -> usize {
        self.col_names_dict.values().map(Vec::len).sum()
    }

    /// Encoder of the group keyed by `stype`.
    pub fn encoder(&self, stype: Stype) -> Option<&dyn StypeEncoder> {
        self.encoders.get(&stype).map(|e| e.as_ref())
    }
}

impl Module for StypeWiseFeatureEncoder {
    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        self.encoders
            .values_mut()
            .flat_map(|e| e.parameters_mut())
            .collect()
    }
}

impl FeatureEncoder for StypeWiseFeatureEncoder {
    fn forward(&mut self, tf: &TensorFrame) -> Result<(Array3<f64>, Vec<String>)> {
        let num_rows = tf.num_rows();
        let mut outputs = Vec::with_capacity(self.encoders.len());
        let mut col_names = Vec::with_capacity(self.num_cols());
        let mut split = Vec::with_capacity(self.encoders.len());

        for (&stype, encoder) in self.encoders.iter_mut() {
            let expected = self.col_names_dict.get(&stype).map(Vec::as_slice).unwrap_or_default();
            let feat = tf
                .feat_dict
                .get(&stype)
                .ok_or_else(|| TabFrameError::ValidationError(format!("tensor frame has no {} features", stype)))?;
            let names = tf.col_names_dict.get(&stype).map(Vec::as_slice).unwrap_or_default();
            if names != expected {
                return Err(TabFrameError::ValidationError(format!(
                    "{} columns {:?} differ from the encoder's {:?}",
                    stype, names, expected
                )));
            }

            let out = encoder.forward(feat, names)?;
            split.push((stype, names.len()));
            col_names.extend_from_slice(names);
            outputs.push(out);
        }

        let x = if outputs.is_empty() {
            Array3::zeros((num_rows, 0, self.out_channels))
        } else {
            let views: Vec<ArrayView3<f64>> = outputs.iter().map(|o| o.view()).collect();
            concatenate(Axis(1), &views)?
        };
        debug!(shape = ?x.shape(), "Encoded tensor frame");

        self.last_split = Some(split);
        Ok((x, col_names))
    }

    fn backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let split = self
            .last_split
            .as_ref()
            .ok_or_else(|| TabFrameError::BackwardBeforeForward("StypeWiseFeatureEncoder".to_string()))?;
        let total: usize = split.iter().map(|(_, n)| n).sum();
        if grad.len_of(Axis(1)) != total || grad.len_of(Axis(2)) != self.out_channels {
            return Err(TabFrameError::ShapeError {
                expected: format!("[*, {}, {}]", total, self.out_channels),
                actual: format!("{:?}", grad.shape()),
            });
        }

        let mut start = 0;
        for (stype, n) in split {
            let part = grad.slice(s![.., start..start + n, ..]).to_owned();
            if let Some(encoder) = self.encoders.get_mut(stype) {
                encoder.backward(&part)?;
            }
            start += n;
        }
        Ok(())
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureTensor, MultiEmbeddingTensor};
    use crate::nn::encoder::{EmbeddingEncoder, LinearEmbeddingEncoder, LinearEncoder};
    use ndarray::array;

    fn setup() -> (TensorFrame, HashMap<String, ColStats>) {
        let mut feat_dict = BTreeMap::new();
        feat_dict.insert(Stype::Numerical, FeatureTensor::Numerical(array![[1.0, 2.0], [3.0, f64::NAN]]));
        feat_dict.insert(Stype::Categorical, FeatureTensor::Categorical(array![[0], [1]]));
        feat_dict.insert(
            Stype::TextEmbedded,
            FeatureTensor::Embedding(
                MultiEmbeddingTensor::from_tensor_list(&[array![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]]).unwrap(),
            ),
        );

        let mut col_names_dict = BTreeMap::new();
        col_names_dict.insert(Stype::Numerical, vec!["a".to_string(), "b".to_string()]);
        col_names_dict.insert(Stype::Categorical, vec!["c".to_string()]);
        col_names_dict.insert(Stype::TextEmbedded, vec!["t".to_string()]);
        let tf = TensorFrame::new(feat_dict, col_names_dict, None).unwrap();

        let mut col_stats = HashMap::new();
        col_stats.insert("a".to_string(), ColStats::numerical("a", &[1.0, 3.0]).unwrap());
        col_stats.insert("b".to_string(), ColStats::numerical("b", &[2.0]).unwrap());
        col_stats.insert(
            "c".to_string(),
            ColStats::categorical("c", &[Some("x".to_string()), Some("y".to_string())]).unwrap(),
        );
        col_stats.insert("t".to_string(), ColStats::embedding("t", 3));
        (tf, col_stats)
    }

    fn registry() -> HashMap<Stype, Box<dyn StypeEncoder>> {
        let mut dict: HashMap<Stype, Box<dyn StypeEncoder>> = HashMap::new();
        dict.insert(Stype::Numerical, Box::new(LinearEncoder::new()));
        dict.insert(Stype::Categorical, Box::new(EmbeddingEncoder::new()));
        dict.insert(Stype::Embedding, Box::new(LinearEmbeddingEncoder::new()));
        dict
    }

    #[test]
    fn test_forward_order_and_parent_fallback() {
        let (tf, stats) = setup();
        let mut enc =
            StypeWiseFeatureEncoder::new(4, &stats, tf.col_names_dict.clone(), &registry(), 0).unwrap();
        let (x, names) = enc.forward(&tf).unwrap();
        assert_eq!(x.shape(), &[2, 4, 4]);
        assert_eq!(names, vec!["a", "b", "c", "t"]);
        assert_eq!(enc.encoder(Stype::TextEmbedded).map(|e| e.name()), Some("LinearEmbeddingEncoder"));
        assert!(x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_backward_splits_gradient() {
        let (tf, stats) = setup();
        let mut enc =
            StypeWiseFeatureEncoder::new(4, &stats, tf.col_names_dict.clone(), &registry(), 0).unwrap();
        assert!(enc.backward(&Array3::ones((2, 4, 4))).is_err());

        enc.forward(&tf).unwrap();
        enc.backward(&Array3::ones((2, 4, 4))).unwrap();
        let norm: f64 = enc.parameters_mut().iter().map(|p| p.grad_sq_norm()).sum();
        assert!(norm > 0.0);

        enc.zero_grad();
        let norm: f64 = enc.parameters_mut().iter().map(|p| p.grad_sq_norm()).sum();
        assert_eq!(norm, 0.0);
        assert!(enc.backward(&Array3::ones((2, 3, 4))).is_err());
    }

    #[test]
    fn test_missing_encoder_or_stats() {
        let (tf, stats) = setup();
        let mut dict = registry();
        dict.remove(&Stype::Embedding);
        assert!(StypeWiseFeatureEncoder::new(4, &stats, tf.col_names_dict.clone(), &dict, 0).is_err());

        let mut partial = stats.clone();
        partial.remove("b");
        assert!(StypeWiseFeatureEncoder::new(4, &partial, tf.col_names_dict.clone(), &registry(), 0).is_err());
    }

    #[test]
    fn test_column_mismatch_rejected() {
        let (tf, stats) = setup();
        let mut names = tf.col_names_dict.clone();
        names.insert(Stype::Numerical, vec!["b".to_string(), "a".to_string()]);
        let mut enc = StypeWiseFeatureEncoder::new(4, &stats, names, &registry(), 0).unwrap();
        assert!(enc.forward(&tf).is_err());
    }

    #[test]
    fn test_same_seed_same_output() {
        let (tf, stats) = setup();
        let mut a = StypeWiseFeatureEncoder::new(4, &stats, tf.col_names_dict.clone(), &registry(), 7).unwrap();
        let mut b = StypeWiseFeatureEncoder::new(4, &stats, tf.col_names_dict.clone(), &registry(), 7).unwrap();
        assert_eq!(a.forward(&tf).unwrap().0, b.forward(&tf).unwrap().0);
    }
}
