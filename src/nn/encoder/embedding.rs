//! Embedding-table encoder for categorical columns

use ndarray::{s, Array2, Array3};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::stype_encoder::{EncoderState, NaStrategy, StypeEncoder};
use crate::data::FeatureTensor;
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::{Param2, ParamMut};
use crate::stype::Stype;

/// One embedding table per column.
///
/// Row 0 of every table is reserved for missing values, so category `c`
/// lives in row `c + 1`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingEncoder {
    na_strategy: Option<NaStrategy>,
    state: Option<EncoderState>,
    tables: Vec<Param2>,
    cache: Option<Array2<i64>>,
}

impl EmbeddingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_na_strategy(mut self, na_strategy: NaStrategy) -> Self {
        self.na_strategy = Some(na_strategy);
        self
    }

    pub fn tables(&self) -> &[Param2] {
        &self.tables
    }
}

impl StypeEncoder for EmbeddingEncoder {
    fn name(&self) -> &'static str {
        "EmbeddingEncoder"
    }

    fn supported_stypes(&self) -> &'static [Stype] {
        &[Stype::Categorical]
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
        // unit-variance uniform init
        let bound = 3f64.sqrt();
        self.tables = state
            .stats_list
            .iter()
            .map(|stats| {
                let num_categories = stats.require_count()?.num_categories();
                Ok(Param2::uniform((num_categories + 1, state.out_channels), bound, rng))
            })
            .collect::<Result<Vec<_>>>()?;
        self.state = Some(state);
        self.cache = None;
        Ok(())
    }

    fn encode_forward(&mut self, feat: &FeatureTensor) -> Result<Array3<f64>> {
        let FeatureTensor::Categorical(x) = feat else {
            return Err(TabFrameError::ValidationError(format!(
                "EmbeddingEncoder got {} features",
                feat.kind()
            )));
        };
        let (num_rows, num_cols) = x.dim();
        let out_channels = self.tables.first().map(|t| t.value.ncols()).unwrap_or(0);
        let mut out = Array3::zeros((num_rows, num_cols, out_channels));

        for (j, table) in self.tables.iter().enumerate() {
            let num_rows_in_table = table.value.nrows() as i64;
            for i in 0..num_rows {
                let row = x[[i, j]] + 1;
                if row < 0 || row >= num_rows_in_table {
                    return Err(TabFrameError::ValidationError(format!(
                        "category index {} out of range for column {} with {} categories",
                        x[[i, j]],
                        j,
                        num_rows_in_table - 1
                    )));
                }
                out.slice_mut(s![i, j, ..]).assign(&table.value.row(row as usize));
            }
        }

        self.cache = Some(x.clone());
        Ok(out)
    }

    fn encode_backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let x = self
            .cache
            .as_ref()
            .ok_or_else(|| TabFrameError::BackwardBeforeForward(self.name().to_string()))?;
        if grad.shape()[0] != x.nrows() {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} rows", x.nrows()),
                actual: format!("{} rows", grad.shape()[0]),
            });
        }

        for (j, table) in self.tables.iter_mut().enumerate() {
            for i in 0..x.nrows() {
                let row = (x[[i, j]] + 1) as usize;
                let mut target = table.grad.row_mut(row);
                target += &grad.slice(s![i, j, ..]);
            }
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        self.tables.iter_mut().map(ParamMut::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ColStats;
    use ndarray::array;
    use rand::SeedableRng;

    fn encoder(na: Option<NaStrategy>) -> EmbeddingEncoder {
        let stats = ColStats::categorical(
            "color",
            &[Some("red".to_string()), Some("red".to_string()), Some("blue".to_string())],
        )
        .unwrap();
        let mut enc = match na {
            Some(s) => EmbeddingEncoder::new().with_na_strategy(s),
            None => EmbeddingEncoder::new(),
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        enc.init(4, vec![stats], Stype::Categorical, &mut rng).unwrap();
        enc
    }

    #[test]
    fn test_lookup_and_missing_row() {
        let mut enc = encoder(None);
        let feat = FeatureTensor::Categorical(array![[0], [1], [-1]]);
        let out = enc.forward(&feat, &["color".to_string()]).unwrap();
        assert_eq!(out.shape(), &[3, 1, 4]);
        assert_eq!(out.slice(s![0, 0, ..]), enc.tables()[0].value.row(1));
        assert_eq!(out.slice(s![2, 0, ..]), enc.tables()[0].value.row(0));
    }

    #[test]
    fn test_most_frequent_fill() {
        let mut enc = encoder(Some(NaStrategy::MostFrequent));
        let feat = FeatureTensor::Categorical(array![[0], [-1]]);
        let out = enc.forward(&feat, &["color".to_string()]).unwrap();
        assert_eq!(out.slice(s![0, 0, ..]), out.slice(s![1, 0, ..]));
    }

    #[test]
    fn test_out_of_range_index() {
        let mut enc = encoder(None);
        let feat = FeatureTensor::Categorical(array![[2]]);
        assert!(enc.forward(&feat, &["color".to_string()]).is_err());
    }

    #[test]
    fn test_backward_scatters_rows() {
        let mut enc = encoder(None);
        let feat = FeatureTensor::Categorical(array![[0], [0], [1]]);
        enc.forward(&feat, &["color".to_string()]).unwrap();
        let grad = Array3::ones((3, 1, 4));
        enc.backward(&grad).unwrap();
        let g = &enc.tables()[0].grad;
        assert_eq!(g.row(0).to_vec(), vec![0.0; 4]);
        assert_eq!(g.row(1).to_vec(), vec![2.0; 4]);
        assert_eq!(g.row(2).to_vec(), vec![1.0; 4]);
    }

    #[test]
    fn test_rejects_numerical_stype() {
        let mut enc = EmbeddingEncoder::new();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let err = enc
            .init(4, vec![ColStats::numerical("x", &[1.0]).unwrap()], Stype::Numerical, &mut rng)
            .unwrap_err();
        assert!(matches!(err, TabFrameError::UnsupportedStype { .. }));
    }

    #[test]
    fn test_uninitialized_forward() {
        let mut enc = EmbeddingEncoder::new();
        let feat = FeatureTensor::Categorical(array![[0]]);
        assert!(matches!(
            enc.forward(&feat, &["color".to_string()]),
            Err(TabFrameError::EncoderNotInitialized(_))
        ));
        assert!(enc.backward(&Array3::zeros((1, 1, 4))).is_err());
    }
}
