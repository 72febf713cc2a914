//! Bag-of-embeddings encoder for multicategorical columns

use ndarray::{s, Array1, Array3};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::stype_encoder::{EncoderState, NaStrategy, StypeEncoder};
use crate::data::{FeatureTensor, MultiNestedTensor};
use crate::error::{Result, TabFrameError};
use crate::nn::parameter::{Param2, ParamMut};
use crate::stype::Stype;

/// How the embeddings in one cell are pooled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiCategoricalMode {
    #[default]
    Mean,
    Sum,
    Max,
}

/// One embedding table per column, pooled over the categories of each cell.
///
/// Category `c` lives in row `c + 1`. Row 0 is padding: missing entries are
/// left out of the bag, and a cell with nothing left encodes to zeros.
#[derive(Debug, Clone, Default)]
pub struct MultiCategoricalEmbeddingEncoder {
    na_strategy: Option<NaStrategy>,
    mode: MultiCategoricalMode,
    state: Option<EncoderState>,
    tables: Vec<Param2>,
    cache: Option<MultiNestedTensor>,
    /// per cell and channel, the table row picked by max pooling
    argmax: Vec<Vec<usize>>,
}

impl MultiCategoricalEmbeddingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: MultiCategoricalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_na_strategy(mut self, na_strategy: NaStrategy) -> Self {
        self.na_strategy = Some(na_strategy);
        self
    }

    pub fn mode(&self) -> MultiCategoricalMode {
        self.mode
    }

    pub fn tables(&self) -> &[Param2] {
        &self.tables
    }

    fn bag_rows(&self, x: &MultiNestedTensor, i: usize, j: usize) -> Result<Vec<usize>> {
        let num_table_rows = self.tables[j].value.nrows() as i64;
        x.get(i, j)
            .iter()
            .filter(|&&idx| idx != -1)
            .map(|&idx| {
                let row = idx + 1;
                if row < 1 || row >= num_table_rows {
                    Err(TabFrameError::ValidationError(format!(
                        "category index {} out of range for column {} with {} categories",
                        idx,
                        j,
                        num_table_rows - 1
                    )))
                } else {
                    Ok(row as usize)
                }
            })
            .collect()
    }
}

impl StypeEncoder for MultiCategoricalEmbeddingEncoder {
    fn name(&self) -> &'static str {
        "MultiCategoricalEmbeddingEncoder"
    }

    fn supported_stypes(&self) -> &'static [Stype] {
        &[Stype::MultiCategorical]
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
        let bound = 3f64.sqrt();
        self.tables = state
            .stats_list
            .iter()
            .map(|stats| {
                let num_categories = stats.require_multi_count()?.num_categories();
                let mut table = Param2::uniform((num_categories + 1, state.out_channels), bound, rng);
                table.value.row_mut(0).fill(0.0);
                Ok(table)
            })
            .collect::<Result<Vec<_>>>()?;
        self.state = Some(state);
        self.cache = None;
        self.argmax.clear();
        Ok(())
    }

    fn encode_forward(&mut self, feat: &FeatureTensor) -> Result<Array3<f64>> {
        let FeatureTensor::MultiCategorical(x) = feat else {
            return Err(TabFrameError::ValidationError(format!(
                "MultiCategoricalEmbeddingEncoder got {} features",
                feat.kind()
            )));
        };
        let out_channels = self.tables.first().map(|t| t.value.ncols()).unwrap_or(0);
        let mut out = Array3::zeros((x.num_rows(), x.num_cols(), out_channels));
        let mut argmax = Vec::new();

        for i in 0..x.num_rows() {
            for j in 0..x.num_cols() {
                let rows = self.bag_rows(x, i, j)?;
                let table = &self.tables[j].value;
                let mut cell = out.slice_mut(s![i, j, ..]);
                if rows.is_empty() {
                    if self.mode == MultiCategoricalMode::Max {
                        argmax.push(Vec::new());
                    }
                    continue;
                }

                match self.mode {
                    MultiCategoricalMode::Sum | MultiCategoricalMode::Mean => {
                        for &r in &rows {
                            cell += &table.row(r);
                        }
                        if self.mode == MultiCategoricalMode::Mean {
                            cell /= rows.len() as f64;
                        }
                    }
                    MultiCategoricalMode::Max => {
                        let mut best = vec![rows[0]; out_channels];
                        let mut values: Array1<f64> = table.row(rows[0]).to_owned();
                        for &r in &rows[1..] {
                            for k in 0..out_channels {
                                if table[[r, k]] > values[k] {
                                    values[k] = table[[r, k]];
                                    best[k] = r;
                                }
                            }
                        }
                        cell.assign(&values);
                        argmax.push(best);
                    }
                }
            }
        }

        self.cache = Some(x.clone());
        self.argmax = argmax;
        Ok(out)
    }

    fn encode_backward(&mut self, grad: &Array3<f64>) -> Result<()> {
        let x = self.cache.take().ok_or_else(|| {
            TabFrameError::BackwardBeforeForward("MultiCategoricalEmbeddingEncoder".to_string())
        })?;
        let result = self.accumulate(&x, grad);
        self.cache = Some(x);
        result
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        self.tables.iter_mut().map(ParamMut::from).collect()
    }
}

impl MultiCategoricalEmbeddingEncoder {
    fn accumulate(&mut self, x: &MultiNestedTensor, grad: &Array3<f64>) -> Result<()> {
        if grad.shape()[0] != x.num_rows() {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} rows", x.num_rows()),
                actual: format!("{} rows", grad.shape()[0]),
            });
        }

        for i in 0..x.num_rows() {
            for j in 0..x.num_cols() {
                let cell = i * x.num_cols() + j;
                let g = grad.slice(s![i, j, ..]);
                match self.mode {
                    MultiCategoricalMode::Sum | MultiCategoricalMode::Mean => {
                        let rows = self.bag_rows(x, i, j)?;
                        if rows.is_empty() {
                            continue;
                        }
                        let scale = match self.mode {
                            MultiCategoricalMode::Mean => 1.0 / rows.len() as f64,
                            _ => 1.0,
                        };
                        let table = &mut self.tables[j];
                        for r in rows {
                            table.grad.row_mut(r).scaled_add(scale, &g);
                        }
                    }
                    MultiCategoricalMode::Max => {
                        let table = &mut self.tables[j];
                        for (k, &r) in self.argmax[cell].iter().enumerate() {
                            table.grad[[r, k]] += g[k];
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
