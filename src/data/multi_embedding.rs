//! Column-wise embedding tensor with per-column widths

use ndarray::{concatenate, s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TabFrameError};

/// `[rows, Σ emb_dim]` values where column `j` spans `offset[j]..offset[j + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EmbeddingParts")]
pub struct MultiEmbeddingTensor {
    values: Array2<f64>,
    offset: Vec<usize>,
}

#[derive(Deserialize)]
struct EmbeddingParts {
    values: Array2<f64>,
    offset: Vec<usize>,
}

impl TryFrom<EmbeddingParts> for MultiEmbeddingTensor {
    type Error = TabFrameError;

    fn try_from(parts: EmbeddingParts) -> Result<Self> {
        let EmbeddingParts { values, offset } = parts;
        let valid = offset.first() == Some(&0)
            && offset.last() == Some(&values.ncols())
            && offset.windows(2).all(|w| w[0] <= w[1]);
        if !valid {
            return Err(TabFrameError::ValidationError(format!(
                "embedding offsets must rise from 0 to {} columns",
                values.ncols()
            )));
        }
        Ok(Self { values, offset })
    }
}

impl MultiEmbeddingTensor {
    /// Stack one `[rows, emb_dim]` matrix per column.
    pub fn from_tensor_list(tensors: &[Array2<f64>]) -> Result<Self> {
        let num_rows = tensors.first().map(|t| t.nrows()).unwrap_or(0);
        let mut offset = Vec::with_capacity(tensors.len() + 1);
        offset.push(0);

        for (j, t) in tensors.iter().enumerate() {
            if t.nrows() != num_rows {
                return Err(TabFrameError::ShapeError {
                    expected: format!("{} rows", num_rows),
                    actual: format!("{} rows in column {}", t.nrows(), j),
                });
            }
            offset.push(offset[j] + t.ncols());
        }

        let values = if tensors.is_empty() {
            Array2::zeros((0, 0))
        } else {
            let views: Vec<ArrayView2<f64>> = tensors.iter().map(|t| t.view()).collect();
            concatenate(Axis(1), &views)?
        };

        Ok(Self { values, offset })
    }

    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.offset.len() - 1
    }

    pub fn emb_dims(&self) -> Vec<usize> {
        self.offset.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    /// `[rows, emb_dim]` view of column `j`.
    pub fn col(&self, j: usize) -> ArrayView2<'_, f64> {
        self.values.slice(s![.., self.offset[j]..self.offset[j + 1]])
    }

    pub fn index_select(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.num_rows()) {
            return Err(TabFrameError::ShapeError {
                expected: format!("row index < {}", self.num_rows()),
                actual: bad.to_string(),
            });
        }
        Ok(Self {
            values: self.values.select(Axis(0), rows),
            offset: self.offset.clone(),
        })
    }

    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.num_rows() {
            return Err(TabFrameError::ShapeError {
                expected: format!("range within 0..{}", self.num_rows()),
                actual: format!("{}..{}", start, end),
            });
        }
        Ok(Self {
            values: self.values.slice(s![start..end, ..]).to_owned(),
            offset: self.offset.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_columns_and_dims() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[5.0], [6.0]];
        let t = MultiEmbeddingTensor::from_tensor_list(&[a.clone(), b]).unwrap();
        assert_eq!(t.num_cols(), 2);
        assert_eq!(t.emb_dims(), vec![2, 1]);
        assert_eq!(t.col(0), a.view());
        assert_eq!(t.col(1)[[1, 0]], 6.0);
    }

    #[test]
    fn test_row_mismatch() {
        let a = Array2::<f64>::zeros((2, 2));
        let b = Array2::<f64>::zeros((3, 2));
        assert!(MultiEmbeddingTensor::from_tensor_list(&[a, b]).is_err());
    }

    #[test]
    fn test_deserialize_validates_offsets() {
        let t = MultiEmbeddingTensor::from_tensor_list(&[array![[1.0, 2.0]], array![[3.0]]]).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        let back: MultiEmbeddingTensor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["offset"] = serde_json::json!([]);
        assert!(serde_json::from_value::<MultiEmbeddingTensor>(value.clone()).is_err());
        value["offset"] = serde_json::json!([0, 4]);
        assert!(serde_json::from_value::<MultiEmbeddingTensor>(value).is_err());
    }

    #[test]
    fn test_select_rows() {
        let a = array![[1.0], [2.0], [3.0]];
        let t = MultiEmbeddingTensor::from_tensor_list(&[a]).unwrap();
        let picked = t.index_select(&[2, 0]).unwrap();
        assert_eq!(picked.values(), &array![[3.0], [1.0]]);
        let sliced = t.slice(1, 3).unwrap();
        assert_eq!(sliced.values(), &array![[2.0], [3.0]]);
    }
}
