//! Batch container of column tensors grouped by stype

use ndarray::{s, Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{MultiEmbeddingTensor, MultiNestedTensor};
use crate::error::{Result, TabFrameError};
use crate::stype::Stype;

/// Materialized features of one stype group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureTensor {
    /// `[rows, cols]`, NaN is missing
    Numerical(Array2<f64>),
    /// `[rows, cols]` category indices, `-1` is missing
    Categorical(Array2<i64>),
    /// `[rows, cols, *]` category indices, `-1` is missing
    MultiCategorical(MultiNestedTensor),
    /// `[rows, cols, 7]` time fields, `-1` is missing
    Timestamp(Array3<i64>),
    /// `[rows, Σ emb_dim]`, NaN is missing
    Embedding(MultiEmbeddingTensor),
}

impl FeatureTensor {
    pub fn num_rows(&self) -> usize {
        match self {
            FeatureTensor::Numerical(x) => x.nrows(),
            FeatureTensor::Categorical(x) => x.nrows(),
            FeatureTensor::MultiCategorical(x) => x.num_rows(),
            FeatureTensor::Timestamp(x) => x.len_of(Axis(0)),
            FeatureTensor::Embedding(x) => x.num_rows(),
        }
    }

    pub fn num_cols(&self) -> usize {
        match self {
            FeatureTensor::Numerical(x) => x.ncols(),
            FeatureTensor::Categorical(x) => x.ncols(),
            FeatureTensor::MultiCategorical(x) => x.num_cols(),
            FeatureTensor::Timestamp(x) => x.len_of(Axis(1)),
            FeatureTensor::Embedding(x) => x.num_cols(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FeatureTensor::Numerical(_) => "numerical",
            FeatureTensor::Categorical(_) => "categorical",
            FeatureTensor::MultiCategorical(_) => "multi-nested",
            FeatureTensor::Timestamp(_) => "timestamp",
            FeatureTensor::Embedding(_) => "multi-embedding",
        }
    }

    /// Whether this tensor layout is the one used for `stype`.
    pub fn matches_stype(&self, stype: Stype) -> bool {
        matches!(
            (self, stype),
            (FeatureTensor::Numerical(_), Stype::Numerical)
                | (FeatureTensor::Categorical(_), Stype::Categorical)
                | (FeatureTensor::MultiCategorical(_), Stype::MultiCategorical)
                | (FeatureTensor::Timestamp(_), Stype::Timestamp)
                | (FeatureTensor::Embedding(_), Stype::Embedding | Stype::TextEmbedded)
        )
    }

    pub fn index_select(&self, rows: &[usize]) -> Result<Self> {
        let n = self.num_rows();
        if let Some(&bad) = rows.iter().find(|&&r| r >= n) {
            return Err(TabFrameError::ShapeError {
                expected: format!("row index < {}", n),
                actual: bad.to_string(),
            });
        }
        Ok(match self {
            FeatureTensor::Numerical(x) => FeatureTensor::Numerical(x.select(Axis(0), rows)),
            FeatureTensor::Categorical(x) => FeatureTensor::Categorical(x.select(Axis(0), rows)),
            FeatureTensor::MultiCategorical(x) => FeatureTensor::MultiCategorical(x.index_select(rows)?),
            FeatureTensor::Timestamp(x) => FeatureTensor::Timestamp(x.select(Axis(0), rows)),
            FeatureTensor::Embedding(x) => FeatureTensor::Embedding(x.index_select(rows)?),
        })
    }

    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        let n = self.num_rows();
        if start > end || end > n {
            return Err(TabFrameError::ShapeError {
                expected: format!("range within 0..{}", n),
                actual: format!("{}..{}", start, end),
            });
        }
        Ok(match self {
            FeatureTensor::Numerical(x) => FeatureTensor::Numerical(x.slice(s![start..end, ..]).to_owned()),
            FeatureTensor::Categorical(x) => FeatureTensor::Categorical(x.slice(s![start..end, ..]).to_owned()),
            FeatureTensor::MultiCategorical(x) => FeatureTensor::MultiCategorical(x.slice(start, end)?),
            FeatureTensor::Timestamp(x) => FeatureTensor::Timestamp(x.slice(s![start..end, .., ..]).to_owned()),
            FeatureTensor::Embedding(x) => FeatureTensor::Embedding(x.slice(start, end)?),
        })
    }
}

/// Column tensors grouped by stype, with their column names and an optional target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorFrame {
    pub feat_dict: BTreeMap<Stype, FeatureTensor>,
    pub col_names_dict: BTreeMap<Stype, Vec<String>>,
    pub y: Option<Array1<f64>>,
}

impl TensorFrame {
    /// Build and validate a frame.
    pub fn new(
        feat_dict: BTreeMap<Stype, FeatureTensor>,
        col_names_dict: BTreeMap<Stype, Vec<String>>,
        y: Option<Array1<f64>>,
    ) -> Result<Self> {
        let tf = Self {
            feat_dict,
            col_names_dict,
            y,
        };
        tf.validate()?;
        Ok(tf)
    }

    /// Check that tensors, names and target agree with each other.
    pub fn validate(&self) -> Result<()> {
        let feat_keys: Vec<&Stype> = self.feat_dict.keys().collect();
        let name_keys: Vec<&Stype> = self.col_names_dict.keys().collect();
        if feat_keys != name_keys {
            return Err(TabFrameError::ValidationError(format!(
                "feat_dict stypes {:?} do not match col_names_dict stypes {:?}",
                feat_keys, name_keys
            )));
        }

        let mut seen = HashSet::new();
        let mut num_rows: Option<usize> = None;

        for (stype, feat) in &self.feat_dict {
            if !feat.matches_stype(*stype) {
                return Err(TabFrameError::ValidationError(format!(
                    "{} tensor stored under stype {}",
                    feat.kind(),
                    stype
                )));
            }

            let names = &self.col_names_dict[stype];
            if names.len() != feat.num_cols() {
                return Err(TabFrameError::ShapeError {
                    expected: format!("{} {} columns", names.len(), stype),
                    actual: format!("{} columns", feat.num_cols()),
                });
            }
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(TabFrameError::ValidationError(format!(
                        "duplicate column name '{}'",
                        name
                    )));
                }
            }

            if let FeatureTensor::Timestamp(x) = feat {
                if x.len_of(Axis(2)) != crate::stats::NUM_TIME_FIELDS {
                    return Err(TabFrameError::ShapeError {
                        expected: format!("{} time fields", crate::stats::NUM_TIME_FIELDS),
                        actual: format!("{} time fields", x.len_of(Axis(2))),
                    });
                }
            }

            match num_rows {
                None => num_rows = Some(feat.num_rows()),
                Some(n) if n != feat.num_rows() => {
                    return Err(TabFrameError::ShapeError {
                        expected: format!("{} rows", n),
                        actual: format!("{} rows for stype {}", feat.num_rows(), stype),
                    });
                }
                _ => {}
            }
        }

        if let (Some(y), Some(n)) = (&self.y, num_rows) {
            if y.len() != n {
                return Err(TabFrameError::ShapeError {
                    expected: format!("{} targets", n),
                    actual: format!("{} targets", y.len()),
                });
            }
        }

        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.feat_dict
            .values()
            .next()
            .map(FeatureTensor::num_rows)
            .or_else(|| self.y.as_ref().map(|y| y.len()))
            .unwrap_or(0)
    }

    pub fn num_cols(&self) -> usize {
        self.col_names_dict.values().map(Vec::len).sum()
    }

    pub fn stypes(&self) -> Vec<Stype> {
        self.feat_dict.keys().copied().collect()
    }

    /// All column names in stype order.
    pub fn col_names(&self) -> Vec<String> {
        self.col_names_dict.values().flatten().cloned().collect()
    }

    /// Stype and position of a column within its group.
    pub fn locate_col(&self, name: &str) -> Result<(Stype, usize)> {
        self.col_names_dict
            .iter()
            .find_map(|(stype, names)| names.iter().position(|n| n == name).map(|i| (*stype, i)))
            .ok_or_else(|| TabFrameError::FeatureNotFound(name.to_string()))
    }

    /// Single-column feature tensor for `name`.
    pub fn get_col_feat(&self, name: &str) -> Result<FeatureTensor> {
        let (stype, idx) = self.locate_col(name)?;
        let feat = &self.feat_dict[&stype];
        Ok(match feat {
            FeatureTensor::Numerical(x) => FeatureTensor::Numerical(x.slice(s![.., idx..idx + 1]).to_owned()),
            FeatureTensor::Categorical(x) => FeatureTensor::Categorical(x.slice(s![.., idx..idx + 1]).to_owned()),
            FeatureTensor::Timestamp(x) => FeatureTensor::Timestamp(x.slice(s![.., idx..idx + 1, ..]).to_owned()),
            FeatureTensor::MultiCategorical(x) => {
                let cells = (0..x.num_rows()).map(|r| vec![x.get(r, idx).to_vec()]).collect();
                FeatureTensor::MultiCategorical(MultiNestedTensor::from_nested(cells)?)
            }
            FeatureTensor::Embedding(x) => {
                FeatureTensor::Embedding(MultiEmbeddingTensor::from_tensor_list(&[x.col(idx).to_owned()])?)
            }
        })
    }

    pub fn index_select(&self, rows: &[usize]) -> Result<Self> {
        let feat_dict = self
            .feat_dict
            .iter()
            .map(|(stype, feat)| Ok((*stype, feat.index_select(rows)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let y = match &self.y {
            Some(y) => {
                if let Some(&bad) = rows.iter().find(|&&r| r >= y.len()) {
                    return Err(TabFrameError::ShapeError {
                        expected: format!("row index < {}", y.len()),
                        actual: bad.to_string(),
                    });
                }
                Some(y.select(Axis(0), rows))
            }
            None => None,
        };
        Ok(Self {
            feat_dict,
            col_names_dict: self.col_names_dict.clone(),
            y,
        })
    }

    /// Rows `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        let feat_dict = self
            .feat_dict
            .iter()
            .map(|(stype, feat)| Ok((*stype, feat.slice(start, end)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let y = match &self.y {
            Some(y) if start <= end && end <= y.len() => Some(y.slice(s![start..end]).to_owned()),
            Some(y) => {
                return Err(TabFrameError::ShapeError {
                    expected: format!("range within 0..{}", y.len()),
                    actual: format!("{}..{}", start, end),
                })
            }
            None => None,
        };
        Ok(Self {
            feat_dict,
            col_names_dict: self.col_names_dict.clone(),
            y,
        })
    }

    /// Move the column group stored under `from` to `to`.
    ///
    /// The tensor layout must be valid for `to`, and `to` must not already be present.
    pub fn retag_stype(&mut self, from: Stype, to: Stype) -> Result<()> {
        if self.feat_dict.contains_key(&to) {
            return Err(TabFrameError::ValidationError(format!(
                "stype {} already present",
                to
            )));
        }
        let feat = self
            .feat_dict
            .remove(&from)
            .ok_or_else(|| TabFrameError::FeatureNotFound(format!("stype {}", from)))?;
        if !feat.matches_stype(to) {
            self.feat_dict.insert(from, feat);
            return Err(TabFrameError::ValidationError(format!(
                "cannot retag {} columns as {}",
                from, to
            )));
        }
        let names = self.col_names_dict.remove(&from).unwrap_or_default();
        self.feat_dict.insert(to, feat);
        self.col_names_dict.insert(to, names);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> TensorFrame {
        let mut feat_dict = BTreeMap::new();
        let mut col_names_dict = BTreeMap::new();
        feat_dict.insert(
            Stype::Numerical,
            FeatureTensor::Numerical(array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]),
        );
        col_names_dict.insert(Stype::Numerical, vec!["a".to_string(), "b".to_string()]);
        feat_dict.insert(Stype::Categorical, FeatureTensor::Categorical(array![[0], [1], [-1]]));
        col_names_dict.insert(Stype::Categorical, vec!["c".to_string()]);
        feat_dict.insert(
            Stype::TextEmbedded,
            FeatureTensor::Embedding(
                MultiEmbeddingTensor::from_tensor_list(&[array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]]).unwrap(),
            ),
        );
        col_names_dict.insert(Stype::TextEmbedded, vec!["t".to_string()]);
        TensorFrame::new(feat_dict, col_names_dict, Some(array![0.5, 1.5, 2.5])).unwrap()
    }

    #[test]
    fn test_shape_accessors() {
        let tf = sample();
        assert_eq!(tf.num_rows(), 3);
        assert_eq!(tf.num_cols(), 4);
        assert_eq!(tf.col_names(), vec!["a", "b", "c", "t"]);
        assert_eq!(tf.locate_col("c").unwrap(), (Stype::Categorical, 0));
        assert!(tf.locate_col("zzz").is_err());
    }

    #[test]
    fn test_index_select_keeps_alignment() {
        let tf = sample();
        let sub = tf.index_select(&[2, 0]).unwrap();
        assert_eq!(sub.y, Some(array![2.5, 0.5]));
        match &sub.feat_dict[&Stype::Numerical] {
            FeatureTensor::Numerical(x) => assert_eq!(x, &array![[3.0, 30.0], [1.0, 10.0]]),
            other => panic!("unexpected {}", other.kind()),
        }
        assert!(tf.index_select(&[3]).is_err());
    }

    #[test]
    fn test_slice() {
        let tf = sample();
        let sub = tf.slice(1, 3).unwrap();
        assert_eq!(sub.num_rows(), 2);
        assert_eq!(sub.y, Some(array![1.5, 2.5]));
        assert!(tf.slice(2, 5).is_err());
    }

    #[test]
    fn test_get_col_feat() {
        let tf = sample();
        match tf.get_col_feat("b").unwrap() {
            FeatureTensor::Numerical(x) => assert_eq!(x, array![[10.0], [20.0], [30.0]]),
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_retag_text_embedded() {
        let mut tf = sample();
        tf.retag_stype(Stype::TextEmbedded, Stype::Embedding).unwrap();
        assert_eq!(tf.stypes(), vec![Stype::Numerical, Stype::Categorical, Stype::Embedding]);
        assert!(tf.retag_stype(Stype::Numerical, Stype::Categorical).is_err());
        // failed retag leaves the frame untouched
        assert!(tf.feat_dict.contains_key(&Stype::Numerical));
        tf.validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let mut feat_dict = BTreeMap::new();
        let mut col_names_dict = BTreeMap::new();
        feat_dict.insert(Stype::Numerical, FeatureTensor::Categorical(array![[0]]));
        col_names_dict.insert(Stype::Numerical, vec!["a".to_string()]);
        assert!(TensorFrame::new(feat_dict, col_names_dict, None).is_err());

        let mut feat_dict = BTreeMap::new();
        let mut col_names_dict = BTreeMap::new();
        feat_dict.insert(Stype::Numerical, FeatureTensor::Numerical(array![[0.0, 1.0]]));
        col_names_dict.insert(Stype::Numerical, vec!["a".to_string(), "a".to_string()]);
        assert!(TensorFrame::new(feat_dict, col_names_dict, None).is_err());

        let mut feat_dict = BTreeMap::new();
        let mut col_names_dict = BTreeMap::new();
        feat_dict.insert(Stype::Numerical, FeatureTensor::Numerical(array![[0.0], [1.0]]));
        col_names_dict.insert(Stype::Numerical, vec!["a".to_string()]);
        assert!(TensorFrame::new(feat_dict, col_names_dict, Some(array![1.0])).is_err());
    }
}
