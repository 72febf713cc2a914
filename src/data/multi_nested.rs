//! Ragged `[rows, cols, *]` integer tensor used for multicategorical columns

use serde::{Deserialize, Serialize};

use crate::error::{Result, TabFrameError};

/// Ragged tensor stored as flat values plus cell offsets.
///
/// Cell `(row, col)` owns `values[offset[row * num_cols + col]..offset[row * num_cols + col + 1]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NestedParts")]
pub struct MultiNestedTensor {
    num_rows: usize,
    num_cols: usize,
    values: Vec<i64>,
    offset: Vec<usize>,
}

#[derive(Deserialize)]
struct NestedParts {
    num_rows: usize,
    num_cols: usize,
    values: Vec<i64>,
    offset: Vec<usize>,
}

impl TryFrom<NestedParts> for MultiNestedTensor {
    type Error = TabFrameError;

    fn try_from(parts: NestedParts) -> Result<Self> {
        let NestedParts { num_rows, num_cols, values, offset } = parts;
        let cells = num_rows
            .checked_mul(num_cols)
            .ok_or_else(|| TabFrameError::ValidationError("nested tensor shape overflows".to_string()))?;
        if offset.len() != cells + 1 {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} offsets", cells + 1),
                actual: format!("{} offsets", offset.len()),
            });
        }
        let monotone = offset.windows(2).all(|w| w[0] <= w[1]);
        if offset[0] != 0 || !monotone || offset[cells] != values.len() {
            return Err(TabFrameError::ValidationError(format!(
                "offsets must rise from 0 to {} values",
                values.len()
            )));
        }
        Ok(Self { num_rows, num_cols, values, offset })
    }
}

impl MultiNestedTensor {
    /// Build from `rows[row][col] = cell values`.
    pub fn from_nested(rows: Vec<Vec<Vec<i64>>>) -> Result<Self> {
        let num_rows = rows.len();
        let num_cols = rows.first().map(|r| r.len()).unwrap_or(0);

        let mut values = Vec::new();
        let mut offset = Vec::with_capacity(num_rows * num_cols + 1);
        offset.push(0);

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != num_cols {
                return Err(TabFrameError::ShapeError {
                    expected: format!("{} columns", num_cols),
                    actual: format!("{} columns in row {}", row.len(), i),
                });
            }
            for cell in row {
                values.extend(cell);
                offset.push(values.len());
            }
        }

        Ok(Self {
            num_rows,
            num_cols,
            values,
            offset,
        })
    }

    /// Build from column-major cells, `cols[col][row]`.
    pub fn from_columns(cols: Vec<Vec<Vec<i64>>>) -> Result<Self> {
        let num_cols = cols.len();
        let num_rows = cols.first().map(|c| c.len()).unwrap_or(0);
        if let Some(bad) = cols.iter().position(|c| c.len() != num_rows) {
            return Err(TabFrameError::ShapeError {
                expected: format!("{} rows", num_rows),
                actual: format!("{} rows in column {}", cols[bad].len(), bad),
            });
        }

        let mut values = Vec::new();
        let mut offset = Vec::with_capacity(num_rows * num_cols + 1);
        offset.push(0);
        for row in 0..num_rows {
            for col in &cols {
                values.extend_from_slice(&col[row]);
                offset.push(values.len());
            }
        }

        Ok(Self {
            num_rows,
            num_cols,
            values,
            offset,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Values of one cell. Panics on out-of-range indices like slice indexing.
    pub fn get(&self, row: usize, col: usize) -> &[i64] {
        let idx = row * self.num_cols + col;
        &self.values[self.offset[idx]..self.offset[idx + 1]]
    }

    /// Gather rows in the given order.
    pub fn index_select(&self, rows: &[usize]) -> Result<Self> {
        let mut values = Vec::new();
        let mut offset = Vec::with_capacity(rows.len() * self.num_cols + 1);
        offset.push(0);

        for &row in rows {
            if row >= self.num_rows {
                return Err(TabFrameError::ShapeError {
                    expected: format!("row index < {}", self.num_rows),
                    actual: row.to_string(),
                });
            }
            for col in 0..self.num_cols {
                values.extend_from_slice(self.get(row, col));
                offset.push(values.len());
            }
        }

        Ok(Self {
            num_rows: rows.len(),
            num_cols: self.num_cols,
            values,
            offset,
        })
    }

    /// Contiguous rows `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.num_rows {
            return Err(TabFrameError::ShapeError {
                expected: format!("range within 0..{}", self.num_rows),
                actual: format!("{}..{}", start, end),
            });
        }
        let first = self.offset[start * self.num_cols];
        let last = self.offset[end * self.num_cols];
        let offset = self.offset[start * self.num_cols..=end * self.num_cols]
            .iter()
            .map(|o| o - first)
            .collect();

        Ok(Self {
            num_rows: end - start,
            num_cols: self.num_cols,
            values: self.values[first..last].to_vec(),
            offset,
        })
    }

    /// Replace every `-1` with `value`.
    pub fn fill_missing(&mut self, value: i64) {
        for v in self.values.iter_mut().filter(|v| **v == -1) {
            *v = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MultiNestedTensor {
        MultiNestedTensor::from_nested(vec![
            vec![vec![0, 1], vec![2]],
            vec![vec![], vec![-1]],
            vec![vec![3], vec![0, 1, 2]],
        ])
        .unwrap()
    }

    #[test]
    fn test_get() {
        let t = sample();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.num_cols(), 2);
        assert_eq!(t.get(0, 0), &[0, 1]);
        assert!(t.get(1, 0).is_empty());
        assert_eq!(t.get(2, 1), &[0, 1, 2]);
    }

    #[test]
    fn test_from_columns_matches_nested() {
        let by_cols = MultiNestedTensor::from_columns(vec![
            vec![vec![0, 1], vec![], vec![3]],
            vec![vec![2], vec![-1], vec![0, 1, 2]],
        ])
        .unwrap();
        assert_eq!(by_cols, sample());
    }

    #[test]
    fn test_deserialize_validates_offsets() {
        let t = sample();
        let json = serde_json::to_string(&t).unwrap();
        let back: MultiNestedTensor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let empty_offsets = r#"{"num_rows":1,"num_cols":1,"values":[1],"offset":[]}"#;
        assert!(serde_json::from_str::<MultiNestedTensor>(empty_offsets).is_err());
        let past_end = r#"{"num_rows":1,"num_cols":1,"values":[1],"offset":[0,5]}"#;
        assert!(serde_json::from_str::<MultiNestedTensor>(past_end).is_err());
        let decreasing = r#"{"num_rows":1,"num_cols":2,"values":[1,2],"offset":[0,2,1]}"#;
        assert!(serde_json::from_str::<MultiNestedTensor>(decreasing).is_err());
    }

    #[test]
    fn test_index_select_and_slice() {
        let t = sample();
        let picked = t.index_select(&[2, 0]).unwrap();
        assert_eq!(picked.get(0, 1), &[0, 1, 2]);
        assert_eq!(picked.get(1, 0), &[0, 1]);

        let sliced = t.slice(1, 3).unwrap();
        assert_eq!(sliced.num_rows(), 2);
        assert_eq!(sliced.get(0, 1), &[-1]);
        assert_eq!(sliced.get(1, 0), &[3]);

        assert!(t.slice(2, 4).is_err());
        assert!(t.index_select(&[3]).is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(MultiNestedTensor::from_nested(vec![vec![vec![0]], vec![]]).is_err());
    }

    #[test]
    fn test_fill_missing() {
        let mut t = sample();
        t.fill_missing(0);
        assert_eq!(t.get(1, 1), &[0]);
    }
}
