//! Materialized dataset: a tensor frame plus the statistics it was built with

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::TensorFrame;
use crate::error::{Result, TabFrameError};
use crate::stats::ColStats;

/// Task implied by the target column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Regression,
    BinaryClassification,
    MulticlassClassification,
}

impl TaskType {
    pub fn is_classification(self) -> bool {
        !matches!(self, TaskType::Regression)
    }
}

/// Tensor frame with column statistics and target metadata
#[derive(Debug, Clone)]
pub struct Dataset {
    pub tensor_frame: TensorFrame,
    /// Stats for every feature column, and for the target if there is one.
    pub col_stats: HashMap<String, ColStats>,
    pub target_col: Option<String>,
    pub task_type: Option<TaskType>,
}

impl Dataset {
    pub fn num_rows(&self) -> usize {
        self.tensor_frame.num_rows()
    }

    /// Number of target classes for classification tasks.
    pub fn num_classes(&self) -> Option<usize> {
        match self.task_type {
            Some(task) if task.is_classification() => {
                let target = self.target_col.as_ref()?;
                self.col_stats
                    .get(target)
                    .and_then(|s| s.count.as_ref())
                    .map(|c| c.num_categories())
            }
            _ => None,
        }
    }

    /// Output width a model head needs for this task.
    pub fn output_channels(&self) -> usize {
        self.num_classes().unwrap_or(1)
    }

    /// Rows in the fraction range `[start, end)` of the dataset.
    pub fn slice_frac(&self, start: f64, end: f64) -> Result<Dataset> {
        if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start > end {
            return Err(TabFrameError::InvalidParameter {
                name: "fraction range".to_string(),
                value: format!("{}..{}", start, end),
                reason: "fractions must satisfy 0 <= start <= end <= 1".to_string(),
            });
        }
        let n = self.num_rows();
        // round so that products like 0.29 * 100 land on the intended row
        let lo = ((start * n as f64).round() as usize).min(n);
        let hi = ((end * n as f64).round() as usize).min(n);
        Ok(Dataset {
            tensor_frame: self.tensor_frame.slice(lo, hi)?,
            col_stats: self.col_stats.clone(),
            target_col: self.target_col.clone(),
            task_type: self.task_type,
        })
    }

    /// Contiguous train/val/test split: `[:train]`, `[train:train+val]`, `[train+val:]`.
    pub fn split(&self, train: f64, val: f64) -> Result<(Dataset, Dataset, Dataset)> {
        if train < 0.0 || val < 0.0 || train + val > 1.0 {
            return Err(TabFrameError::InvalidParameter {
                name: "split".to_string(),
                value: format!("train={}, val={}", train, val),
                reason: "fractions must be non-negative and sum to at most 1".to_string(),
            });
        }
        Ok((
            self.slice_frac(0.0, train)?,
            self.slice_frac(train, train + val)?,
            self.slice_frac(train + val, 1.0)?,
        ))
    }
}
