//! Mini-batch iteration over a tensor frame

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::TensorFrame;
use crate::error::{Result, TabFrameError};

/// Yields `TensorFrame` batches, optionally shuffled.
///
/// Each call to [`DataLoader::iter`] is one epoch. With a seed, the sequence
/// of epoch orders is reproducible.
pub struct DataLoader<'a> {
    frame: &'a TensorFrame,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: Xoshiro256PlusPlus,
}

impl<'a> DataLoader<'a> {
    pub fn new(frame: &'a TensorFrame, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TabFrameError::InvalidParameter {
                name: "batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            frame,
            batch_size,
            shuffle: false,
            drop_last: false,
            rng: Xoshiro256PlusPlus::from_entropy(),
        })
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        self
    }

    /// Skip the final batch when it is smaller than `batch_size`.
    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        let n = self.frame.num_rows();
        if self.drop_last {
            n / self.batch_size
        } else {
            (n + self.batch_size - 1) / self.batch_size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start an epoch.
    pub fn iter(&mut self) -> Batches<'a> {
        let mut order: Vec<usize> = (0..self.frame.num_rows()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        Batches {
            frame: self.frame,
            order,
            batch_size: self.batch_size,
            drop_last: self.drop_last,
            position: 0,
        }
    }
}

/// Iterator over the batches of one epoch
pub struct Batches<'a> {
    frame: &'a TensorFrame,
    order: Vec<usize>,
    batch_size: usize,
    drop_last: bool,
    position: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<TensorFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.order.len() - self.position;
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let rows = &self.order[self.position..end];
        self.position = end;
        Some(self.frame.index_select(rows))
    }
}
