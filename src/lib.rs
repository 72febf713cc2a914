//! tabframe - stype-wise feature encoding for tabular data
//!
//! Heterogeneous table columns are tagged with a semantic type ([`Stype`]),
//! materialized into a [`TensorFrame`] together with per-column statistics,
//! and encoded by a [`StypeWiseFeatureEncoder`] into one
//! `[rows, columns, channels]` tensor a model can consume.
//!
//! # Modules
//!
//! - [`stype`] - Semantic column types
//! - [`stats`] - Column statistics
//! - [`data`] - Tensor frame, materialization, batching
//! - [`nn`] - Encoders, parameters and the AdamW optimizer
//! - [`config`] - Serializable encoder configuration
//! - [`datasets`] - Generated in-memory tables
//! - [`cli`] - Command-line interface
//!
//! ```no_run
//! use tabframe::prelude::*;
//!
//! # fn main() -> tabframe::Result<()> {
//! let (df, col_to_stype) = house_prices(1000, 0, TaskType::Regression)?;
//! let dataset = materialize(&df, &col_to_stype, Some("price"), &MaterializeConfig::default())?;
//! let mut encoder = FeatureEncoderConfig::default()
//!     .with_out_channels(32)
//!     .build(&dataset.col_stats, dataset.tensor_frame.col_names_dict.clone())?;
//! let (x, col_names) = encoder.forward(&dataset.tensor_frame)?;
//! assert_eq!(x.shape(), &[1000, col_names.len(), 32]);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Data model
pub mod data;
pub mod stats;
pub mod stype;

// Encoders
pub mod config;
pub mod nn;

// Utilities
pub mod cli;
pub mod datasets;

pub use error::{Result, TabFrameError};
pub use stype::Stype;
pub use data::TensorFrame;
pub use nn::StypeWiseFeatureEncoder;

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, TabFrameError};

    // Data model
    pub use crate::data::{
        materialize, DataLoader, Dataset, FeatureTensor, MaterializeConfig, MultiEmbeddingTensor,
        MultiNestedTensor, TaskType, TensorFrame,
    };
    pub use crate::stats::{ColStats, StatType};
    pub use crate::stype::Stype;

    // Encoders
    pub use crate::config::{FeatureEncoderConfig, StypeEncoderConfig};
    pub use crate::nn::encoder::{
        EmbeddingEncoder, LinearEmbeddingEncoder, LinearEncoder, MultiCategoricalEmbeddingEncoder,
        MultiCategoricalMode, NaStrategy, PiecewiseLinearEncoder, StypeEncoder, TimestampEncoder,
    };
    pub use crate::nn::{AdamW, AdamWConfig, FeatureEncoder, Module, StypeWiseFeatureEncoder};

    // Datasets
    pub use crate::datasets::{house_prices, HOUSE_PRICE_EMB_DIM};
}
