//! Tabular data model
//!
//! - [`TensorFrame`]: column tensors grouped by stype, plus the target
//! - [`MultiNestedTensor`] / [`MultiEmbeddingTensor`]: ragged and per-column-width layouts
//! - [`materialize`]: DataFrame to [`Dataset`] with column statistics
//! - [`DataLoader`]: mini-batch iteration

mod dataset;
mod loader;
mod materialize;
mod multi_embedding;
mod multi_nested;
mod tensor_frame;

pub use dataset::{Dataset, TaskType};
pub use loader::{Batches, DataLoader};
pub use materialize::{materialize, MaterializeConfig};
pub use multi_embedding::MultiEmbeddingTensor;
pub use multi_nested::MultiNestedTensor;
pub use tensor_frame::{FeatureTensor, TensorFrame};
