//! Trainable encoder modules with explicit backward passes

pub mod encoder;
pub mod optim;
pub mod parameter;

pub use encoder::{FeatureEncoder, NaStrategy, StypeEncoder, StypeWiseFeatureEncoder};
pub use optim::{AdamW, AdamWConfig};
pub use parameter::{Module, Param, Param1, Param2, Param3, ParamMut};
