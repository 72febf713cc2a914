//! Feature encoders
//!
//! A [`StypeEncoder`] turns the columns of one stype into
//! `[rows, cols, out_channels]`; [`StypeWiseFeatureEncoder`] runs one per
//! stype group and concatenates the results.
//!
//! | encoder | stypes |
//! |---|---|
//! | [`EmbeddingEncoder`] | categorical |
//! | [`LinearEncoder`], [`PiecewiseLinearEncoder`] | numerical |
//! | [`LinearEmbeddingEncoder`] | embedding, text-embedded |
//! | [`MultiCategoricalEmbeddingEncoder`] | multicategorical |
//! | [`TimestampEncoder`] | timestamp |

mod embedding;
mod linear;
mod linear_embedding;
mod multicategorical;
mod piecewise_linear;
mod stype_encoder;
mod stypewise;
mod timestamp;

pub use embedding::EmbeddingEncoder;
pub use linear::LinearEncoder;
pub use linear_embedding::LinearEmbeddingEncoder;
pub use multicategorical::{MultiCategoricalEmbeddingEncoder, MultiCategoricalMode};
pub use piecewise_linear::PiecewiseLinearEncoder;
pub use stype_encoder::{fill_na, EncoderState, NaStrategy, StypeEncoder};
pub use stypewise::{FeatureEncoder, StypeWiseFeatureEncoder};
pub use timestamp::{cyclic_encoding, positional_encoding, TimestampEncoder, CYCLIC_PERIODS, DEFAULT_OUT_SIZE};
