//! Built-in in-memory datasets

mod synthetic;

pub use synthetic::{house_prices, HOUSE_PRICE_EMB_DIM};
