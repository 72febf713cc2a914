//! Seeded house-price table covering every stype

use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::HashMap;
use tracing::debug;

use crate::data::TaskType;
use crate::error::{Result, TabFrameError};
use crate::stype::Stype;

pub const HOUSE_PRICE_EMB_DIM: usize = 8;

const REGIONS: [(&str, f64); 5] = [
    ("central", 90_000.0),
    ("north", 40_000.0),
    ("east", 25_000.0),
    ("south", 10_000.0),
    ("west", 0.0),
];
const APPLIANCES: [&str; 5] = ["dishwasher", "dryer", "fridge", "oven", "washer"];
const LISTING_SPAN_DAYS: i64 = 9 * 365;

/// Listings with a price target.
///
/// Columns: `sqft` and `bedrooms` (numerical, `sqft` has nulls),
/// `zip_region` (categorical), `appliances` (multicategorical, `|`
/// separated), `listed_at` (timestamp strings), `summary_embedding`
/// (text-embedded lists of length [`HOUSE_PRICE_EMB_DIM`]).
///
/// The target is `price` for regression. For classification it is
/// `price_band`, the price split into two (binary) or three (multiclass)
/// bands. Returns the frame and the stype of every column, target included.
pub fn house_prices(
    n_rows: usize,
    seed: u64,
    task: TaskType,
) -> Result<(DataFrame, HashMap<String, Stype>)> {
    if n_rows == 0 {
        return Err(TabFrameError::InvalidParameter {
            name: "n_rows".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let listing_start = NaiveDate::from_ymd_opt(2015, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TabFrameError::DataError("invalid listing start date".to_string()))?;

    let mut sqft = Vec::with_capacity(n_rows);
    let mut bedrooms = Vec::with_capacity(n_rows);
    let mut zip_region = Vec::with_capacity(n_rows);
    let mut appliances = Vec::with_capacity(n_rows);
    let mut listed_at = Vec::with_capacity(n_rows);
    let mut embeddings = Vec::with_capacity(n_rows);
    let mut price = Vec::with_capacity(n_rows);

    for _ in 0..n_rows {
        let area: f64 = rng.gen_range(450.0..4200.0);
        let beds = (area / 700.0).round().clamp(1.0, 6.0);
        let (region, premium) = REGIONS[rng.gen_range(0..REGIONS.len())];

        let mut items: Vec<&str> = APPLIANCES
            .iter()
            .copied()
            .filter(|_| rng.gen_bool(0.5))
            .collect();
        items.shuffle(&mut rng);

        let offset = rng.gen_range(0..LISTING_SPAN_DAYS * 86_400);
        let listed = listing_start + Duration::seconds(offset);
        let age_years = offset as f64 / (365.0 * 86_400.0);

        let value = 120.0 * area + 15_000.0 * beds + premium + 8_000.0 * items.len() as f64
            + 6_000.0 * age_years
            + rng.gen_range(-20_000.0..20_000.0);

        // a noisy view of the listing, standing in for a text embedding
        let embedding: Vec<f64> = (0..HOUSE_PRICE_EMB_DIM)
            .map(|k| {
                let signal = match k % 4 {
                    0 => area / 4200.0,
                    1 => beds / 6.0,
                    2 => premium / 90_000.0,
                    _ => items.len() as f64 / APPLIANCES.len() as f64,
                };
                signal + rng.gen_range(-0.1..0.1)
            })
            .collect();

        sqft.push(if rng.gen_bool(0.05) { None } else { Some(area.round()) });
        bedrooms.push(beds);
        zip_region.push(if rng.gen_bool(0.03) { None } else { Some(region.to_string()) });
        appliances.push(if rng.gen_bool(0.05) { None } else { Some(items.join("|")) });
        listed_at.push(if rng.gen_bool(0.02) {
            None
        } else {
            Some(listed.format("%Y-%m-%d %H:%M:%S").to_string())
        });
        embeddings.push(Series::new("".into(), embedding));
        price.push(value);
    }

    let mut col_to_stype = HashMap::from([
        ("sqft".to_string(), Stype::Numerical),
        ("bedrooms".to_string(), Stype::Numerical),
        ("zip_region".to_string(), Stype::Categorical),
        ("appliances".to_string(), Stype::MultiCategorical),
        ("listed_at".to_string(), Stype::Timestamp),
        ("summary_embedding".to_string(), Stype::TextEmbedded),
    ]);

    let target: Column = match task {
        TaskType::Regression => {
            col_to_stype.insert("price".to_string(), Stype::Numerical);
            Series::new("price".into(), price).into()
        }
        TaskType::BinaryClassification | TaskType::MulticlassClassification => {
            col_to_stype.insert("price_band".to_string(), Stype::Categorical);
            let bands = price_bands(&price, task == TaskType::BinaryClassification);
            Series::new("price_band".into(), bands).into()
        }
    };

    let df = DataFrame::new(vec![
        Series::new("sqft".into(), sqft).into(),
        Series::new("bedrooms".into(), bedrooms).into(),
        Series::new("zip_region".into(), zip_region).into(),
        Series::new("appliances".into(), appliances).into(),
        Series::new("listed_at".into(), listed_at).into(),
        Series::new("summary_embedding".into(), embeddings).into(),
        target,
    ])?;

    debug!(rows = df.height(), cols = df.width(), ?task, seed, "Generated house price table");
    Ok((df, col_to_stype))
}

/// Band labels split at the price median (binary) or terciles.
fn price_bands(price: &[f64], binary: bool) -> Vec<&'static str> {
    let mut sorted = price.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let at = |q: f64| sorted[((sorted.len() - 1) as f64 * q) as usize];

    if binary {
        let median = at(0.5);
        price
            .iter()
            .map(|&p| if p <= median { "low" } else { "high" })
            .collect()
    } else {
        let (lo, hi) = (at(1.0 / 3.0), at(2.0 / 3.0));
        price
            .iter()
            .map(|&p| {
                if p <= lo {
                    "low"
                } else if p <= hi {
                    "mid"
                } else {
                    "high"
                }
            })
            .collect()
    }
}
