//! Feature encoder configuration
//!
//! A [`FeatureEncoderConfig`] names the encoder to use for every stype and
//! can be loaded from JSON:
//!
//! ```json
//! {
//!   "out_channels": 64,
//!   "seed": 0,
//!   "encoders": {
//!     "numerical": { "type": "piecewise_linear" },
//!     "timestamp": { "type": "timestamp", "out_size": 4 }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{Result, TabFrameError};
use crate::nn::encoder::{
    EmbeddingEncoder, LinearEmbeddingEncoder, LinearEncoder, MultiCategoricalEmbeddingEncoder,
    MultiCategoricalMode, NaStrategy, PiecewiseLinearEncoder, StypeEncoder, StypeWiseFeatureEncoder,
    TimestampEncoder, DEFAULT_OUT_SIZE,
};
use crate::stats::ColStats;
use crate::stype::Stype;

fn default_timestamp_na() -> Option<NaStrategy> {
    Some(NaStrategy::MedianTimestamp)
}

fn default_out_size() -> usize {
    DEFAULT_OUT_SIZE
}

/// Encoder choice for one stype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StypeEncoderConfig {
    Embedding {
        #[serde(default)]
        na_strategy: Option<NaStrategy>,
    },
    Linear {
        #[serde(default)]
        na_strategy: Option<NaStrategy>,
    },
    PiecewiseLinear {
        #[serde(default)]
        na_strategy: Option<NaStrategy>,
    },
    LinearEmbedding {
        #[serde(default)]
        na_strategy: Option<NaStrategy>,
    },
    MultiCategoricalEmbedding {
        #[serde(default)]
        mode: MultiCategoricalMode,
        #[serde(default)]
        na_strategy: Option<NaStrategy>,
    },
    Timestamp {
        #[serde(default = "default_timestamp_na")]
        na_strategy: Option<NaStrategy>,
        #[serde(default = "default_out_size")]
        out_size: usize,
    },
}

impl StypeEncoderConfig {
    /// Uninitialized encoder with these options.
    pub fn build(&self) -> Box<dyn StypeEncoder> {
        match *self {
            StypeEncoderConfig::Embedding { na_strategy } => {
                let enc = EmbeddingEncoder::new();
                Box::new(match na_strategy {
                    Some(s) => enc.with_na_strategy(s),
                    None => enc,
                })
            }
            StypeEncoderConfig::Linear { na_strategy } => {
                let enc = LinearEncoder::new();
                Box::new(match na_strategy {
                    Some(s) => enc.with_na_strategy(s),
                    None => enc,
                })
            }
            StypeEncoderConfig::PiecewiseLinear { na_strategy } => {
                let enc = PiecewiseLinearEncoder::new();
                Box::new(match na_strategy {
                    Some(s) => enc.with_na_strategy(s),
                    None => enc,
                })
            }
            StypeEncoderConfig::LinearEmbedding { na_strategy } => {
                let enc = LinearEmbeddingEncoder::new();
                Box::new(match na_strategy {
                    Some(s) => enc.with_na_strategy(s),
                    None => enc,
                })
            }
            StypeEncoderConfig::MultiCategoricalEmbedding { mode, na_strategy } => {
                let enc = MultiCategoricalEmbeddingEncoder::new().with_mode(mode);
                Box::new(match na_strategy {
                    Some(s) => enc.with_na_strategy(s),
                    None => enc,
                })
            }
            StypeEncoderConfig::Timestamp { na_strategy, out_size } => {
                let enc = TimestampEncoder::new().with_out_size(out_size);
                Box::new(match na_strategy {
                    Some(s) => enc.with_na_strategy(s),
                    None => enc.without_na_strategy(),
                })
            }
        }
    }
}

/// Configuration of a [`StypeWiseFeatureEncoder`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoderConfig {
    pub out_channels: usize,
    #[serde(default)]
    pub seed: u64,
    pub encoders: BTreeMap<Stype, StypeEncoderConfig>,
}

impl Default for FeatureEncoderConfig {
    fn default() -> Self {
        let mut encoders = BTreeMap::new();
        encoders.insert(Stype::Categorical, StypeEncoderConfig::Embedding { na_strategy: None });
        encoders.insert(Stype::Numerical, StypeEncoderConfig::Linear { na_strategy: None });
        encoders.insert(Stype::Embedding, StypeEncoderConfig::LinearEmbedding { na_strategy: None });
        encoders.insert(
            Stype::MultiCategorical,
            StypeEncoderConfig::MultiCategoricalEmbedding {
                mode: MultiCategoricalMode::Mean,
                na_strategy: None,
            },
        );
        encoders.insert(
            Stype::Timestamp,
            StypeEncoderConfig::Timestamp {
                na_strategy: default_timestamp_na(),
                out_size: DEFAULT_OUT_SIZE,
            },
        );

        Self {
            out_channels: 256,
            seed: 0,
            encoders,
        }
    }
}

impl FeatureEncoderConfig {
    pub fn with_out_channels(mut self, out_channels: usize) -> Self {
        self.out_channels = out_channels;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_encoder(mut self, stype: Stype, encoder: StypeEncoderConfig) -> Self {
        self.encoders.insert(stype, encoder);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.out_channels == 0 {
            return Err(TabFrameError::ConfigError("out_channels must be positive".to_string()));
        }
        if self.encoders.is_empty() {
            return Err(TabFrameError::ConfigError("no encoders configured".to_string()));
        }
        Ok(())
    }

    /// Uninitialized encoders keyed by stype.
    pub fn stype_encoder_dict(&self) -> HashMap<Stype, Box<dyn StypeEncoder>> {
        self.encoders
            .iter()
            .map(|(&stype, cfg)| (stype, cfg.build()))
            .collect()
    }

    /// Build and initialize a feature encoder for the given columns.
    pub fn build(
        &self,
        col_stats: &HashMap<String, ColStats>,
        col_names_dict: BTreeMap<Stype, Vec<String>>,
    ) -> Result<StypeWiseFeatureEncoder> {
        self.validate()?;
        StypeWiseFeatureEncoder::new(
            self.out_channels,
            col_stats,
            col_names_dict,
            &self.stype_encoder_dict(),
            self.seed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_house_price_setup() {
        let config = FeatureEncoderConfig::default();
        assert_eq!(config.out_channels, 256);
        let dict = config.stype_encoder_dict();
        assert_eq!(dict[&Stype::Categorical].name(), "EmbeddingEncoder");
        assert_eq!(dict[&Stype::Numerical].name(), "LinearEncoder");
        assert_eq!(dict[&Stype::Embedding].name(), "LinearEmbeddingEncoder");
        assert_eq!(dict[&Stype::MultiCategorical].name(), "MultiCategoricalEmbeddingEncoder");
        assert_eq!(dict[&Stype::Timestamp].na_strategy(), Some(NaStrategy::MedianTimestamp));
        assert!(!dict.contains_key(&Stype::TextEmbedded));
    }

    #[test]
    fn test_from_json_with_defaults() {
        let json = r#"{
            "out_channels": 16,
            "encoders": {
                "numerical": { "type": "piecewise_linear", "na_strategy": "mean" },
                "multicategorical": { "type": "multi_categorical_embedding", "mode": "max" },
                "timestamp": { "type": "timestamp" }
            }
        }"#;
        let config = FeatureEncoderConfig::from_json_str(json).unwrap();
        assert_eq!(config.seed, 0);
        assert_eq!(
            config.encoders[&Stype::Timestamp],
            StypeEncoderConfig::Timestamp {
                na_strategy: Some(NaStrategy::MedianTimestamp),
                out_size: 8
            }
        );
        assert_eq!(
            config.encoders[&Stype::MultiCategorical],
            StypeEncoderConfig::MultiCategoricalEmbedding {
                mode: MultiCategoricalMode::Max,
                na_strategy: None
            }
        );
        assert_eq!(config.stype_encoder_dict()[&Stype::Numerical].name(), "PiecewiseLinearEncoder");
    }

    #[test]
    fn test_json_roundtrip_through_file() {
        let config = FeatureEncoderConfig::default().with_out_channels(8).with_seed(3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoders.json");
        std::fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(FeatureEncoderConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(FeatureEncoderConfig::from_json_str(r#"{"out_channels": 0, "encoders": {}}"#).is_err());
        assert!(FeatureEncoderConfig::from_json_str(
            r#"{"out_channels": 4, "encoders": {"numerical": {"type": "unknown"}}}"#
        )
        .is_err());
        assert!(FeatureEncoderConfig::from_json_str("not json").is_err());
    }
}
