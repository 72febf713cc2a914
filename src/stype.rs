//! Semantic types of tabular columns

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TabFrameError;

/// Semantic type of a column.
///
/// The declaration order is the column-group order used by every encoder
/// output, so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stype {
    Numerical,
    Categorical,
    #[serde(rename = "multicategorical")]
    MultiCategorical,
    Timestamp,
    TextEmbedded,
    Embedding,
}

impl Stype {
    pub const ALL: [Stype; 6] = [
        Stype::Numerical,
        Stype::Categorical,
        Stype::MultiCategorical,
        Stype::Timestamp,
        Stype::TextEmbedded,
        Stype::Embedding,
    ];

    /// The stype whose encoders can handle this one.
    pub fn parent(self) -> Stype {
        match self {
            Stype::TextEmbedded => Stype::Embedding,
            other => other,
        }
    }

    pub fn is_text_stype(self) -> bool {
        matches!(self, Stype::TextEmbedded)
    }

    pub fn uses_multi_nested_tensor(self) -> bool {
        matches!(self, Stype::MultiCategorical)
    }

    pub fn uses_multi_embedding_tensor(self) -> bool {
        matches!(self, Stype::Embedding | Stype::TextEmbedded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stype::Numerical => "numerical",
            Stype::Categorical => "categorical",
            Stype::MultiCategorical => "multicategorical",
            Stype::Timestamp => "timestamp",
            Stype::TextEmbedded => "text_embedded",
            Stype::Embedding => "embedding",
        }
    }
}

impl fmt::Display for Stype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stype {
    type Err = TabFrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numerical" => Ok(Stype::Numerical),
            "categorical" => Ok(Stype::Categorical),
            "multicategorical" | "multi_categorical" => Ok(Stype::MultiCategorical),
            "timestamp" => Ok(Stype::Timestamp),
            "text_embedded" => Ok(Stype::TextEmbedded),
            "embedding" => Ok(Stype::Embedding),
            _ => Err(TabFrameError::InvalidParameter {
                name: "stype".to_string(),
                value: s.to_string(),
                reason: "unknown semantic type".to_string(),
            }),
        }
    }
}
