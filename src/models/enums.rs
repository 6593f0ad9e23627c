use serde::{Deserialize, Serialize};

/// Overall verdict for a scanned product.
///
/// Wire format is SCREAMING_SNAKE_CASE — the backend contract sends
/// `"HALAL"`, `"HARAM"`, `"DOUBTFUL"`, or `"NON_FOOD"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanVerdict {
    Halal,
    Haram,
    Doubtful,
    /// The submitted content was not a food product at all.
    NonFood,
}

/// Verdict for a single detected ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngredientVerdict {
    Halal,
    Haram,
    Doubtful,
}

impl ScanVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halal => "HALAL",
            Self::Haram => "HARAM",
            Self::Doubtful => "DOUBTFUL",
            Self::NonFood => "NON_FOOD",
        }
    }
}

impl IngredientVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halal => "HALAL",
            Self::Haram => "HARAM",
            Self::Doubtful => "DOUBTFUL",
        }
    }
}
