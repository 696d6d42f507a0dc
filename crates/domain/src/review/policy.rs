//! Review value types.

use serde::{Deserialize, Serialize};

use super::ReviewError;

/// Star rating from 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = ReviewError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(Rating(value))
        } else {
            Err(ReviewError::InvalidRating(value))
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// How repeated likes from the same customer are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LikePolicy {
    /// Every like counts.
    #[default]
    AllowMultiple,
    /// A customer's second like is a no-op.
    OnePerUser,
}

impl std::str::FromStr for LikePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow-multiple" => Ok(LikePolicy::AllowMultiple),
            "one-per-user" => Ok(LikePolicy::OnePerUser),
            other => Err(format!("unknown like policy: {other}")),
        }
    }
}
