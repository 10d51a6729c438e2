//! Stem configurations understood by the separation engine

use moonarch_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which set of stems a task produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StemConfig {
    /// vocals + accompaniment ("Vocal Remove")
    #[serde(rename = "2stems")]
    TwoStems,
    /// vocals, drums, bass, other ("Basic Split")
    #[serde(rename = "4stems")]
    FourStems,
    /// vocals, drums, bass, piano, other
    #[serde(rename = "5stems")]
    FiveStems,
}

impl StemConfig {
    /// Stem names in the order the engine documents them
    pub fn stem_names(&self) -> &'static [&'static str] {
        match self {
            StemConfig::TwoStems => &["vocals", "accompaniment"],
            StemConfig::FourStems => &["vocals", "drums", "bass", "other"],
            StemConfig::FiveStems => &["vocals", "drums", "bass", "piano", "other"],
        }
    }

    /// Model identifier passed to the engine
    pub fn engine_model(&self) -> &'static str {
        match self {
            StemConfig::TwoStems => "spleeter:2stems",
            StemConfig::FourStems => "spleeter:4stems",
            StemConfig::FiveStems => "spleeter:5stems",
        }
    }

    /// Short identifier ("2stems", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            StemConfig::TwoStems => "2stems",
            StemConfig::FourStems => "4stems",
            StemConfig::FiveStems => "5stems",
        }
    }
}

impl fmt::Display for StemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts both the product task labels and the short identifiers
impl FromStr for StemConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vocal remove" | "2stems" | "spleeter:2stems" => Ok(StemConfig::TwoStems),
            "basic split" | "4stems" | "spleeter:4stems" => Ok(StemConfig::FourStems),
            "5stems" | "spleeter:5stems" => Ok(StemConfig::FiveStems),
            other => Err(Error::InvalidInput(format!(
                "Unsupported task '{}'. Choose 'Vocal Remove' or 'Basic Split'.",
                other
            ))),
        }
    }
}
