use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Canonical size class shared by every engine. Pixel dimensions behind a
/// bucket are engine specific, so buckets compare only by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    pub const ALL: [SizeBucket; 3] = [SizeBucket::Small, SizeBucket::Medium, SizeBucket::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
        }
    }
}

impl fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeBucket {
    type Err = HubError;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(SizeBucket::Small),
            "medium" => Ok(SizeBucket::Medium),
            "large" => Ok(SizeBucket::Large),
            _ => Err(HubError::InvalidSize(token.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The bucket -> pixel table an engine advertises.
///
/// Construction never fails so that engines can declare their table freely;
/// [`SizeCatalog::validate`] is what the registry runs before accepting an
/// engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeCatalog {
    entries: Vec<(SizeBucket, Dimensions)>,
}

impl SizeCatalog {
    pub fn new(entries: impl IntoIterator<Item = (SizeBucket, Dimensions)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn square(small: u32, medium: u32, large: u32) -> Self {
        Self::new([
            (SizeBucket::Small, Dimensions::square(small)),
            (SizeBucket::Medium, Dimensions::square(medium)),
            (SizeBucket::Large, Dimensions::square(large)),
        ])
    }

    /// Exactly one entry per bucket, no more and no fewer.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.entries.len() != SizeBucket::ALL.len() {
            return Err(format!(
                "expected exactly {} size buckets (small, medium, large), found {}",
                SizeBucket::ALL.len(),
                self.entries.len()
            ));
        }

        for bucket in SizeBucket::ALL {
            let count = self.entries.iter().filter(|(b, _)| *b == bucket).count();
            if count != 1 {
                return Err(format!(
                    "bucket '{}' must be declared exactly once, found {}",
                    bucket, count
                ));
            }
        }

        Ok(())
    }

    pub fn dimensions(&self, bucket: SizeBucket) -> Option<Dimensions> {
        self.entries
            .iter()
            .find(|(b, _)| *b == bucket)
            .map(|(_, dims)| *dims)
    }

    pub fn entries(&self) -> &[(SizeBucket, Dimensions)] {
        &self.entries
    }
}
