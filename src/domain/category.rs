//! Product categories derived from listing labels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of product lines a price listing can belong to.
///
/// Stored as the snake_case identifier returned by [`ProductCategory::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    /// Standard gold bar, also the fallback when no rule matches
    #[default]
    EmasBatangan,
    GiftSeries,
    IdulFitri,
    Imlek,
    BatikSeriIii,
    Batik,
    PerakMurni,
    PerakHeritage,
    /// Pendant carrying the batik motif
    PendantBatik,
    Pendant,
}

impl ProductCategory {
    pub const ALL: [Self; 10] = [
        Self::EmasBatangan,
        Self::GiftSeries,
        Self::IdulFitri,
        Self::Imlek,
        Self::BatikSeriIii,
        Self::Batik,
        Self::PerakMurni,
        Self::PerakHeritage,
        Self::PendantBatik,
        Self::Pendant,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmasBatangan => "emas_batangan",
            Self::GiftSeries => "emas_batangan_gift_series",
            Self::IdulFitri => "emas_batangan_selamat_idul_fitri",
            Self::Imlek => "emas_batangan_imlek",
            Self::BatikSeriIii => "emas_batangan_batik_seri_iii",
            Self::Batik => "emas_batangan_batik",
            Self::PerakMurni => "perak_murni",
            Self::PerakHeritage => "perak_heritage",
            Self::PendantBatik => "liontin_batik_seri_iii",
            Self::Pendant => "liontin",
        }
    }

    pub const fn is_silver(self) -> bool {
        matches!(self, Self::PerakMurni | Self::PerakHeritage)
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown product category '{s}'"))
    }
}
