//! Vendor identities and label lookup
//!
//! Vendor pages print brand or product-line names in free text. Those labels
//! are mapped onto [`VendorSource`] through a fixed table; anything the table
//! does not know stays unmapped and is rejected upstream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorSource {
    Antam,
    AntamMuliaRetro,
    AntamNonPegadaian,
    Ubs,
    UbsDisney,
    UbsElsa,
    UbsAnna,
    UbsMickeyFullbody,
    UbsHelloKitty,
    Galeri24,
    DinarG24,
    BabyGaleri24,
    LotusArchi,
    LotusArchiGift,
    BabySeriesTumbuhan,
    BabySeriesInvestasi,
    BatikSeries,
    Pegadaian,
}

/// (vendor, labels printed by vendor pages). The first label is the display label.
const LABELS: &[(VendorSource, &[&str])] = &[
    (VendorSource::Antam, &["ANTAM", "LOGAM MULIA", "ANTAM LOGAM MULIA"]),
    (VendorSource::AntamMuliaRetro, &["ANTAM MULIA RETRO"]),
    (VendorSource::AntamNonPegadaian, &["ANTAM NON PEGADAIAN"]),
    (VendorSource::Ubs, &["UBS"]),
    (VendorSource::UbsDisney, &["UBS DISNEY"]),
    (VendorSource::UbsElsa, &["UBS ELSA"]),
    (VendorSource::UbsAnna, &["UBS ANNA"]),
    (VendorSource::UbsMickeyFullbody, &["UBS MICKEY FULLBODY"]),
    (VendorSource::UbsHelloKitty, &["UBS HELLO KITTY"]),
    (VendorSource::Galeri24, &["GALERI 24", "GALERI24"]),
    (VendorSource::DinarG24, &["DINAR G24"]),
    (VendorSource::BabyGaleri24, &["BABY GALERI 24"]),
    (VendorSource::LotusArchi, &["LOTUS ARCHI"]),
    (VendorSource::LotusArchiGift, &["LOTUS ARCHI GIFT"]),
    (VendorSource::BabySeriesTumbuhan, &["BABY SERIES TUMBUHAN"]),
    (VendorSource::BabySeriesInvestasi, &["BABY SERIES INVESTASI"]),
    (VendorSource::BatikSeries, &["BATIK SERIES"]),
    (VendorSource::Pegadaian, &["PEGADAIAN"]),
];

impl VendorSource {
    pub const ALL: [Self; 18] = [
        Self::Antam,
        Self::AntamMuliaRetro,
        Self::AntamNonPegadaian,
        Self::Ubs,
        Self::UbsDisney,
        Self::UbsElsa,
        Self::UbsAnna,
        Self::UbsMickeyFullbody,
        Self::UbsHelloKitty,
        Self::Galeri24,
        Self::DinarG24,
        Self::BabyGaleri24,
        Self::LotusArchi,
        Self::LotusArchiGift,
        Self::BabySeriesTumbuhan,
        Self::BabySeriesInvestasi,
        Self::BatikSeries,
        Self::Pegadaian,
    ];

    /// Storage identifier
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Antam => "antam",
            Self::AntamMuliaRetro => "antam_mulia_retro",
            Self::AntamNonPegadaian => "antam_non_pegadaian",
            Self::Ubs => "ubs",
            Self::UbsDisney => "ubs_disney",
            Self::UbsElsa => "ubs_elsa",
            Self::UbsAnna => "ubs_anna",
            Self::UbsMickeyFullbody => "ubs_mickey_fullbody",
            Self::UbsHelloKitty => "ubs_hello_kitty",
            Self::Galeri24 => "galeri24",
            Self::DinarG24 => "dinar_g24",
            Self::BabyGaleri24 => "baby_galeri24",
            Self::LotusArchi => "lotus_archi",
            Self::LotusArchiGift => "lotus_archi_gift",
            Self::BabySeriesTumbuhan => "baby_series_tumbuhan",
            Self::BabySeriesInvestasi => "baby_series_investasi",
            Self::BatikSeries => "batik_series",
            Self::Pegadaian => "pegadaian",
        }
    }

    pub fn display_label(self) -> &'static str {
        LABELS
            .iter()
            .find(|(vendor, _)| *vendor == self)
            .and_then(|(_, labels)| labels.first().copied())
            .unwrap_or_else(|| self.as_str())
    }

    /// Exact lookup of a page label (case and whitespace insensitive).
    ///
    /// Storage identifiers (`"galeri24"`) are accepted as well so configured
    /// default vendors can use either form.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }

        LABELS
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| *l == normalized))
            .map(|(vendor, _)| *vendor)
            .or_else(|| {
                let lowered = normalized.to_lowercase().replace(' ', "_");
                Self::ALL.into_iter().find(|v| v.as_str() == lowered)
            })
    }

    /// Earliest vendor label in `text` as `(byte offset, vendor, label)`.
    ///
    /// On equal offsets the longer label wins. Offsets index into `text`
    /// itself, so callers can slice it directly.
    pub fn first_label_in(text: &str) -> Option<(usize, Self, &'static str)> {
        let haystack = text.to_ascii_uppercase();
        known_labels()
            .filter_map(|(vendor, label)| find_word(&haystack, label).map(|at| (at, vendor, label)))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| b.2.len().cmp(&a.2.len())))
    }
}

fn known_labels() -> impl Iterator<Item = (VendorSource, &'static str)> {
    LABELS
        .iter()
        .flat_map(|(vendor, labels)| labels.iter().map(move |label| (*vendor, *label)))
}

fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Earliest occurrence of `needle` in `haystack` that sits on word boundaries
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(start, _)| start).find(|&start| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

impl fmt::Display for VendorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VendorSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown vendor source '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_label_lookup() {
        assert_eq!(VendorSource::from_label("GALERI 24"), Some(VendorSource::Galeri24));
        assert_eq!(VendorSource::from_label("  ubs   hello kitty "), Some(VendorSource::UbsHelloKitty));
        assert_eq!(VendorSource::from_label("galeri24"), Some(VendorSource::Galeri24));
        assert_eq!(VendorSource::from_label("antam_mulia_retro"), Some(VendorSource::AntamMuliaRetro));
    }

    #[test]
    fn test_unmapped_labels_are_not_guessed() {
        assert_eq!(VendorSource::from_label("KING HALIM"), None);
        assert_eq!(VendorSource::from_label("UBS PREMIUM"), None);
        assert_eq!(VendorSource::from_label(""), None);
    }

    #[test]
    fn test_first_label_is_earliest_then_longest() {
        let text = "harga GALERI 24 lalu BABY GALERI 24";
        let (at, vendor, label) = VendorSource::first_label_in(text).unwrap();
        assert_eq!((at, vendor, label), (6, VendorSource::Galeri24, "GALERI 24"));

        let (at, vendor, _) = VendorSource::first_label_in("UBS DISNEY 1 gram").unwrap();
        assert_eq!((at, vendor), (0, VendorSource::UbsDisney));
        assert_eq!(VendorSource::first_label_in("tanpa vendor"), None);
    }

    #[test]
    fn test_first_label_prefers_longest_at_same_offset() {
        let (_, vendor, label) = VendorSource::first_label_in("BABY GALERI 24 0.5 gram Rp700.000").unwrap();
        assert_eq!((vendor, label), (VendorSource::BabyGaleri24, "BABY GALERI 24"));

        let (at, vendor, _) = VendorSource::first_label_in("Harga ANTAM MULIA RETRO hari ini").unwrap();
        assert_eq!((at, vendor), (6, VendorSource::AntamMuliaRetro));
    }

    #[test]
    fn test_first_label_respects_word_boundaries() {
        assert_eq!(VendorSource::first_label_in("SUBSCRIBE 1 gram"), None);
        assert_eq!(VendorSource::first_label_in("Rp1.000.000"), None);
    }

    #[test]
    fn test_storage_identifiers_round_trip() {
        for vendor in VendorSource::ALL {
            assert_eq!(vendor.as_str().parse::<VendorSource>(), Ok(vendor));
            assert_eq!(VendorSource::from_label(vendor.display_label()), Some(vendor));
        }
    }
}
