use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geofile::feature::Feature;

/// Cadastre the parcel identifiers belong to. The two states publish different attribute
/// schemas: QLD uses `lot`/`plan`, NSW uses `lotnumber`/`sectionnumber`/`planlabel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "NSW")]
    Nsw,
    #[serde(rename = "QLD")]
    Qld,
}

impl Region {
    pub fn name(&self) -> &'static str {
        match self {
            Region::Nsw => "NSW",
            Region::Qld => "QLD",
        }
    }

    /// Infer the region of a result set from its attribute schema.
    pub fn infer(features: &[Feature]) -> Region {
        if features.iter().any(|feature| feature.has_attribute("lot")) {
            Region::Qld
        } else {
            Region::Nsw
        }
    }

    /// Lot/section/plan of a feature, read with this region's schema.
    pub fn record(&self, feature: &Feature) -> ParcelRecord {
        match self {
            Region::Qld => ParcelRecord {
                lot: feature.attribute_text("lot").unwrap_or_default(),
                section: String::new(),
                plan: feature.attribute_text("plan").unwrap_or_default(),
            },
            Region::Nsw => ParcelRecord {
                lot: feature.attribute_text("lotnumber").unwrap_or_default(),
                section: feature.attribute_text("sectionnumber").unwrap_or_default(),
                plan: feature.attribute_text("planlabel").unwrap_or_default(),
            },
        }
    }

    /// Human readable parcel name, used for KML placemarks.
    pub fn placename(&self, feature: &Feature) -> String {
        let record = self.record(feature);
        match self {
            Region::Qld => format!("Lot {} Plan {}", record.lot, record.plan),
            Region::Nsw if record.section.is_empty() => {
                format!("Lot {} {}", record.lot, record.plan)
            }
            Region::Nsw => format!(
                "Lot {} Section {} {}",
                record.lot, record.section, record.plan
            ),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParcelRecord {
    pub lot: String,
    pub section: String,
    pub plan: String,
}

impl ParcelRecord {
    /// Read a record from either schema, preferring the QLD attribute names.
    pub fn from_feature(feature: &Feature) -> Self {
        let either = |primary: &str, fallback: &str| {
            feature
                .attribute_text(primary)
                .or_else(|| feature.attribute_text(fallback))
                .unwrap_or_default()
        };
        Self {
            lot: either("lot", "lotnumber"),
            section: feature.attribute_text("sectionnumber").unwrap_or_default(),
            plan: either("plan", "planlabel"),
        }
    }
}
