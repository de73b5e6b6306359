use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geofile::{feature::Feature, geojson::feature_to_geojson};

use super::{feature_store::FeatureStore, style::StyleConfig};

pub const DEFAULT_FOLDER_NAME: &str = "Parcels";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Kml,
    Shp,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Kml => "kml",
            ExportFormat::Shp => "shp",
        }
    }

    pub fn default_file_name(&self) -> &'static str {
        match self {
            ExportFormat::Kml => "parcels.kml",
            ExportFormat::Shp => "parcels.zip",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ExportFormat::Kml => "application/vnd.google-earth.kml+xml",
            ExportFormat::Shp => "application/zip",
        }
    }

    /// The download name for this format. Shapefiles ship zipped, so a `.kml` name typed for the
    /// KML export becomes `.zip`.
    pub fn file_name(&self, requested: &str) -> String {
        let requested = requested.trim();
        if requested.is_empty() {
            return self.default_file_name().to_string();
        }
        match self {
            ExportFormat::Kml => requested.to_string(),
            ExportFormat::Shp => {
                let stem_len = requested.len().saturating_sub(4);
                match requested.get(stem_len..) {
                    Some(extension) if extension.eq_ignore_ascii_case(".kml") => {
                        format!("{}.zip", &requested[..stem_len])
                    }
                    _ => requested.to_string(),
                }
            }
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything the export endpoint needs for one download. Built fresh per export, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub folder_name: String,
    pub file_name: String,
    pub features: Vec<Feature>,
    pub style: StyleConfig,
}

impl ExportRequest {
    /// Request body sent to the export endpoint.
    pub fn to_json(&self) -> serde_json::Value {
        let features: Vec<geojson::Feature> =
            self.features.iter().map(feature_to_geojson).collect();
        serde_json::json!({
            "format": self.format,
            "folderName": self.folder_name,
            "fileName": self.file_name,
            "features": features,
            "style": self.style,
        })
    }
}

/// Derive an export request from the current store and style. Exports the selection, or every
/// feature when nothing is selected.
pub fn build_request(
    store: &FeatureStore,
    style: &StyleConfig,
    format: ExportFormat,
    folder_name: &str,
    file_name: &str,
) -> ExportRequest {
    let folder_name = match folder_name.trim() {
        "" => DEFAULT_FOLDER_NAME.to_string(),
        name => name.to_string(),
    };
    ExportRequest {
        format,
        folder_name,
        file_name: format.file_name(file_name),
        features: store.chosen_features(),
        style: style.clone(),
    }
}
