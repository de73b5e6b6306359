pub mod arcgis;
pub mod http;

use serde::Deserialize;

use crate::{
    geofile::{feature::Feature, geojson::features_from_geojson},
    parcel::region::Region,
    state::export::ExportRequest,
};

/// Result of a parcel search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub features: Vec<Feature>,
    /// Region of each feature, in feature order. Empty when the service does not report it.
    pub regions: Vec<Region>,
}

/// Wire form of a search response: `{"features": [...], "regions": [...]}`.
#[derive(Debug, Deserialize)]
pub struct SearchResponseBody {
    #[serde(default)]
    pub features: Vec<geojson::Feature>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl From<SearchResponseBody> for SearchResponse {
    fn from(body: SearchResponseBody) -> Self {
        let num_features = body.features.len();
        let features = features_from_geojson(body.features);
        // Regions are positional, they no longer line up once a feature was dropped.
        let regions = if features.len() == num_features && body.regions.len() == num_features {
            body.regions
        } else {
            Vec::new()
        };
        Self { features, regions }
    }
}

/// The remote side of the parcel client: searching parcels and rendering exports.
pub trait ParcelApi {
    /// Look up parcels by free-text identifiers.
    fn search(&self, inputs: &[String]) -> anyhow::Result<SearchResponse>;

    /// Render an export and return the file body.
    fn export(&self, request: &ExportRequest) -> anyhow::Result<Vec<u8>>;
}
