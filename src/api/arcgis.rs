use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::{
    geofile::{
        gdal_geofile::generate_shapefile_zip,
        geojson::features_from_geojson,
        kml::generate_kml,
    },
    parcel::{
        lot_plan::{parse_user_input, ParcelQuery},
        region::Region,
    },
    state::export::{ExportFormat, ExportRequest},
};

use super::{ParcelApi, SearchResponse};

/// NSW cadastre lot layer.
pub const NSW_PARCEL_URL: &str =
    "https://maps.six.nsw.gov.au/arcgis/rest/services/public/NSW_Cadastre/MapServer/9/query";

/// QLD land parcel framework layer.
pub const QLD_PARCEL_URL: &str =
    "https://spatial-gis.information.qld.gov.au/arcgis/rest/services/PlanningCadastre/LandParcelPropertyFramework/MapServer/4/query";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ArcGisEndpoints {
    #[serde(default = "default_nsw_url")]
    pub nsw_url: String,
    #[serde(default = "default_qld_url")]
    pub qld_url: String,
}

fn default_nsw_url() -> String {
    NSW_PARCEL_URL.to_string()
}

fn default_qld_url() -> String {
    QLD_PARCEL_URL.to_string()
}

impl Default for ArcGisEndpoints {
    fn default() -> Self {
        Self {
            nsw_url: default_nsw_url(),
            qld_url: default_qld_url(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct QueryResponse {
    #[serde(default)]
    features: Option<Vec<geojson::Feature>>,
}

/// Quote a value for an ArcGIS where clause.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Query parameters for one parcel identifier against its region's layer.
pub fn query_params(query: &ParcelQuery) -> Vec<(&'static str, String)> {
    let (where_clause, out_fields) = match query.region {
        Region::Nsw => {
            let section_clause = match &query.section {
                Some(section) => format!("sectionnumber = {}", quote(section)),
                None => "(sectionnumber IS NULL OR sectionnumber = '')".to_string(),
            };
            (
                format!(
                    "lotnumber = {} AND planlabel = {} AND {}",
                    quote(&query.lot),
                    quote(&query.plan),
                    section_clause
                ),
                "lotnumber,sectionnumber,planlabel",
            )
        }
        Region::Qld => (
            format!("lotplan = {}", quote(&format!("{}{}", query.lot, query.plan))),
            "lot,plan,locality",
        ),
    };
    vec![
        ("where", where_clause),
        ("outFields", out_fields.to_string()),
        ("outSR", "4326".to_string()),
        ("f", "geoJSON".to_string()),
    ]
}

/// Queries the state cadastre services directly and renders exports locally, without an
/// intermediate parcel service.
pub struct ArcGisParcelApi {
    client: reqwest::blocking::Client,
    endpoints: ArcGisEndpoints,
    timeout: Duration,
}

impl ArcGisParcelApi {
    pub fn new(endpoints: ArcGisEndpoints, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("parcel-vision")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoints,
            timeout,
        })
    }

    fn layer_url(&self, region: Region) -> &str {
        match region {
            Region::Nsw => &self.endpoints.nsw_url,
            Region::Qld => &self.endpoints.qld_url,
        }
    }

    fn fetch_geojson(&self, query: &ParcelQuery) -> anyhow::Result<Vec<geojson::Feature>> {
        let url = self.layer_url(query.region);
        let response = self
            .client
            .get(url)
            .query(&query_params(query))
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow!("{} did not answer within {:?}", url, self.timeout)
                } else {
                    anyhow!("Request to {} failed: {}", url, err)
                }
            })?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP {} from {}", response.status(), url));
        }
        let body: QueryResponse = response
            .json()
            .with_context(|| format!("Decoding parcel layer response from {}", url))?;
        Ok(body.features.unwrap_or_default())
    }
}

impl ParcelApi for ArcGisParcelApi {
    fn search(&self, inputs: &[String]) -> anyhow::Result<SearchResponse> {
        let mut response = SearchResponse::default();
        for input in inputs {
            let query = match parse_user_input(input) {
                Some(query) => query,
                None => {
                    log::warn!("Skipping unrecognised parcel identifier '{}'", input);
                    continue;
                }
            };
            let features = features_from_geojson(self.fetch_geojson(&query)?);
            log::info!(
                "{} matched {} {} parcels",
                input,
                features.len(),
                query.region
            );
            response
                .regions
                .extend(std::iter::repeat(query.region).take(features.len()));
            response.features.extend(features);
        }
        Ok(response)
    }

    fn export(&self, request: &ExportRequest) -> anyhow::Result<Vec<u8>> {
        render_export(request)
    }
}

/// Render an export body locally: a KML document or a zipped shapefile.
pub fn render_export(request: &ExportRequest) -> anyhow::Result<Vec<u8>> {
    if request.features.is_empty() {
        return Err(anyhow!("No features provided"));
    }
    let region = Region::infer(&request.features);
    match request.format {
        ExportFormat::Kml => generate_kml(
            &request.features,
            region,
            &request.style,
            &request.folder_name,
        ),
        ExportFormat::Shp => generate_shapefile_zip(&request.features, region),
    }
}
