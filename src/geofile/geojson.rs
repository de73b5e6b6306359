use std::{fs, path::Path};

use anyhow::{anyhow, Context};
use rayon::prelude::*;

use super::feature::{AttributeValue, Feature, FeatureMap};

pub fn feature_from_geojson(feature: geojson::Feature) -> anyhow::Result<Feature> {
    let geometry = feature
        .geometry
        .ok_or_else(|| anyhow!("Feature has no geometry"))?;
    let geometry = geo::Geometry::<f64>::try_from(geometry.value)
        .map_err(|err| anyhow!("Could not convert GeoJSON geometry, {}", err))?;
    let attributes: FeatureMap = feature
        .properties
        .unwrap_or_default()
        .iter()
        .filter_map(|(key, value)| {
            AttributeValue::from_json(value).map(|value| (key.to_owned(), value))
        })
        .collect();
    Ok(Feature::new(geometry, attributes))
}

pub fn feature_to_geojson(feature: &Feature) -> geojson::Feature {
    let properties: geojson::JsonObject = feature
        .attributes
        .iter()
        .map(|(key, value)| (key.to_owned(), value.to_json()))
        .collect();
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(
            &feature.geometry,
        ))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Convert a batch of GeoJSON features. Features without a usable geometry are dropped with a
/// warning, so one broken record does not discard a whole result set.
pub fn features_from_geojson(features: Vec<geojson::Feature>) -> Vec<Feature> {
    let num_features = features.len();
    let converted: Vec<Feature> = features
        .into_par_iter()
        .filter_map(|feature| match feature_from_geojson(feature) {
            Ok(feature) => Some(feature),
            Err(err) => {
                log::warn!("Skipping feature: {}", err);
                None
            }
        })
        .collect();
    if converted.len() != num_features {
        log::warn!(
            "Out of {} features read, only {} could be converted.",
            num_features,
            converted.len()
        )
    }
    converted
}

pub fn features_to_collection(features: &[Feature]) -> geojson::FeatureCollection {
    features.iter().map(feature_to_geojson).collect()
}

pub fn write_collection_to_geojson(
    feature_collection: geojson::FeatureCollection,
    output_filepath: &Path,
) -> anyhow::Result<()> {
    let geojson_contents = geojson::GeoJson::from(feature_collection);
    fs::write(output_filepath, geojson_contents.to_string())
        .with_context(|| format!("Writing GeoJSON to {:?}", output_filepath))
}
