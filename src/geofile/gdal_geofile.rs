use std::{fs, path::Path};

use anyhow::{anyhow, Context};
use gdal::vector::LayerAccess;
use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::parcel::region::{ParcelRecord, Region};

use super::feature::Feature;

pub enum GdalDriverType {
    Shapefile,
    GeoPackage,
}

impl GdalDriverType {
    pub fn name(&self) -> &'static str {
        match self {
            GdalDriverType::Shapefile => "ESRI Shapefile",
            GdalDriverType::GeoPackage => "GPKG",
        }
    }
}

/// Attribute columns of exported parcels.
const PARCEL_FIELDS: [&str; 3] = ["LOT", "SEC", "PLAN"];

/// Layer name, also the member name inside a zipped shapefile.
const LAYER_NAME: &str = "parcels";

fn to_multi_polygon(geometry: &geo::Geometry) -> Option<geo::MultiPolygon> {
    match geometry {
        geo::Geometry::Polygon(polygon) => Some(geo::MultiPolygon(vec![polygon.clone()])),
        geo::Geometry::MultiPolygon(multi_polygon) => Some(multi_polygon.clone()),
        _ => None,
    }
}

/// Write parcels with their lot/section/plan record into a single polygon layer in WGS 84.
/// Features that are not polygonal are skipped.
pub fn write_parcels_to_geofile(
    features: &[Feature],
    region: Region,
    output_filepath: &Path,
    driver: &GdalDriverType,
) -> anyhow::Result<()> {
    let driver =
        gdal::DriverManager::get_driver_by_name(driver.name()).context("Getting GDAL driver")?;

    let prepared: Vec<(Vec<u8>, ParcelRecord)> = features
        .par_iter()
        .filter_map(|feature| {
            to_multi_polygon(&feature.geometry).map(|polygons| (polygons, region.record(feature)))
        })
        .map(|(polygons, record)| {
            wkb::geom_to_wkb(&geo::Geometry::MultiPolygon(polygons))
                .map(|wkb| (wkb, record))
                .map_err(|err| anyhow!("Could not write geometry to WKB, {:?}", err))
        })
        .collect::<anyhow::Result<_>>()?;
    if prepared.len() != features.len() {
        log::warn!(
            "Out of {} features, only {} are polygons and will be written.",
            features.len(),
            prepared.len()
        );
    }

    let crs = gdal::spatial_ref::SpatialRef::from_epsg(4326)?;
    let mut dataset = driver.create_vector_only(output_filepath)?;
    let layer_options = gdal::LayerOptions {
        name: LAYER_NAME,
        srs: Some(&crs),
        ty: gdal::vector::OGRwkbGeometryType::wkbMultiPolygon,
        options: None,
    };
    let mut layer = dataset.create_layer(layer_options)?;
    let field_definitions: Vec<(&str, gdal::vector::OGRFieldType::Type)> = PARCEL_FIELDS
        .iter()
        .map(|field_name| (*field_name, gdal::vector::OGRFieldType::OFTString))
        .collect();
    layer.create_defn_fields(&field_definitions)?;

    log::info!(
        "Writing {} parcels to {:?}",
        prepared.len(),
        output_filepath
    );
    unsafe {
        // Start a transaction in case the driver supports transactions, e.g. GeoPackage.
        gdal_sys::OGR_L_StartTransaction(layer.c_layer());
    };
    let bar = ProgressBar::new(prepared.len() as u64);
    for (wkb, record) in prepared {
        let geometry = gdal::vector::Geometry::from_wkb(&wkb)?;
        let values = [record.lot, record.section, record.plan]
            .into_iter()
            .map(gdal::vector::FieldValue::StringValue)
            .collect::<Vec<_>>();
        layer.create_feature_fields(geometry, &PARCEL_FIELDS, &values)?;
        bar.inc(1);
    }
    unsafe {
        gdal_sys::OGR_L_CommitTransaction(layer.c_layer());
    };
    bar.finish_and_clear();
    Ok(())
}

/// Zipped shapefile bundle (`.shp`, `.shx`, `.dbf`, `.prj`) of the parcels.
pub fn generate_shapefile_zip(features: &[Feature], region: Region) -> anyhow::Result<Vec<u8>> {
    let staging_dir = tempfile::tempdir()?;
    // The shapefile driver writes straight into a zip when the name ends in .shp.zip.
    let zip_filepath = staging_dir.path().join(format!("{}.shp.zip", LAYER_NAME));
    write_parcels_to_geofile(
        features,
        region,
        &zip_filepath,
        &GdalDriverType::Shapefile,
    )?;
    fs::read(&zip_filepath).with_context(|| format!("Reading {:?}", zip_filepath))
}

#[cfg(test)]
mod tests {
    use gdal::vector::LayerAccess;
    use rstest::rstest;
    use testdir::testdir;

    use crate::geofile::feature::{AttributeValue, Feature, FeatureMap};
    use crate::parcel::region::Region;

    use super::{generate_shapefile_zip, write_parcels_to_geofile, GdalDriverType};

    fn nsw_parcels() -> Vec<Feature> {
        let square = geo::Polygon::new(
            vec![(150.0, -33.0), (150.1, -33.0), (150.1, -33.1), (150.0, -33.1)].into(),
            vec![],
        );
        vec![
            Feature::new(
                geo::Geometry::Polygon(square.clone()),
                FeatureMap::from([
                    ("lotnumber".to_string(), AttributeValue::from("43")),
                    ("sectionnumber".to_string(), AttributeValue::from("2")),
                    ("planlabel".to_string(), AttributeValue::from("DP756474")),
                ]),
            ),
            Feature::new(
                geo::Geometry::Point(geo::Point::new(150.0, -33.0)),
                FeatureMap::new(),
            ),
        ]
    }

    #[rstest]
    fn test_write_parcels_to_geopackage() {
        let test_dir = testdir!();
        let geofile_filepath = test_dir.join("parcels.gpkg");

        write_parcels_to_geofile(
            &nsw_parcels(),
            Region::Nsw,
            &geofile_filepath,
            &GdalDriverType::GeoPackage,
        )
        .unwrap();

        let dataset = gdal::Dataset::open(&geofile_filepath).unwrap();
        let mut layer = dataset.layer(0).unwrap();
        assert_eq!(layer.feature_count(), 1);
        let feature = layer.features().next().unwrap();
        let lot = feature.field("LOT").unwrap().and_then(|value| value.into_string());
        let section = feature.field("SEC").unwrap().and_then(|value| value.into_string());
        let plan = feature.field("PLAN").unwrap().and_then(|value| value.into_string());
        assert_eq!(lot, Some("43".to_string()));
        assert_eq!(section, Some("2".to_string()));
        assert_eq!(plan, Some("DP756474".to_string()));
    }

    #[rstest]
    fn test_shapefile_bundle_is_a_zip() {
        let bundle = generate_shapefile_zip(&nsw_parcels(), Region::Nsw).unwrap();
        assert!(bundle.starts_with(b"PK"));
    }
}
