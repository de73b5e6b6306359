use std::path::{Path, PathBuf};

use crate::geofile::geojson::write_collection_to_geojson;

use super::{MapAdapter, MapFrame, INDEX_PROPERTY, SELECTED_LINE_COLOR, SELECTED_LINE_WIDTH};

/// Renders frames into a GeoJSON file styled with simplestyle properties (`fill`,
/// `fill-opacity`, `stroke`, `stroke-width`), which most GIS viewers pick up.
pub struct GeoJsonFileMap {
    output_filepath: PathBuf,
}

impl GeoJsonFileMap {
    pub fn new(output_filepath: &Path) -> Self {
        Self {
            output_filepath: output_filepath.to_path_buf(),
        }
    }

    pub fn styled_collection(frame: &MapFrame) -> geojson::FeatureCollection {
        let mut collection = frame.collection.clone();
        for feature in collection.features.iter_mut() {
            let selected = feature
                .property(INDEX_PROPERTY)
                .and_then(|index| index.as_u64())
                .map(|index| frame.is_selected(index as usize))
                .unwrap_or(false);
            let (stroke, stroke_width) = if selected {
                (SELECTED_LINE_COLOR, SELECTED_LINE_WIDTH)
            } else {
                (frame.paint.line_color, frame.paint.line_width)
            };
            feature.set_property("fill", frame.paint.fill_color.to_string());
            feature.set_property("fill-opacity", frame.paint.fill_opacity);
            feature.set_property("stroke", stroke.to_string());
            feature.set_property("stroke-width", stroke_width);
        }
        collection.bbox = Some(vec![
            frame.bounds.min().x,
            frame.bounds.min().y,
            frame.bounds.max().x,
            frame.bounds.max().y,
        ]);
        // Layer paint for viewers that understand style-spec properties.
        let mut foreign_members = geojson::JsonObject::new();
        foreign_members.insert("paint".to_string(), frame.paint.to_json());
        collection.foreign_members = Some(foreign_members);
        collection
    }
}

impl MapAdapter for GeoJsonFileMap {
    fn render(&mut self, frame: &MapFrame) -> anyhow::Result<()> {
        log::info!(
            "Rendering {} parcels ({} selected) to {:?}",
            frame.collection.features.len(),
            frame.selected.len(),
            self.output_filepath
        );
        write_collection_to_geojson(Self::styled_collection(frame), &self.output_filepath)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testdir::testdir;

    use crate::geofile::feature::Feature;
    use crate::map::{MapAdapter, MapFrame};
    use crate::state::{
        feature_store::FeatureStore,
        style::{HexColor, StyleConfig},
    };

    use super::GeoJsonFileMap;

    #[rstest]
    fn test_selected_features_are_highlighted() {
        let mut store = FeatureStore::new();
        store.replace_features(vec![
            Feature::from(geo::Geometry::Point(geo::Point::new(150.0, -33.0))),
            Feature::from(geo::Geometry::Point(geo::Point::new(151.0, -34.0))),
        ]);
        store.toggle(0);
        let style = StyleConfig {
            outline_color: HexColor::new(0x00, 0x00, 0xff),
            ..Default::default()
        };

        let collection = GeoJsonFileMap::styled_collection(&MapFrame::new(&store, &style));

        let strokes: Vec<&str> = collection
            .features
            .iter()
            .map(|feature| feature.property("stroke").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(strokes, vec!["#ffd60a", "#0000ff"]);
        assert_eq!(collection.bbox, Some(vec![150.0, -34.0, 151.0, -33.0]));
        let foreign_members = collection.foreign_members.unwrap();
        let paint = &foreign_members["paint"];
        assert_eq!(paint["parcels-line"]["line-color"], "#0000ff");
    }

    #[rstest]
    fn test_render_writes_file() {
        let test_dir = testdir!();
        let filepath = test_dir.join("map.geojson");
        let mut store = FeatureStore::new();
        store.replace_features(vec![Feature::from(geo::Geometry::Point(geo::Point::new(
            150.0, -33.0,
        )))]);

        GeoJsonFileMap::new(&filepath)
            .render(&MapFrame::new(&store, &StyleConfig::default()))
            .unwrap();

        let contents = std::fs::read_to_string(&filepath).unwrap();
        let geojson: geojson::GeoJson = contents.parse().unwrap();
        assert!(matches!(geojson, geojson::GeoJson::FeatureCollection(_)));
    }
}
