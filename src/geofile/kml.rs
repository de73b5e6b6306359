use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

use crate::{parcel::region::Region, state::style::StyleConfig};

use super::feature::Feature;

const STYLE_ID: &str = "parcel";

type KmlWriter = Writer<Vec<u8>>;

fn start(writer: &mut KmlWriter, element: BytesStart) -> anyhow::Result<()> {
    writer.write_event(Event::Start(element))?;
    Ok(())
}

fn end(writer: &mut KmlWriter, name: &str) -> anyhow::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element(writer: &mut KmlWriter, name: &str, text: &str) -> anyhow::Result<()> {
    start(writer, BytesStart::new(name))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

fn ring_coordinates(ring: &geo::LineString) -> String {
    let mut coordinates: Vec<String> = ring
        .coords()
        .map(|coord| format!("{},{},0", coord.x, coord.y))
        .collect();
    // KML rings must repeat their first vertex.
    if !ring.is_closed() {
        if let Some(first) = coordinates.first().cloned() {
            coordinates.push(first);
        }
    }
    coordinates.join(" ")
}

fn write_ring(
    writer: &mut KmlWriter,
    boundary: &str,
    ring: &geo::LineString,
) -> anyhow::Result<()> {
    start(writer, BytesStart::new(boundary))?;
    start(writer, BytesStart::new("LinearRing"))?;
    text_element(writer, "coordinates", &ring_coordinates(ring))?;
    end(writer, "LinearRing")?;
    end(writer, boundary)
}

fn write_polygon(writer: &mut KmlWriter, polygon: &geo::Polygon) -> anyhow::Result<()> {
    start(writer, BytesStart::new("Polygon"))?;
    write_ring(writer, "outerBoundaryIs", polygon.exterior())?;
    for hole in polygon.interiors() {
        write_ring(writer, "innerBoundaryIs", hole)?;
    }
    end(writer, "Polygon")
}

fn write_style(writer: &mut KmlWriter, style: &StyleConfig) -> anyhow::Result<()> {
    start(writer, BytesStart::new("Style").with_attributes([("id", STYLE_ID)]))?;
    start(writer, BytesStart::new("LineStyle"))?;
    text_element(writer, "color", &style.outline_color.to_kml(1.0))?;
    text_element(writer, "width", &style.outline_weight.to_string())?;
    end(writer, "LineStyle")?;
    start(writer, BytesStart::new("PolyStyle"))?;
    text_element(writer, "color", &style.fill_color.to_kml(style.fill_opacity))?;
    end(writer, "PolyStyle")?;
    end(writer, "Style")
}

/// Render parcels as a KML document with a single shared style. Only polygonal features are
/// written, anything else is skipped.
pub fn generate_kml(
    features: &[Feature],
    region: Region,
    style: &StyleConfig,
    folder_name: &str,
) -> anyhow::Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    start(
        &mut writer,
        BytesStart::new("kml").with_attributes([("xmlns", "http://www.opengis.net/kml/2.2")]),
    )?;
    start(&mut writer, BytesStart::new("Document"))?;
    text_element(&mut writer, "name", folder_name)?;
    write_style(&mut writer, style)?;

    let mut skipped = 0;
    for feature in features {
        let polygons: Vec<&geo::Polygon> = match &feature.geometry {
            geo::Geometry::Polygon(polygon) => vec![polygon],
            geo::Geometry::MultiPolygon(multi_polygon) => multi_polygon.0.iter().collect(),
            _ => {
                skipped += 1;
                continue;
            }
        };

        start(&mut writer, BytesStart::new("Placemark"))?;
        text_element(&mut writer, "name", &region.placename(feature))?;
        text_element(&mut writer, "styleUrl", &format!("#{}", STYLE_ID))?;
        if polygons.len() > 1 {
            start(&mut writer, BytesStart::new("MultiGeometry"))?;
        }
        for polygon in &polygons {
            write_polygon(&mut writer, polygon)?;
        }
        if polygons.len() > 1 {
            end(&mut writer, "MultiGeometry")?;
        }
        end(&mut writer, "Placemark")?;
    }
    if skipped > 0 {
        log::warn!("Skipped {} non-polygon features in KML export", skipped);
    }

    end(&mut writer, "Document")?;
    end(&mut writer, "kml")?;
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::geofile::feature::{AttributeValue, Feature, FeatureMap};
    use crate::parcel::region::Region;
    use crate::state::style::{HexColor, StyleConfig};

    use super::generate_kml;

    fn render(features: &[Feature], region: Region, style: &StyleConfig, folder: &str) -> String {
        String::from_utf8(generate_kml(features, region, style, folder).unwrap()).unwrap()
    }

    fn square(offset: f64) -> geo::Polygon {
        geo::Polygon::new(
            vec![
                (offset, 0.0),
                (offset + 1.0, 0.0),
                (offset + 1.0, 1.0),
                (offset, 1.0),
            ]
            .into(),
            vec![],
        )
    }

    fn qld_attributes() -> FeatureMap {
        FeatureMap::from([
            ("lot".to_string(), AttributeValue::from("3")),
            ("plan".to_string(), AttributeValue::from("RP<1>")),
        ])
    }

    #[rstest]
    fn test_kml_document_style_and_placemark() {
        let style = StyleConfig {
            fill_color: HexColor::new(0x11, 0x22, 0x33),
            outline_color: HexColor::new(0x00, 0x00, 0xff),
            fill_opacity: 1.0,
            outline_weight: 3.0,
        };
        let feature = Feature::new(geo::Geometry::Polygon(square(0.0)), qld_attributes());

        let kml = render(&[feature], Region::Qld, &style, "My & Parcels");

        assert!(kml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(kml.contains("<kml xmlns=\"http://www.opengis.net/kml/2.2\">"));
        assert!(kml.contains("<name>My &amp; Parcels</name>"));
        assert!(kml.contains("<Style id=\"parcel\">"));
        assert!(kml.contains("<color>ffff0000</color>"));
        assert!(kml.contains("<width>3</width>"));
        assert!(kml.contains("<color>ff332211</color>"));
        assert!(kml.contains("<name>Lot 3 Plan RP&lt;1&gt;</name>"));
        assert!(kml.contains("<styleUrl>#parcel</styleUrl>"));
        assert_eq!(kml.matches("<Placemark>").count(), 1);
        assert!(!kml.contains("<MultiGeometry>"));
        // geo closes the ring, so the first vertex is repeated exactly once.
        assert!(kml.contains("<coordinates>0,0,0 1,0,0 1,1,0 0,1,0 0,0,0</coordinates>"));
    }

    #[rstest]
    fn test_kml_multipolygon_and_skipped_geometries() {
        let multi = Feature::new(
            geo::Geometry::MultiPolygon(geo::MultiPolygon(vec![square(0.0), square(5.0)])),
            qld_attributes(),
        );
        let point = Feature::new(
            geo::Geometry::Point(geo::Point::new(1.0, 1.0)),
            qld_attributes(),
        );

        let kml = render(&[multi, point], Region::Qld, &StyleConfig::default(), "Parcels");

        assert_eq!(kml.matches("<Placemark>").count(), 1);
        assert_eq!(kml.matches("<MultiGeometry>").count(), 1);
        assert_eq!(kml.matches("<Polygon>").count(), 2);
        assert!(kml.trim_end().ends_with("</Document>\n</kml>"));
    }

    #[rstest]
    fn test_kml_polygon_with_hole() {
        let polygon = geo::Polygon::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)].into(),
            vec![vec![(2.0, 2.0), (4.0, 2.0), (4.0, 4.0)].into()],
        );
        let feature = Feature::new(
            geo::Geometry::Polygon(polygon),
            FeatureMap::from([
                ("lotnumber".to_string(), AttributeValue::from("43")),
                ("planlabel".to_string(), AttributeValue::from("DP756474")),
            ]),
        );

        let kml = render(&[feature], Region::Nsw, &StyleConfig::default(), "Parcels");

        assert!(kml.contains("<name>Lot 43 DP756474</name>"));
        assert_eq!(kml.matches("<innerBoundaryIs>").count(), 1);
    }
}
