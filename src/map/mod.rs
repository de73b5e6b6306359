pub mod geojson_map;

use geo::BoundingRect;

use crate::{
    geofile::geojson::features_to_collection,
    state::{
        feature_store::{FeatureStore, Generation},
        style::{HexColor, StyleConfig},
    },
};

/// Property carrying a feature's position in the store, read back from click events.
pub const INDEX_PROPERTY: &str = "_idx";

pub const SELECTED_LINE_COLOR: HexColor = HexColor::new(0xff, 0xd6, 0x0a);
pub const SELECTED_LINE_WIDTH: f64 = 3.0;

/// Extent shown when there is nothing to fit to (mainland Australia).
pub fn default_bounds() -> geo::Rect {
    geo::Rect::new(
        geo::Coord { x: 137.0, y: -39.0 },
        geo::Coord { x: 155.0, y: -9.0 },
    )
}

/// Paint properties of the parcel layers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPaint {
    pub fill_color: HexColor,
    pub fill_opacity: f64,
    pub fill_outline_color: HexColor,
    pub line_color: HexColor,
    pub line_width: f64,
}

impl From<&StyleConfig> for LayerPaint {
    fn from(style: &StyleConfig) -> Self {
        Self {
            fill_color: style.fill_color,
            fill_opacity: style.fill_opacity,
            fill_outline_color: style.outline_color,
            line_color: style.outline_color,
            line_width: style.outline_weight,
        }
    }
}

impl LayerPaint {
    /// Paint properties keyed by layer id, in the style-spec property names.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "parcels-fill": {
                "fill-color": self.fill_color.to_string(),
                "fill-opacity": self.fill_opacity,
                "fill-outline-color": self.fill_outline_color.to_string(),
            },
            "parcels-line": {
                "line-color": self.line_color.to_string(),
                "line-width": self.line_width,
            },
            "parcels-selected": {
                "line-color": SELECTED_LINE_COLOR.to_string(),
                "line-width": SELECTED_LINE_WIDTH,
            },
        })
    }
}

/// Everything a map needs to draw the current state.
#[derive(Debug, Clone)]
pub struct MapFrame {
    pub generation: Generation,
    /// Store features in order, each tagged with [`INDEX_PROPERTY`].
    pub collection: geojson::FeatureCollection,
    pub paint: LayerPaint,
    pub selected: Vec<usize>,
    pub bounds: geo::Rect,
}

impl MapFrame {
    pub fn new(store: &FeatureStore, style: &StyleConfig) -> Self {
        let mut collection = features_to_collection(store.features());
        for (index, feature) in collection.features.iter_mut().enumerate() {
            feature.set_property(INDEX_PROPERTY, index);
        }
        Self {
            generation: store.generation(),
            collection,
            paint: LayerPaint::from(style),
            selected: store.selected_indices(),
            bounds: fit_bounds(store).unwrap_or_else(default_bounds),
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }
}

/// Bounding box of every feature geometry, `None` for an empty store.
pub fn fit_bounds(store: &FeatureStore) -> Option<geo::Rect> {
    store
        .features()
        .iter()
        .filter_map(|feature| feature.geometry.bounding_rect())
        .reduce(|acc, rect| {
            geo::Rect::new(
                geo::Coord {
                    x: acc.min().x.min(rect.min().x),
                    y: acc.min().y.min(rect.min().y),
                },
                geo::Coord {
                    x: acc.max().x.max(rect.max().x),
                    y: acc.max().y.max(rect.max().y),
                },
            )
        })
}

/// Events a map reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEvent {
    FeatureClicked { generation: Generation, index: usize },
}

impl MapEvent {
    /// Click on a rendered feature, identified by the properties the map handed back.
    pub fn clicked(generation: Generation, properties: &geojson::JsonObject) -> Option<Self> {
        let index = properties.get(INDEX_PROPERTY)?.as_u64()?;
        Some(MapEvent::FeatureClicked {
            generation,
            index: usize::try_from(index).ok()?,
        })
    }
}

/// A surface that draws parcels.
pub trait MapAdapter {
    fn render(&mut self, frame: &MapFrame) -> anyhow::Result<()>;
}
