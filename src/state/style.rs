use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

/// Key the style record is persisted under.
pub const STYLE_STORAGE_KEY: &str = "parcel_vision.style";

/// A `#RRGGBB` color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl HexColor {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// KML colors are `aabbggrr`.
    pub fn to_kml(&self, opacity: f64) -> String {
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0) as u8;
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            alpha, self.blue, self.green, self.red
        )
    }
}

impl FromStr for HexColor {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("'{}' is not a #RRGGBB color", value));
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
        Ok(Self {
            red: channel(0..2)?,
            green: channel(2..4)?,
            blue: channel(4..6)?,
        })
    }
}

impl TryFrom<String> for HexColor {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(value: HexColor) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Rendering parameters shared by the map and the exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleConfig {
    pub fill_color: HexColor,
    pub outline_color: HexColor,
    /// In `[0, 1]`.
    pub fill_opacity: f64,
    /// Non-negative.
    pub outline_weight: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            fill_color: HexColor::new(0xff, 0x00, 0x00),
            outline_color: HexColor::new(0x00, 0x00, 0x00),
            fill_opacity: 0.5,
            outline_weight: 2.0,
        }
    }
}

impl StyleConfig {
    /// Shallow merge: fields present in the patch overwrite. Numbers are clamped, non-finite
    /// numbers are ignored.
    pub fn merged(&self, patch: &StylePatch) -> StyleConfig {
        let mut merged = self.clone();
        if let Some(color) = patch.fill_color {
            merged.fill_color = color;
        }
        if let Some(color) = patch.outline_color {
            merged.outline_color = color;
        }
        if let Some(opacity) = patch.fill_opacity.filter(|value| value.is_finite()) {
            merged.fill_opacity = opacity;
        }
        if let Some(weight) = patch.outline_weight.filter(|value| value.is_finite()) {
            merged.outline_weight = weight;
        }
        merged.clamped()
    }

    fn clamped(mut self) -> StyleConfig {
        let defaults = StyleConfig::default();
        self.fill_opacity = if self.fill_opacity.is_finite() {
            self.fill_opacity.clamp(0.0, 1.0)
        } else {
            defaults.fill_opacity
        };
        self.outline_weight = if self.outline_weight.is_finite() {
            self.outline_weight.max(0.0)
        } else {
            defaults.outline_weight
        };
        self
    }
}

/// Partial style update, as produced by a single UI input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StylePatch {
    pub fill_color: Option<HexColor>,
    pub outline_color: Option<HexColor>,
    pub fill_opacity: Option<f64>,
    pub outline_weight: Option<f64>,
}

impl StylePatch {
    pub fn is_empty(&self) -> bool {
        self == &StylePatch::default()
    }
}

/// Key/value persistence for serialized records.
pub trait StyleStorage {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Stores records as a JSON object of `key -> serialized record` in a single file.
#[derive(Debug, Clone)]
pub struct FileStyleStorage {
    filepath: PathBuf,
}

impl FileStyleStorage {
    pub fn new(filepath: &Path) -> Self {
        Self {
            filepath: filepath.to_path_buf(),
        }
    }

    fn read_entries(&self) -> anyhow::Result<HashMap<String, String>> {
        if !self.filepath.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.filepath)
            .with_context(|| format!("Reading style storage {:?}", self.filepath))?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl StyleStorage for FileStyleStorage {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.read_entries()?.remove(key))
    }

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        // A corrupt storage file is replaced rather than blocking every future write.
        let mut entries = self.read_entries().unwrap_or_else(|err| {
            log::warn!("Discarding unreadable style storage: {}", err);
            HashMap::new()
        });
        entries.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.filepath.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.filepath, serde_json::to_string_pretty(&entries)?)
            .with_context(|| format!("Writing style storage {:?}", self.filepath))
    }
}

/// The current style plus the storage it is mirrored to.
pub struct StyleStore<S: StyleStorage> {
    storage: S,
    current: StyleConfig,
}

impl<S: StyleStorage> StyleStore<S> {
    /// Start from the persisted style, or the defaults when there is none.
    pub fn open(storage: S) -> Self {
        let current = load(&storage);
        Self { storage, current }
    }

    pub fn current(&self) -> &StyleConfig {
        &self.current
    }

    /// Merge the patch and persist the result. A failed write is returned, the merged style is
    /// kept in memory either way.
    pub fn update(&mut self, patch: &StylePatch) -> anyhow::Result<()> {
        self.current = self.current.merged(patch);
        let serialized = serde_json::to_string(&self.current)?;
        self.storage
            .write(STYLE_STORAGE_KEY, &serialized)
            .map_err(|err| {
                log::error!("Could not persist style: {:#}", err);
                err
            })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// Read the persisted style. Never fails: anything missing or malformed degrades to defaults.
pub fn load<S: StyleStorage>(storage: &S) -> StyleConfig {
    let raw = match storage.read(STYLE_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return StyleConfig::default(),
        Err(err) => {
            log::warn!("Could not read persisted style, using defaults: {:#}", err);
            return StyleConfig::default();
        }
    };
    match serde_json::from_str::<StyleConfig>(&raw) {
        Ok(style) => style.clamped(),
        Err(err) => {
            log::warn!("Malformed persisted style, using defaults: {}", err);
            StyleConfig::default()
        }
    }
}
