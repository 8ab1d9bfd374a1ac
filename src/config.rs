use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::Rgb;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::error::{DiagnosisError, Result};

pub const DEFAULT_MODEL_PATH: &str = "models/keras_model.onnx";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl Default for ImageSize {
    fn default() -> Self {
        ImageSize {
            width: 224,
            height: 224,
        }
    }
}

/// Memory layout of the tensor handed to the model.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

/// Channel order the model was trained with. Decoded images are always RGB.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// A display color written as `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HexColor(pub Rgb<u8>);

impl FromStr for HexColor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("expected a color like #ff0000, got {s:?}"));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| format!("bad color {s:?}: {e}"))
        };
        Ok(HexColor(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?])))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Rgb([r, g, b]) = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ClassEntry {
    pub label: String,
    #[serde_as(as = "DisplayFromStr")]
    pub color: HexColor,
}

impl ClassEntry {
    pub fn new(label: &str, color: Rgb<u8>) -> Self {
        ClassEntry {
            label: label.to_string(),
            color: HexColor(color),
        }
    }
}

/// Class labels in model output order, each with its palette color.
///
/// Labels and palette keys live in the same entries, so every index the
/// classifier can produce resolves to both a label and a color.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(try_from = "Vec<ClassEntry>", into = "Vec<ClassEntry>")]
pub struct ClassSet {
    entries: Vec<ClassEntry>,
}

impl ClassSet {
    pub fn new(entries: Vec<ClassEntry>) -> std::result::Result<Self, String> {
        if entries.is_empty() {
            return Err("at least one class is required".to_string());
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.label.trim().is_empty() {
                return Err("class labels must not be empty".to_string());
            }
            if !seen.insert(entry.label.as_str()) {
                return Err(format!("duplicate class label {:?}", entry.label));
            }
        }
        Ok(ClassSet { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClassEntry> {
        self.entries.get(index)
    }

    pub fn color_of(&self, label: &str) -> Option<Rgb<u8>> {
        self.entries
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.color.0)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.label.as_str())
    }
}

impl Default for ClassSet {
    fn default() -> Self {
        ClassSet {
            entries: vec![
                ClassEntry::new("PNEUMONIA", Rgb([255, 0, 0])),
                ClassEntry::new("NORMAL", Rgb([0, 255, 0])),
            ],
        }
    }
}

impl TryFrom<Vec<ClassEntry>> for ClassSet {
    type Error = String;

    fn try_from(entries: Vec<ClassEntry>) -> std::result::Result<Self, Self::Error> {
        ClassSet::new(entries)
    }
}

impl From<ClassSet> for Vec<ClassEntry> {
    fn from(classes: ClassSet) -> Self {
        classes.entries
    }
}

/// How a rendered image is fitted into its viewport.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "rule", content = "limit", rename_all = "snake_case")]
pub enum ScaleRule {
    /// Scale so the longer side equals the limit.
    LongestSide(u32),
    /// Scale so the height equals the limit.
    Height(u32),
}

impl ScaleRule {
    pub fn limit(&self) -> u32 {
        match *self {
            ScaleRule::LongestSide(limit) | ScaleRule::Height(limit) => limit,
        }
    }

    pub fn factor(&self, width: u32, height: u32) -> f64 {
        match *self {
            ScaleRule::LongestSide(limit) => limit as f64 / width.max(height).max(1) as f64,
            ScaleRule::Height(limit) => limit as f64 / height.max(1) as f64,
        }
    }

    /// Output size for an image of the given size. Dimensions are truncated
    /// and never drop below one pixel.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = self.factor(width, height);
        let new_width = ((width as f64 * scale) as u32).max(1);
        let new_height = ((height as f64 * scale) as u32).max(1);
        (new_width, new_height)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub border: u32,
    pub font_path: Option<PathBuf>,
    pub font_scale: f32,
    pub stroke: u32,
    pub text_x: i32,
    /// Baselines of the diagnosis and confidence lines.
    pub baselines: [i32; 2],
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            border: 15,
            font_path: None,
            font_scale: 28.0,
            stroke: 2,
            text_x: 30,
            baselines: [40, 80],
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct DiagnosisConfig {
    pub model_path: PathBuf,
    pub input_size: ImageSize,
    pub layout: TensorLayout,
    pub channel_order: ChannelOrder,
    pub classes: ClassSet,
    pub render: RenderConfig,
    pub single_shot_scale: ScaleRule,
    pub interactive_scale: ScaleRule,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        DiagnosisConfig {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: ImageSize::default(),
            layout: TensorLayout::default(),
            channel_order: ChannelOrder::default(),
            classes: ClassSet::default(),
            render: RenderConfig::default(),
            single_shot_scale: ScaleRule::LongestSide(800),
            interactive_scale: ScaleRule::Height(500),
        }
    }
}

impl DiagnosisConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_error = |message: String| DiagnosisError::Config {
            path: path.to_path_buf(),
            message,
        };
        let text = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config: DiagnosisConfig =
            serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))?;
        config.validate().map_err(config_error)?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                DiagnosisConfig::from_file(path)
            }
            None => Ok(DiagnosisConfig::default()),
        }
    }

    pub fn with_model_path(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = model_path.into();
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_size.width == 0 || self.input_size.height == 0 {
            return Err("input_size must be non-zero".to_string());
        }
        if self.single_shot_scale.limit() == 0 || self.interactive_scale.limit() == 0 {
            return Err("scale limits must be non-zero".to_string());
        }
        if self.render.font_scale <= 0.0 {
            return Err("render.font_scale must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_and_print() {
        let red: HexColor = "#ff0000".parse().unwrap();
        assert_eq!(red.0, Rgb([255, 0, 0]));
        assert_eq!(red.to_string(), "#ff0000");
        let green: HexColor = "00FF00".parse().unwrap();
        assert_eq!(green.0, Rgb([0, 255, 0]));
        assert!("#ff00".parse::<HexColor>().is_err());
        assert!("#gg0000".parse::<HexColor>().is_err());
    }

    #[test]
    fn hex_colors_reject_signs() {
        assert!("#+f+f+f".parse::<HexColor>().is_err());
        assert!("-1ff00".parse::<HexColor>().is_err());
    }

    #[test]
    fn default_palette_matches_labels() {
        let classes = ClassSet::default();
        assert!(!classes.is_empty());
        assert_eq!(classes.len(), 2);
        assert_eq!(classes.labels().collect::<Vec<_>>(), ["PNEUMONIA", "NORMAL"]);
        assert_eq!(classes.color_of("PNEUMONIA"), Some(Rgb([255, 0, 0])));
        assert_eq!(classes.color_of("NORMAL"), Some(Rgb([0, 255, 0])));
        assert_eq!(classes.color_of("OTHER"), None);
    }

    #[test]
    fn class_set_rejects_empty_and_duplicates() {
        assert!(ClassSet::new(vec![]).is_err());
        let dup = vec![
            ClassEntry::new("NORMAL", Rgb([0, 255, 0])),
            ClassEntry::new("NORMAL", Rgb([0, 0, 255])),
        ];
        assert!(ClassSet::new(dup).is_err());
    }

    #[test]
    fn config_json_fills_defaults() {
        let json = r##"{
            "model_path": "/srv/model.onnx",
            "classes": [
                {"label": "PNEUMONIA", "color": "#ff0000"},
                {"label": "NORMAL", "color": "#00ff00"}
            ],
            "interactive_scale": {"rule": "height", "limit": 400}
        }"##;
        let config: DiagnosisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.model_path, PathBuf::from("/srv/model.onnx"));
        assert_eq!(config.input_size, ImageSize::default());
        assert_eq!(config.interactive_scale, ScaleRule::Height(400));
        assert_eq!(config.single_shot_scale, ScaleRule::LongestSide(800));
        assert_eq!(config.render.border, 15);
    }

    #[test]
    fn config_json_rejects_duplicate_labels() {
        let json = r##"{"classes": [
            {"label": "NORMAL", "color": "#00ff00"},
            {"label": "NORMAL", "color": "#ff0000"}
        ]}"##;
        assert!(serde_json::from_str::<DiagnosisConfig>(json).is_err());
    }

    #[test]
    fn longest_side_rule_fits_both_orientations() {
        let rule = ScaleRule::LongestSide(800);
        assert_eq!(rule.target_size(1600, 1200), (800, 600));
        assert_eq!(rule.target_size(1200, 1600), (600, 800));
        assert_eq!(rule.target_size(400, 200), (800, 400));
    }

    #[test]
    fn height_rule_only_looks_at_height() {
        let rule = ScaleRule::Height(500);
        assert_eq!(rule.target_size(2000, 1000), (1000, 500));
        assert_eq!(rule.target_size(250, 250), (500, 500));
    }
}
