use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::BoundingBox;

const DEFAULT_DETECTION_INTERVAL: u64 = 5;
const DEFAULT_BLUR_STRENGTH: u32 = 51;
const DEFAULT_PRIMARY_LABEL: &str = "person";
const DEFAULT_DOCUMENT_LABELS: [&str; 5] = ["book", "document", "id_card", "paper", "passport"];
const DEFAULT_ID_CARD_MIN_ASPECT: f32 = 1.4;
const DEFAULT_ID_CARD_MAX_ASPECT: f32 = 1.9;
const DEFAULT_ID_CARD_MIN_SIZE: u32 = 50;
const DEFAULT_TEXT_PADDING: u32 = 8;
const DEFAULT_OBJECT_PADDING: u32 = 10;
const DEFAULT_MAX_TEXT_REGIONS: usize = 50;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
const DEFAULT_TEXT_DETECTOR: &str = "edge";
const DEFAULT_OBJECT_DETECTOR: &str = "none";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RedactConfigFile {
    detection_interval: Option<u64>,
    blur_strength: Option<u32>,
    debug_mode: Option<bool>,
    enable_object_detection: Option<bool>,
    primary_label: Option<String>,
    document_labels: Option<Vec<String>>,
    id_card: Option<IdCardConfigFile>,
    padding: Option<PaddingConfigFile>,
    max_text_regions: Option<usize>,
    poll_timeout_ms: Option<u64>,
    detectors: Option<DetectorsConfigFile>,
    debug_font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct IdCardConfigFile {
    min_aspect: Option<f32>,
    max_aspect: Option<f32>,
    min_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PaddingConfigFile {
    text: Option<u32>,
    object: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorsConfigFile {
    text: Option<String>,
    object: Option<String>,
}

/// Size and shape test for document-like objects that carry no document label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdCardHeuristic {
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Width and height must both be strictly greater than this.
    pub min_size: u32,
}

impl IdCardHeuristic {
    pub fn matches(&self, bbox: &BoundingBox) -> bool {
        let aspect = bbox.aspect_ratio();
        let min_size = i64::from(self.min_size);
        aspect >= self.min_aspect
            && aspect <= self.max_aspect
            && i64::from(bbox.width) > min_size
            && i64::from(bbox.height) > min_size
    }
}

impl Default for IdCardHeuristic {
    fn default() -> Self {
        Self {
            min_aspect: DEFAULT_ID_CARD_MIN_ASPECT,
            max_aspect: DEFAULT_ID_CARD_MAX_ASPECT,
            min_size: DEFAULT_ID_CARD_MIN_SIZE,
        }
    }
}

/// Redaction pipeline settings for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct RedactConfig {
    /// Submit every Nth frame for detection.
    pub detection_interval: u64,
    /// Gaussian kernel size; must be odd.
    pub blur_strength: u32,
    /// Draw detections instead of blurring objects.
    pub debug_mode: bool,
    pub enable_object_detection: bool,
    /// Label of the subject that stays visible.
    pub primary_label: String,
    pub document_labels: BTreeSet<String>,
    pub id_card: IdCardHeuristic,
    pub text_padding: u32,
    pub object_padding: u32,
    /// Text results above this count are treated as a false-positive storm.
    pub max_text_regions: usize,
    pub poll_timeout: Duration,
    pub text_detector: String,
    pub object_detector: String,
    /// TrueType/OpenType font for debug captions.
    pub debug_font_path: Option<PathBuf>,
}

impl Default for RedactConfig {
    fn default() -> Self {
        Self {
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            blur_strength: DEFAULT_BLUR_STRENGTH,
            debug_mode: false,
            enable_object_detection: true,
            primary_label: DEFAULT_PRIMARY_LABEL.to_string(),
            document_labels: DEFAULT_DOCUMENT_LABELS
                .iter()
                .map(|label| label.to_string())
                .collect(),
            id_card: IdCardHeuristic::default(),
            text_padding: DEFAULT_TEXT_PADDING,
            object_padding: DEFAULT_OBJECT_PADDING,
            max_text_regions: DEFAULT_MAX_TEXT_REGIONS,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            text_detector: DEFAULT_TEXT_DETECTOR.to_string(),
            object_detector: DEFAULT_OBJECT_DETECTOR.to_string(),
            debug_font_path: None,
        }
    }
}

impl RedactConfig {
    /// Defaults, then the file named by `REDACT_CONFIG`, then `REDACT_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REDACT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file path, without environment overrides.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RedactConfigFile) -> Self {
        let defaults = Self::default();
        let id_card = file.id_card.unwrap_or_default();
        let padding = file.padding.unwrap_or_default();
        let detectors = file.detectors.unwrap_or_default();
        Self {
            detection_interval: file
                .detection_interval
                .unwrap_or(defaults.detection_interval),
            blur_strength: file.blur_strength.unwrap_or(defaults.blur_strength),
            debug_mode: file.debug_mode.unwrap_or(defaults.debug_mode),
            enable_object_detection: file
                .enable_object_detection
                .unwrap_or(defaults.enable_object_detection),
            primary_label: file.primary_label.unwrap_or(defaults.primary_label),
            document_labels: file
                .document_labels
                .map(|labels| labels.into_iter().collect())
                .unwrap_or(defaults.document_labels),
            id_card: IdCardHeuristic {
                min_aspect: id_card.min_aspect.unwrap_or(defaults.id_card.min_aspect),
                max_aspect: id_card.max_aspect.unwrap_or(defaults.id_card.max_aspect),
                min_size: id_card.min_size.unwrap_or(defaults.id_card.min_size),
            },
            text_padding: padding.text.unwrap_or(defaults.text_padding),
            object_padding: padding.object.unwrap_or(defaults.object_padding),
            max_text_regions: file.max_text_regions.unwrap_or(defaults.max_text_regions),
            poll_timeout: file
                .poll_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_timeout),
            text_detector: detectors.text.unwrap_or(defaults.text_detector),
            object_detector: detectors.object.unwrap_or(defaults.object_detector),
            debug_font_path: file.debug_font_path,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(interval) = env_value("REDACT_DETECTION_INTERVAL") {
            self.detection_interval = interval.parse().map_err(|_| {
                anyhow!("REDACT_DETECTION_INTERVAL must be a positive integer")
            })?;
        }
        if let Some(strength) = env_value("REDACT_BLUR_STRENGTH") {
            self.blur_strength = strength
                .parse()
                .map_err(|_| anyhow!("REDACT_BLUR_STRENGTH must be an odd positive integer"))?;
        }
        if let Some(debug) = env_value("REDACT_DEBUG") {
            self.debug_mode = parse_bool("REDACT_DEBUG", &debug)?;
        }
        if let Some(enabled) = env_value("REDACT_OBJECT_DETECTION") {
            self.enable_object_detection = parse_bool("REDACT_OBJECT_DETECTION", &enabled)?;
        }
        if let Some(label) = env_value("REDACT_PRIMARY_LABEL") {
            self.primary_label = label;
        }
        if let Some(labels) = env_value("REDACT_DOCUMENT_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.document_labels = parsed.into_iter().collect();
            }
        }
        if let Some(name) = env_value("REDACT_TEXT_DETECTOR") {
            self.text_detector = name;
        }
        if let Some(name) = env_value("REDACT_OBJECT_DETECTOR") {
            self.object_detector = name;
        }
        if let Some(path) = env_value("REDACT_DEBUG_FONT") {
            self.debug_font_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.detection_interval == 0 {
            return Err(anyhow!("detection_interval must be at least 1"));
        }
        if self.blur_strength == 0 || self.blur_strength % 2 == 0 {
            return Err(anyhow!(
                "blur_strength must be an odd positive kernel size, got {}",
                self.blur_strength
            ));
        }
        if !(self.id_card.min_aspect.is_finite() && self.id_card.max_aspect.is_finite())
            || self.id_card.min_aspect > self.id_card.max_aspect
        {
            return Err(anyhow!(
                "id card aspect range [{}, {}] is invalid",
                self.id_card.min_aspect,
                self.id_card.max_aspect
            ));
        }
        if self.poll_timeout.is_zero() {
            return Err(anyhow!("poll timeout must be greater than zero"));
        }
        self.primary_label = self.primary_label.trim().to_string();
        if self.primary_label.is_empty() {
            return Err(anyhow!("primary_label must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<RedactConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean, got '{}'", key, other)),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
