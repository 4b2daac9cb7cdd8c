use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::config::RedactConfig;

use super::backend::{DetectionCapability, ObjectDetector, TextDetector};
use super::backends::{EdgeTextDetector, NoObjects, NoText};

/// Detectors resolved for one track, chosen once at construction.
#[derive(Clone)]
pub struct DetectorSet {
    pub text: Arc<dyn TextDetector>,
    /// `None` when object detection is disabled.
    pub object: Option<Arc<dyn ObjectDetector>>,
}

impl DetectorSet {
    pub fn new(text: Arc<dyn TextDetector>, object: Option<Arc<dyn ObjectDetector>>) -> Self {
        Self { text, object }
    }

    /// Run every detector's warm-up hook.
    pub fn warm_up(&self) -> Result<()> {
        self.text
            .warm_up()
            .with_context(|| format!("warming up text detector '{}'", self.text.name()))?;
        if let Some(object) = &self.object {
            object
                .warm_up()
                .with_context(|| format!("warming up object detector '{}'", object.name()))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSet")
            .field("text", &self.text.name())
            .field("object", &self.object.as_ref().map(|o| o.name()))
            .finish()
    }
}

/// Registry of detection strategies, keyed by name per capability.
///
/// The first strategy registered for a capability becomes its default.
/// Instances are shared (`Arc`) so every track built from the registry uses
/// the same model objects.
pub struct DetectorRegistry {
    text: BTreeMap<String, Arc<dyn TextDetector>>,
    object: BTreeMap<String, Arc<dyn ObjectDetector>>,
    default_text: Option<String>,
    default_object: Option<String>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            text: BTreeMap::new(),
            object: BTreeMap::new(),
            default_text: None,
            default_object: None,
        }
    }

    /// Registry holding the CPU strategies shipped with the crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_text(EdgeTextDetector::default());
        registry.register_text(NoText);
        registry.register_object(NoObjects);
        registry
    }

    pub fn register_text<D: TextDetector + 'static>(&mut self, detector: D) {
        self.register_text_shared(Arc::new(detector));
    }

    pub fn register_text_shared(&mut self, detector: Arc<dyn TextDetector>) {
        let name = detector.name().to_string();
        if self.default_text.is_none() {
            self.default_text = Some(name.clone());
        }
        self.text.insert(name, detector);
    }

    pub fn register_object<D: ObjectDetector + 'static>(&mut self, detector: D) {
        self.register_object_shared(Arc::new(detector));
    }

    pub fn register_object_shared(&mut self, detector: Arc<dyn ObjectDetector>) {
        let name = detector.name().to_string();
        if self.default_object.is_none() {
            self.default_object = Some(name.clone());
        }
        self.object.insert(name, detector);
    }

    /// Set the default strategy for a capability.
    pub fn set_default(&mut self, capability: DetectionCapability, name: &str) -> Result<()> {
        match capability {
            DetectionCapability::Text => {
                if !self.text.contains_key(name) {
                    return Err(anyhow!("text detector '{}' not registered", name));
                }
                self.default_text = Some(name.to_string());
            }
            DetectionCapability::Object => {
                if !self.object.contains_key(name) {
                    return Err(anyhow!("object detector '{}' not registered", name));
                }
                self.default_object = Some(name.to_string());
            }
        }
        Ok(())
    }

    pub fn text(&self, name: &str) -> Option<Arc<dyn TextDetector>> {
        self.text.get(name).cloned()
    }

    pub fn object(&self, name: &str) -> Option<Arc<dyn ObjectDetector>> {
        self.object.get(name).cloned()
    }

    pub fn default_text(&self) -> Option<Arc<dyn TextDetector>> {
        self.default_text.as_deref().and_then(|name| self.text(name))
    }

    pub fn default_object(&self) -> Option<Arc<dyn ObjectDetector>> {
        self.default_object
            .as_deref()
            .and_then(|name| self.object(name))
    }

    /// List registered strategies for a capability.
    pub fn list(&self, capability: DetectionCapability) -> Vec<String> {
        match capability {
            DetectionCapability::Text => self.text.keys().cloned().collect(),
            DetectionCapability::Object => self.object.keys().cloned().collect(),
        }
    }

    /// Resolve the strategies named in `config`. An empty name picks the default.
    pub fn select(&self, config: &RedactConfig) -> Result<DetectorSet> {
        let text = if config.text_detector.is_empty() {
            self.default_text()
                .ok_or_else(|| anyhow!("no text detector registered"))?
        } else {
            self.text(&config.text_detector).ok_or_else(|| {
                anyhow!(
                    "unknown text detector '{}' (registered: {:?})",
                    config.text_detector,
                    self.list(DetectionCapability::Text)
                )
            })?
        };

        let object = if !config.enable_object_detection {
            None
        } else if config.object_detector.is_empty() {
            Some(
                self.default_object()
                    .ok_or_else(|| anyhow!("no object detector registered"))?,
            )
        } else {
            Some(self.object(&config.object_detector).ok_or_else(|| {
                anyhow!(
                    "unknown object detector '{}' (registered: {:?})",
                    config.object_detector,
                    self.list(DetectionCapability::Object)
                )
            })?)
        };

        log::debug!(
            "selected detectors: text={} object={:?}",
            text.name(),
            object.as_ref().map(|o| o.name())
        );
        Ok(DetectorSet { text, object })
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_lists_strategies() {
        let registry = DetectorRegistry::with_builtin();
        assert_eq!(
            registry.list(DetectionCapability::Text),
            vec!["edge".to_string(), "none".to_string()]
        );
        assert_eq!(
            registry.list(DetectionCapability::Object),
            vec!["none".to_string()]
        );
        assert_eq!(registry.default_text().unwrap().name(), "edge");
    }

    #[test]
    fn select_honours_config() {
        let registry = DetectorRegistry::with_builtin();
        let cfg = RedactConfig {
            text_detector: "none".to_string(),
            ..RedactConfig::default()
        };
        let set = registry.select(&cfg).unwrap();
        assert_eq!(set.text.name(), "none");
        assert_eq!(set.object.unwrap().name(), "none");
    }

    #[test]
    fn select_skips_object_detector_when_disabled() {
        let registry = DetectorRegistry::with_builtin();
        let cfg = RedactConfig {
            enable_object_detection: false,
            ..RedactConfig::default()
        };
        assert!(registry.select(&cfg).unwrap().object.is_none());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let registry = DetectorRegistry::with_builtin();
        let cfg = RedactConfig {
            object_detector: "yolo".to_string(),
            ..RedactConfig::default()
        };
        let err = registry.select(&cfg).unwrap_err().to_string();
        assert!(err.contains("yolo"));
    }

    #[test]
    fn set_default_requires_registration() {
        let mut registry = DetectorRegistry::with_builtin();
        assert!(registry
            .set_default(DetectionCapability::Text, "paddle")
            .is_err());
        registry
            .set_default(DetectionCapability::Text, "none")
            .unwrap();
        assert_eq!(registry.default_text().unwrap().name(), "none");
    }
}
