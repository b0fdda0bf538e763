use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::{AlertPolicy, DEFAULT_ALERT_COOLDOWN, DEFAULT_FAR_LIMIT_M, DEFAULT_NEAR_LIMIT_M};
use crate::detect::{
    BoxDecoder, LabelTable, Taxonomy, TaxonomyMode, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_RESULTS,
};
use crate::pipeline::{
    PipelineSettings, DEFAULT_DEPTH_INPUT_SIZE, DEFAULT_DETECTION_INPUT_SIZE, DEFAULT_FRAME_SKIP,
};

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    mode: Option<TaxonomyMode>,
    labels_path: Option<PathBuf>,
    frame_skip: Option<u32>,
    detection: Option<DetectionConfigFile>,
    depth: Option<DepthConfigFile>,
    alerts: Option<AlertConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    num_classes: Option<usize>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_results: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DepthConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    cooldown_ms: Option<u64>,
    near_limit_m: Option<f32>,
    far_limit_m: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: TaxonomyMode,
    pub labels_path: Option<PathBuf>,
    pub frame_skip: u32,
    pub detection: DetectionSettings,
    pub depth: DepthSettings,
    pub alerts: AlertSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    /// Class slots per output record. Unset means the class count of the mode's taxonomy.
    pub num_classes: Option<usize>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_results: usize,
}

#[derive(Debug, Clone)]
pub struct DepthSettings {
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub cooldown: Duration,
    pub near_limit_m: f32,
    pub far_limit_m: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    /// Load from the JSON file named by `SIGHTLINE_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGHTLINE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let depth = file.depth.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        Self {
            mode: file.mode.unwrap_or_default(),
            labels_path: file.labels_path,
            frame_skip: file.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
            detection: DetectionSettings {
                model_path: detection.model_path,
                input_size: detection.input_size.unwrap_or(DEFAULT_DETECTION_INPUT_SIZE),
                num_classes: detection.num_classes,
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                iou_threshold: detection.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                max_results: detection.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            },
            depth: DepthSettings {
                model_path: depth.model_path,
                input_size: depth.input_size.unwrap_or(DEFAULT_DEPTH_INPUT_SIZE),
            },
            alerts: AlertSettings {
                cooldown: alerts
                    .cooldown_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_ALERT_COOLDOWN),
                near_limit_m: alerts.near_limit_m.unwrap_or(DEFAULT_NEAR_LIMIT_M),
                far_limit_m: alerts.far_limit_m.unwrap_or(DEFAULT_FAR_LIMIT_M),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var("SIGHTLINE_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode.parse()?;
            }
        }
        if let Ok(skip) = std::env::var("SIGHTLINE_FRAME_SKIP") {
            self.frame_skip = skip
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTLINE_FRAME_SKIP must be a positive integer"))?;
        }
        if let Ok(path) = std::env::var("SIGHTLINE_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("SIGHTLINE_DETECTION_MODEL") {
            if !path.trim().is_empty() {
                self.detection.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("SIGHTLINE_DEPTH_MODEL") {
            if !path.trim().is_empty() {
                self.depth.model_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_skip == 0 {
            return Err(anyhow!("frame_skip must be at least 1"));
        }
        if self.detection.input_size == 0 || self.depth.input_size == 0 {
            return Err(anyhow!("model input sizes must be greater than zero"));
        }
        if self.detection.num_classes == Some(0) {
            return Err(anyhow!("num_classes must be at least 1"));
        }
        if self.detection.max_results == 0 {
            return Err(anyhow!("max_results must be at least 1"));
        }
        for (name, value) in [
            ("confidence_threshold", self.detection.confidence_threshold),
            ("iou_threshold", self.detection.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if !(self.alerts.near_limit_m < self.alerts.far_limit_m) {
            return Err(anyhow!(
                "near band limit {} must be below far band limit {}",
                self.alerts.near_limit_m,
                self.alerts.far_limit_m
            ));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            iou_threshold: self.detection.iou_threshold,
            max_results: self.detection.max_results,
            frame_skip: self.frame_skip,
            depth_input_size: self.depth.input_size,
        }
    }

    /// Decoder for `mode`.
    ///
    /// The configured label file and class count apply to the configured mode;
    /// other modes fall back to their built-in taxonomy. Without an explicit
    /// class count the decoder takes the class count of `mode`.
    pub fn decoder_for(&self, mode: TaxonomyMode) -> Result<BoxDecoder> {
        let (taxonomy, num_classes) = if mode == self.mode {
            let taxonomy = match &self.labels_path {
                Some(path) => Taxonomy::with_labels(mode, LabelTable::load(path)?),
                None => Taxonomy::builtin(mode),
            };
            (
                taxonomy,
                self.detection.num_classes.unwrap_or_else(|| mode.class_count()),
            )
        } else {
            (Taxonomy::builtin(mode), mode.class_count())
        };
        BoxDecoder::with_threshold(taxonomy, num_classes, self.detection.confidence_threshold)
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        AlertPolicy {
            near_limit_m: self.alerts.near_limit_m,
            far_limit_m: self.alerts.far_limit_m,
        }
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.mode, TaxonomyMode::Outdoor);
        assert_eq!(cfg.frame_skip, 3);
        assert_eq!(cfg.detection.input_size, 640);
        assert_eq!(cfg.detection.num_classes, None);
        assert_eq!(cfg.detection.confidence_threshold, 0.3);
        assert_eq!(cfg.detection.iou_threshold, 0.5);
        assert_eq!(cfg.detection.max_results, 5);
        assert_eq!(cfg.depth.input_size, 256);
        assert_eq!(cfg.alerts.cooldown, Duration::from_millis(5000));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.detection.iou_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.frame_skip = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.alerts.near_limit_m = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn decoder_for_other_mode_uses_builtin_class_count() {
        let cfg = PipelineConfig::default();
        let outdoor = cfg.decoder_for(TaxonomyMode::Outdoor).unwrap();
        assert_eq!(outdoor.num_classes(), 7);
        let indoor = cfg.decoder_for(TaxonomyMode::Indoor).unwrap();
        assert_eq!(indoor.num_classes(), TaxonomyMode::Indoor.class_count());
        assert_eq!(indoor.taxonomy().mode(), TaxonomyMode::Indoor);
    }

    #[test]
    fn class_count_follows_configured_mode() {
        let mut cfg = PipelineConfig::default();
        cfg.mode = TaxonomyMode::Indoor;
        let decoder = cfg.decoder_for(cfg.mode).unwrap();
        assert_eq!(decoder.num_classes(), 12);
        assert_eq!(decoder.stride(), 17);

        cfg.detection.num_classes = Some(20);
        assert_eq!(cfg.decoder_for(TaxonomyMode::Indoor).unwrap().num_classes(), 20);
        assert_eq!(cfg.decoder_for(TaxonomyMode::Outdoor).unwrap().num_classes(), 7);

        cfg.detection.num_classes = Some(0);
        assert!(cfg.validate().is_err());
    }
}
