use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsenseConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub calibration: CalibrationConfig,
    pub feedback: FeedbackConfig,
    pub audio: AudioConfig,
    pub overlay: OverlayConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera device index
    pub device_index: u32,
    /// Camera resolution width
    pub width: u32,
    /// Camera resolution height
    pub height: u32,
    /// Capture frames per second requested from the device
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum confidence for a detection to be kept
    pub confidence_threshold: f32,
    /// Labels that count as walking hazards
    pub hazard_labels: Vec<String>,
    /// Cap on detections kept per frame
    pub max_detections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Real-world width of the reference hazard in meters
    pub known_width_m: f32,
    /// Focal length in pixels; calibrate for the actual camera
    pub focal_length_px: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Minimum seconds between spoken announcements
    pub cooldown_seconds: f64,
    /// Target processing rate for the decision loop
    pub target_fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Enable the speech worker
    pub enabled: bool,
    /// Use the platform text-to-speech engine
    pub enable_tts: bool,
    /// Beep instead when no TTS engine is available
    pub fallback_tone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// RGB color for hazard boxes
    pub box_color: [u8; 3],
    /// RGB color for sight-lines and distance ticks
    pub accent_color: [u8; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Record annotated frames to disk
    pub record: bool,
    /// Directory for the recorded frame sequence
    pub directory: String,
}

impl Default for PathsenseConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                device_index: 0,
                width: 640,
                height: 480,
                fps: 30,
            },
            detection: DetectionConfig {
                confidence_threshold: 0.5,
                hazard_labels: vec!["pothole".to_string(), "stairs".to_string()],
                max_detections: 10,
            },
            calibration: CalibrationConfig {
                known_width_m: 0.5,
                focal_length_px: 1000.0,
            },
            feedback: FeedbackConfig {
                cooldown_seconds: 2.0,
                target_fps: 10,
            },
            audio: AudioConfig {
                enabled: true,
                enable_tts: true,
                fallback_tone: true,
            },
            overlay: OverlayConfig {
                box_color: [255, 0, 255],
                accent_color: [255, 255, 255],
            },
            output: OutputConfig {
                record: false,
                directory: "recordings".to_string(),
            },
        }
    }
}

impl PathsenseConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            // Create default config file
            let default_config = Self::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            fs::write(path, toml_content).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Reject configurations the geometry and pacing cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.calibration.known_width_m <= 0.0 {
            bail!(
                "calibration.known_width_m must be positive, got {}",
                self.calibration.known_width_m
            );
        }
        if self.calibration.focal_length_px <= 0.0 {
            bail!(
                "calibration.focal_length_px must be positive, got {}",
                self.calibration.focal_length_px
            );
        }
        if self.feedback.target_fps == 0 {
            bail!("feedback.target_fps must be at least 1");
        }
        if self.feedback.cooldown_seconds < 0.0 {
            bail!(
                "feedback.cooldown_seconds must not be negative, got {}",
                self.feedback.cooldown_seconds
            );
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            bail!(
                "detection.confidence_threshold must lie in [0, 1], got {}",
                self.detection.confidence_threshold
            );
        }
        if self.detection.hazard_labels.is_empty() {
            bail!("detection.hazard_labels must name at least one label");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PathsenseConfig::default().validate().unwrap();
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = PathsenseConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: PathsenseConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.calibration.known_width_m, 0.5);
        assert_eq!(parsed.feedback.target_fps, 10);
        assert_eq!(parsed.detection.hazard_labels, config.detection.hazard_labels);
    }

    #[test]
    fn bad_calibration_is_rejected() {
        let mut config = PathsenseConfig::default();
        config.calibration.focal_length_px = 0.0;
        assert!(config.validate().is_err());

        let mut config = PathsenseConfig::default();
        config.calibration.known_width_m = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let mut config = PathsenseConfig::default();
        config.feedback.target_fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_hazard_labels_are_rejected() {
        let mut config = PathsenseConfig::default();
        config.detection.hazard_labels.clear();
        assert!(config.validate().is_err());
    }
}
