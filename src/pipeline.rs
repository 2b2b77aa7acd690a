use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::announcer::AnnouncementChannel;
use crate::audio::{AudioOutputOptions, AudioSystem};
use crate::camera::{CameraOptions, CameraSystem};
use crate::config::{CalibrationConfig, PathsenseConfig};
use crate::feedback::{GuidanceEngine, HazardCue};
use crate::geometry::{classify_position, estimate_distance};
use crate::recorder::FrameRecorder;
use crate::vision::{FrameAnnotator, FrameObservation, HazardDetector};

/// Capture → detect → decide → annotate → record, paced to the target rate.
pub struct GuidancePipeline {
    camera: CameraSystem,
    detector: HazardDetector,
    annotator: FrameAnnotator,
    engine: GuidanceEngine,
    announcer: AnnouncementChannel,
    recorder: Option<FrameRecorder>,
    config: PathsenseConfig,
    running: Arc<RwLock<bool>>,
}

impl GuidancePipeline {
    pub async fn new(config: PathsenseConfig) -> Result<Self> {
        info!("Initializing guidance pipeline");
        config.validate()?;

        let mut camera = CameraSystem::new(CameraOptions {
            device_index: config.camera.device_index,
            width: config.camera.width,
            height: config.camera.height,
            fps: config.camera.fps,
        });
        camera
            .initialize()
            .await
            .context("Unable to open the camera stream")?;

        let detector = HazardDetector::new(
            config.detection.confidence_threshold,
            config.detection.max_detections,
        );

        let annotator = FrameAnnotator::new(config.overlay.box_color, config.overlay.accent_color);

        let engine = GuidanceEngine::new(Duration::from_secs_f64(config.feedback.cooldown_seconds));

        // Speech worker gets a degraded speaker when audio is off, so the
        // channel and shutdown path stay identical either way.
        let audio_options = if config.audio.enabled {
            AudioOutputOptions {
                enable_tts: config.audio.enable_tts,
                fallback_tone: config.audio.fallback_tone,
            }
        } else {
            AudioOutputOptions {
                enable_tts: false,
                fallback_tone: false,
            }
        };
        let announcer = AnnouncementChannel::start(move || AudioSystem::new(&audio_options))?;

        let recorder = if config.output.record {
            Some(FrameRecorder::new(&config.output.directory)?)
        } else {
            None
        };

        info!("Pipeline initialization complete");

        Ok(Self {
            camera,
            detector,
            annotator,
            engine,
            announcer,
            recorder,
            config,
            running: Arc::new(RwLock::new(false)),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Starting guidance loop");

        {
            let mut running = self.running.write().await;
            *running = true;
        }

        // Ctrl-C flips the running flag; the loop then drains and tears down.
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping guidance loop");
                *running.write().await = false;
            }
        });

        let result = self.run_loop().await;
        self.teardown();
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        let frame_interval =
            Duration::from_secs_f64(1.0 / self.config.feedback.target_fps as f64);
        let mut frame_count: u64 = 0;
        let mut last_stats_time = Instant::now();

        loop {
            {
                let running = self.running.read().await;
                if !*running {
                    break;
                }
            }

            let frame_start = Instant::now();

            // Capture and inference failures are fatal: the aid fails fast
            // rather than walking its user past unseen hazards.
            self.process_single_frame()?;
            frame_count += 1;

            if frame_count % 100 == 0 {
                let elapsed = last_stats_time.elapsed();
                let fps = 100.0 / elapsed.as_secs_f32();
                info!("Processed {} frames, current FPS: {:.2}", frame_count, fps);
                last_stats_time = Instant::now();
            }

            let elapsed = frame_start.elapsed();
            if elapsed < frame_interval {
                tokio::time::sleep(frame_interval - elapsed).await;
            }
        }

        info!("Guidance loop stopped after {} frames", frame_count);
        Ok(())
    }

    fn process_single_frame(&mut self) -> Result<()> {
        let mut frame = self
            .camera
            .capture_frame()
            .context("Error capturing frame from the camera stream")?;

        let observation = self
            .detector
            .detect(&frame)
            .context("Hazard inference failed")?;

        // Distance for every surviving detection; degenerate boxes are
        // skipped, not fatal.
        let mut distances: Vec<(usize, f32)> = Vec::with_capacity(observation.detections.len());
        for (index, detection) in observation.detections.iter().enumerate() {
            match estimate_distance(
                detection.bbox.width(),
                self.config.calibration.known_width_m,
                self.config.calibration.focal_length_px,
            ) {
                Ok(distance) => distances.push((index, distance)),
                Err(e) => debug!("Skipping detection {}: {}", index, e),
            }
        }

        let hazard_present = observation.has_hazard(&self.config.detection.hazard_labels);
        let cue = select_hazard_cue(
            &observation,
            &self.config.detection.hazard_labels,
            &self.config.calibration,
        );

        if hazard_present && cue.is_none() {
            // Hazard on screen but every qualifying box was degenerate: no
            // announcement, and no reset either - the hazard has not left.
            debug!("Hazard detected but geometry unusable this frame");
        } else if let Some(message) = self.engine.observe(cue, Instant::now()) {
            info!("{}", message);
            self.announcer.announce(message);
        }

        self.annotator
            .annotate(&mut frame, &observation, &distances)?;

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.write(&frame)?;
        }

        Ok(())
    }

    fn teardown(&mut self) {
        if let Err(e) = self.announcer.shutdown() {
            error!("Announcer shutdown failed: {}", e);
        }
        self.camera.stop();
        if let Some(recorder) = self.recorder.take() {
            debug!("Recorded {} frames", recorder.frames_written());
        }
    }

    #[allow(dead_code)]
    pub async fn stop(&self) {
        info!("Stopping pipeline...");
        let mut running = self.running.write().await;
        *running = false;
    }
}

/// The deterministic selection rule for the frame's qualifying hazard: the
/// lowest-index hazard-labeled detection in detector output order whose
/// geometry resolves. Detections with degenerate boxes are passed over;
/// simultaneous hazards are neither merged nor re-prioritized by proximity.
pub fn select_hazard_cue(
    observation: &FrameObservation,
    hazard_labels: &[String],
    calibration: &CalibrationConfig,
) -> Option<HazardCue> {
    observation
        .detections
        .iter()
        .filter(|d| hazard_labels.iter().any(|l| l == &d.label))
        .find_map(|detection| {
            let distance = estimate_distance(
                detection.bbox.width(),
                calibration.known_width_m,
                calibration.focal_length_px,
            )
            .ok()?;
            let (cx, _) = detection.bbox.centroid();
            Some(HazardCue {
                position: classify_position(cx, observation.frame_width as f32),
                distance_m: distance,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::HazardPosition;
    use crate::vision::{BoundingBox, Detection};

    fn calibration() -> CalibrationConfig {
        CalibrationConfig {
            known_width_m: 0.5,
            focal_length_px: 1000.0,
        }
    }

    fn labels() -> Vec<String> {
        vec!["pothole".to_string(), "stairs".to_string()]
    }

    fn detection(label: &str, x1: f32, x2: f32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x1,
                y1: 100.0,
                x2,
                y2: 150.0,
            },
            label: label.to_string(),
            confidence: 0.8,
        }
    }

    #[test]
    fn first_qualifying_detection_wins() {
        let observation = FrameObservation {
            detections: vec![
                detection("person", 0.0, 40.0),
                detection("pothole", 75.0, 125.0),
                detection("pothole", 500.0, 560.0),
            ],
            frame_width: 600,
            frame_height: 480,
        };

        let cue = select_hazard_cue(&observation, &labels(), &calibration()).unwrap();
        assert_eq!(cue.position, HazardPosition::Left);
        assert!((cue.distance_m - 10.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_box_is_passed_over_for_the_next_hazard() {
        let observation = FrameObservation {
            detections: vec![
                detection("pothole", 100.0, 100.0), // zero width
                detection("pothole", 450.0, 550.0),
            ],
            frame_width: 600,
            frame_height: 480,
        };

        let cue = select_hazard_cue(&observation, &labels(), &calibration()).unwrap();
        assert_eq!(cue.position, HazardPosition::Right);
        assert!((cue.distance_m - 5.0).abs() < 1e-4);
    }

    #[test]
    fn no_cue_without_hazard_labels_or_valid_geometry() {
        let observation = FrameObservation {
            detections: vec![detection("person", 0.0, 40.0)],
            frame_width: 600,
            frame_height: 480,
        };
        assert!(select_hazard_cue(&observation, &labels(), &calibration()).is_none());

        let observation = FrameObservation {
            detections: vec![detection("pothole", 100.0, 100.0)],
            frame_width: 600,
            frame_height: 480,
        };
        assert!(select_hazard_cue(&observation, &labels(), &calibration()).is_none());
    }
}
