use anyhow::{anyhow, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::{
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use tracing::{debug, error, info, warn};

use crate::vision::Mat;

#[derive(Debug, Clone)]
pub struct CameraOptions {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Live camera source yielding RGB frames.
pub struct CameraSystem {
    options: CameraOptions,
    camera: Option<Camera>,
    is_initialized: bool,
}

impl CameraSystem {
    pub fn new(options: CameraOptions) -> Self {
        info!("Creating CameraSystem for device {}", options.device_index);
        Self {
            options,
            camera: None,
            is_initialized: false,
        }
    }

    /// Probe for the configured device, falling back to any other camera the
    /// host exposes. Failure here is fatal for the aid: there is nothing to
    /// watch without a camera.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing camera system - scanning for available cameras");

        let available = Self::detect_cameras();
        if available.is_empty() {
            return Err(anyhow!("No cameras detected on this system"));
        }
        info!("Found {} camera(s): {:?}", available.len(), available);

        let candidates = if available.contains(&self.options.device_index) {
            vec![self.options.device_index]
        } else {
            available
        };

        for device in candidates {
            match self.try_initialize_camera(device) {
                Ok(_) => {
                    self.options.device_index = device;
                    info!("Successfully initialized camera {}", device);
                    break;
                }
                Err(e) => {
                    warn!("Failed to initialize camera {}: {}", device, e);
                    continue;
                }
            }
        }

        if !self.is_initialized {
            return Err(anyhow!("Failed to initialize any available camera"));
        }

        Ok(())
    }

    fn try_initialize_camera(&mut self, device: u32) -> Result<()> {
        let index = CameraIndex::Index(device);
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(index, format)?;
        camera.open_stream()?;

        // Prove the stream actually delivers before committing to it
        let _test_frame = camera.frame()?;

        self.camera = Some(camera);
        self.is_initialized = true;
        Ok(())
    }

    pub fn detect_cameras() -> Vec<u32> {
        let mut cameras = Vec::new();
        for device in 0..10 {
            let index = CameraIndex::Index(device);
            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            if Camera::new(index, format).is_ok() {
                cameras.push(device);
            }
        }
        cameras
    }

    /// Capture one frame. Any failure is surfaced to the caller, which treats
    /// it as fatal: there is no retry path for a dying capture device.
    pub fn capture_frame(&mut self) -> Result<Mat> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| anyhow!("Camera not initialized"))?;

        match camera.frame() {
            Ok(frame) => {
                let decoded = frame.decode_image::<RgbFormat>()?;
                let width = decoded.width();
                let height = decoded.height();
                debug!("Captured camera frame: {}x{}", width, height);

                let mut mat = Mat::new(width, height, 3);
                mat.data = decoded.into_raw();
                Ok(mat)
            }
            Err(e) => {
                error!("Camera frame capture failed: {}", e);
                Err(anyhow!("Camera frame capture error: {}", e))
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(ref mut camera) = self.camera {
            match camera.stop_stream() {
                Ok(_) => info!("Camera stream stopped"),
                Err(e) => warn!("Error stopping camera stream: {}", e),
            }
        }
        self.camera = None;
        self.is_initialized = false;
    }
}

impl Drop for CameraSystem {
    fn drop(&mut self) {
        if self.is_initialized {
            debug!("CameraSystem dropped, releasing device");
            if let Some(ref mut camera) = self.camera {
                let _ = camera.stop_stream();
            }
        }
    }
}
