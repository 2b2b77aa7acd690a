use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::vision::Mat;

/// Writes annotated frames to disk as a numbered JPEG sequence.
///
/// A frame sequence rather than a container: the stack carries no muxer, and
/// a sequence is trivially inspectable frame by frame.
pub struct FrameRecorder {
    directory: PathBuf,
    frames_written: u64,
}

impl FrameRecorder {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create recording directory {:?}", directory))?;
        info!("Recording annotated frames to {:?}", directory);
        Ok(Self {
            directory,
            frames_written: 0,
        })
    }

    pub fn write(&mut self, frame: &Mat) -> Result<()> {
        let path = self
            .directory
            .join(format!("frame_{:06}.jpg", self.frames_written));
        let image = frame.to_image()?;
        image
            .save(&path)
            .with_context(|| format!("Failed to write frame to {:?}", path))?;
        self.frames_written += 1;
        debug!("Recorded frame {:?}", path);
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        info!(
            "Recorder finished after {} frames in {:?}",
            self.frames_written, self.directory
        );
    }
}
