use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use tracing::{debug, info};

// Simple matrix type for raw RGB frames, independent of any camera backend.
#[derive(Debug, Clone)]
pub struct Mat {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl Mat {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        let size = (width * height * channels) as usize;
        Self {
            data: vec![0u8; size],
            width,
            height,
            channels,
        }
    }

    pub fn to_image(&self) -> Result<DynamicImage> {
        if self.channels == 3 {
            let img_buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
                self.width,
                self.height,
                self.data.clone(),
            )
            .ok_or_else(|| anyhow!("Failed to create image buffer"))?;
            Ok(DynamicImage::ImageRgb8(img_buffer))
        } else {
            Err(anyhow!("Unsupported channel count: {}", self.channels))
        }
    }
}

/// Axis-aligned box in pixel coordinates, corner form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[allow(dead_code)]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn centroid(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// One detector output for one frame. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

/// Everything the decision step needs from a single frame, discarded after it.
#[derive(Debug, Clone)]
pub struct FrameObservation {
    pub detections: Vec<Detection>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl FrameObservation {
    /// First detection carrying a hazard label, in detector output order.
    /// Lowest index wins; later hazards in the same frame are deliberately
    /// ignored by the decision step.
    pub fn first_hazard(&self, hazard_labels: &[String]) -> Option<&Detection> {
        self.detections
            .iter()
            .find(|d| hazard_labels.iter().any(|l| l == &d.label))
    }

    pub fn has_hazard(&self, hazard_labels: &[String]) -> bool {
        self.first_hazard(hazard_labels).is_some()
    }
}

/// Ground-hazard detector over raw frames.
///
/// This is the stand-in occupying the seam where a trained model would sit:
/// it looks for dark road-surface blobs (pothole-like) and stacks of
/// horizontal edges (stair-like) using plain image analysis. Anything that
/// returns labeled boxes through `detect` can replace it.
pub struct HazardDetector {
    confidence_threshold: f32,
    max_detections: usize,
}

impl HazardDetector {
    pub fn new(confidence_threshold: f32, max_detections: usize) -> Self {
        info!("Initializing HazardDetector (image-analysis backend)");
        Self {
            confidence_threshold,
            max_detections,
        }
    }

    /// Run detection on one frame. Output order is significant downstream:
    /// the feedback step acts on the first qualifying entry only.
    pub fn detect(&self, frame: &Mat) -> Result<FrameObservation> {
        let image = frame.to_image()?;
        let rgb = image.to_rgb8();

        let mut detections = Vec::new();
        detections.extend(self.detect_dark_regions(&rgb));
        detections.extend(self.detect_edge_stacks(&rgb));

        let mut filtered: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();

        filtered.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        let mut kept = self.merge_overlapping(filtered);
        kept.truncate(self.max_detections);

        debug!("Detection found {} hazard candidates", kept.len());

        Ok(FrameObservation {
            detections: kept,
            frame_width: frame.width,
            frame_height: frame.height,
        })
    }

    /// Dark low-texture blobs in the lower half of the frame read as holes
    /// in the walking surface.
    fn detect_dark_regions(&self, rgb: &image::RgbImage) -> Vec<Detection> {
        let (width, height) = rgb.dimensions();
        let mut found = Vec::new();
        if width < 64 || height < 64 {
            return found;
        }

        let cell = 32u32;
        for y in ((height / 2)..height.saturating_sub(cell)).step_by(cell as usize) {
            for x in (0..width.saturating_sub(cell)).step_by(cell as usize) {
                let (mean, variance) = self.region_stats(rgb, x, y, cell, cell);

                // Dark and flat relative to road texture
                if mean < 55.0 && variance < 900.0 {
                    let darkness = ((55.0 - mean) / 55.0).clamp(0.0, 1.0);
                    let confidence = (0.5 + darkness * 0.5).min(0.95);
                    found.push(Detection {
                        bbox: BoundingBox {
                            x1: x as f32,
                            y1: y as f32,
                            x2: (x + cell) as f32,
                            y2: (y + cell) as f32,
                        },
                        label: "pothole".to_string(),
                        confidence,
                    });
                }
            }
        }

        found
    }

    /// Several strong horizontal brightness edges stacked vertically read as
    /// stair treads.
    fn detect_edge_stacks(&self, rgb: &image::RgbImage) -> Vec<Detection> {
        let (width, height) = rgb.dimensions();
        let mut found = Vec::new();
        if width < 64 || height < 64 {
            return found;
        }

        let mut edge_rows: Vec<u32> = Vec::new();
        for y in (height / 3)..(height - 1) {
            let mut strong = 0u32;
            for x in 1..(width - 1) {
                let above = Self::brightness(rgb.get_pixel(x, y - 1));
                let below = Self::brightness(rgb.get_pixel(x, y + 1));
                if (below - above).abs() > 28.0 {
                    strong += 1;
                }
            }
            if strong > width / 3 {
                edge_rows.push(y);
            }
        }

        // Collapse adjacent rows, then look for a run of distinct treads.
        let mut treads: Vec<u32> = Vec::new();
        for y in edge_rows {
            if treads.last().map_or(true, |&t| y > t + 4) {
                treads.push(y);
            }
        }

        if treads.len() >= 3 {
            let top = *treads.first().unwrap();
            let bottom = *treads.last().unwrap();
            let confidence = (0.5 + treads.len() as f32 * 0.1).min(0.9);
            found.push(Detection {
                bbox: BoundingBox {
                    x1: (width / 8) as f32,
                    y1: top as f32,
                    x2: (width - width / 8) as f32,
                    y2: bottom as f32,
                },
                label: "stairs".to_string(),
                confidence,
            });
        }

        found
    }

    fn region_stats(&self, rgb: &image::RgbImage, x: u32, y: u32, w: u32, h: u32) -> (f32, f32) {
        let mut values = Vec::with_capacity((w * h) as usize);
        for dy in 0..h {
            for dx in 0..w {
                if let Some(pixel) = rgb.get_pixel_checked(x + dx, y + dy) {
                    values.push(Self::brightness(pixel));
                }
            }
        }
        if values.is_empty() {
            return (0.0, 0.0);
        }
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        (mean, variance)
    }

    fn brightness(pixel: &Rgb<u8>) -> f32 {
        pixel[0] as f32 * 0.299 + pixel[1] as f32 * 0.587 + pixel[2] as f32 * 0.114
    }

    /// Keep the most confident detection of each overlapping cluster.
    /// Input must already be sorted by confidence, highest first.
    fn merge_overlapping(&self, detections: Vec<Detection>) -> Vec<Detection> {
        if detections.len() <= 1 {
            return detections;
        }

        let mut merged: Vec<Detection> = Vec::new();
        for det in detections {
            let overlaps = merged
                .iter()
                .any(|kept| Self::iou(&det.bbox, &kept.bbox) > 0.5);
            if !overlaps {
                merged.push(det);
            }
        }
        merged
    }

    fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
        let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
        let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
        let intersection = ix * iy;
        let union = a.area() + b.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

/// Frame annotator: hazard boxes, a sight-line from the walker's anchor point
/// to each hazard, and a distance tick above each box.
pub struct FrameAnnotator {
    box_color: [u8; 3],
    accent_color: [u8; 3],
}

impl FrameAnnotator {
    pub fn new(box_color: [u8; 3], accent_color: [u8; 3]) -> Self {
        Self {
            box_color,
            accent_color,
        }
    }

    pub fn annotate(
        &self,
        frame: &mut Mat,
        observation: &FrameObservation,
        distances: &[(usize, f32)],
    ) -> Result<()> {
        debug!(
            "Annotating frame with {} detections",
            observation.detections.len()
        );

        // Anchor at bottom-center of the frame, where the walker stands.
        let anchor = (frame.width as i32 / 2, frame.height as i32 - 1);

        for (index, det) in observation.detections.iter().enumerate() {
            self.draw_rectangle(frame, &det.bbox, self.box_color);

            let (cx, cy) = det.bbox.centroid();
            self.draw_line(frame, anchor, (cx as i32, cy as i32), self.accent_color);

            if let Some((_, distance)) = distances.iter().find(|(i, _)| *i == index) {
                self.draw_distance_tick(frame, &det.bbox, *distance);
            }
        }

        Ok(())
    }

    fn draw_rectangle(&self, frame: &mut Mat, bbox: &BoundingBox, color: [u8; 3]) {
        let width = frame.width as i32;
        let height = frame.height as i32;

        let x1 = (bbox.x1 as i32).clamp(0, width - 1);
        let y1 = (bbox.y1 as i32).clamp(0, height - 1);
        let x2 = (bbox.x2 as i32).clamp(0, width - 1);
        let y2 = (bbox.y2 as i32).clamp(0, height - 1);

        for x in x1..x2 {
            self.set_pixel(frame, x, y1, color);
            self.set_pixel(frame, x, y2, color);
        }
        for y in y1..y2 {
            self.set_pixel(frame, x1, y, color);
            self.set_pixel(frame, x2, y, color);
        }
    }

    fn draw_line(&self, frame: &mut Mat, from: (i32, i32), to: (i32, i32), color: [u8; 3]) {
        // Bresenham
        let (mut x0, mut y0) = from;
        let (x1, y1) = to;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.set_pixel(frame, x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// A horizontal bar above the box whose length scales inversely with
    /// distance: the stack carries no font rasterizer, so the tick plus the
    /// structured log stand in for rendered text.
    fn draw_distance_tick(&self, frame: &mut Mat, bbox: &BoundingBox, distance_m: f32) {
        let (cx, _) = bbox.centroid();
        let y = (bbox.y1 as i32 - 6).max(2);
        let half = ((40.0 / distance_m.max(0.5)).clamp(2.0, 60.0)) as i32;

        for dx in -half..=half {
            self.set_pixel(frame, cx as i32 + dx, y, self.accent_color);
            self.set_pixel(frame, cx as i32 + dx, y + 1, self.accent_color);
        }
    }

    fn set_pixel(&self, frame: &mut Mat, x: i32, y: i32, color: [u8; 3]) {
        if x < 0 || y < 0 || x >= frame.width as i32 || y >= frame.height as i32 {
            return;
        }
        let pixel_index = ((y as u32 * frame.width + x as u32) * frame.channels) as usize;
        if pixel_index + 2 < frame.data.len() {
            frame.data[pixel_index] = color[0];
            frame.data[pixel_index + 1] = color[1];
            frame.data[pixel_index + 2] = color[2];
        }
    }
}
