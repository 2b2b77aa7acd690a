use thiserror::Error;

/// Horizontal region of the frame a detection falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardPosition {
    Left,
    Center,
    Right,
}

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("degenerate bounding box width {width} px")]
    DegenerateBox { width: f32 },
    #[error("invalid calibration: known width {known_width_m} m, focal length {focal_length_px} px")]
    InvalidCalibration {
        known_width_m: f32,
        focal_length_px: f32,
    },
}

/// Pinhole-camera distance estimate from apparent width.
///
/// `known_width_m` and `focal_length_px` are operator-supplied calibration
/// constants; they are not derived here. A zero or negative box width is a
/// degenerate detection and yields an error instead of a division fault.
pub fn estimate_distance(
    box_width_px: f32,
    known_width_m: f32,
    focal_length_px: f32,
) -> Result<f32, GeometryError> {
    if known_width_m <= 0.0 || focal_length_px <= 0.0 {
        return Err(GeometryError::InvalidCalibration {
            known_width_m,
            focal_length_px,
        });
    }
    if box_width_px <= 0.0 {
        return Err(GeometryError::DegenerateBox {
            width: box_width_px,
        });
    }
    Ok(known_width_m * focal_length_px / box_width_px)
}

/// Classify a centroid x-coordinate into thirds of the frame.
///
/// Boundaries belong center-ward: strict `<` and `>`, so exact thirds
/// classify as `Center`.
pub fn classify_position(cx: f32, frame_width: f32) -> HazardPosition {
    let third = frame_width / 3.0;
    if cx < third {
        HazardPosition::Left
    } else if cx > 2.0 * third {
        HazardPosition::Right
    } else {
        HazardPosition::Center
    }
}
