//! Region cropping by bounding fractions.
//!
//! Coordinates are fractions of the image width/height, so the same region
//! works at any rendering DPI.

use crate::error::ExtractError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A rectangle expressed as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Pixel rectangle: `x0..x1` × `y0..y1`, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBounds {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

impl Default for CropRegion {
    /// Bottom-left 35 % × 35 %, where the technical remarks block sits.
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.65,
            right: 0.35,
            bottom: 1.0,
        }
    }
}

impl CropRegion {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Reject fractions outside [0, 1] and empty or inverted rectangles.
    pub fn validate(&self) -> Result<(), ExtractError> {
        for (name, v) in [
            ("left", self.left),
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ExtractError::CropGeometry(format!(
                    "{name} = {v} is outside [0, 1]"
                )));
            }
        }
        if self.left >= self.right {
            return Err(ExtractError::CropGeometry(format!(
                "left ({}) must be less than right ({})",
                self.left, self.right
            )));
        }
        if self.top >= self.bottom {
            return Err(ExtractError::CropGeometry(format!(
                "top ({}) must be less than bottom ({})",
                self.top, self.bottom
            )));
        }
        Ok(())
    }

    /// Pixel bounds for a `width` × `height` image, truncating toward zero.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> Result<PixelBounds, ExtractError> {
        self.validate()?;
        let scale = |frac: f64, extent: u32| (frac * f64::from(extent)) as u32;
        let bounds = PixelBounds {
            x0: scale(self.left, width),
            y0: scale(self.top, height),
            x1: scale(self.right, width),
            y1: scale(self.bottom, height),
        };
        if bounds.x0 >= bounds.x1 || bounds.y0 >= bounds.y1 {
            return Err(ExtractError::CropGeometry(format!(
                "{self} selects no pixels of a {width}x{height} image"
            )));
        }
        Ok(bounds)
    }

    /// Cut this region out of `img`.
    pub fn apply(&self, img: &DynamicImage) -> Result<DynamicImage, ExtractError> {
        let b = self.pixel_bounds(img.width(), img.height())?;
        Ok(img.crop_imm(b.x0, b.y0, b.width(), b.height()))
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.left, self.top, self.right, self.bottom
        )
    }
}

impl FromStr for CropRegion {
    type Err = ExtractError;

    /// Parse `"left,top,right,bottom"`, e.g. `"0,0.65,0.35,1"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| {
                p.trim().parse::<f64>().map_err(|_| {
                    ExtractError::CropGeometry(format!("'{}' is not a number", p.trim()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let [left, top, right, bottom] = parts[..] else {
            return Err(ExtractError::CropGeometry(format!(
                "expected four comma-separated fractions, got '{s}'"
            )));
        };
        let region = CropRegion::new(left, top, right, bottom);
        region.validate()?;
        Ok(region)
    }
}
