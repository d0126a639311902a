// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use image::GrayImage;

use crate::error::Result;
use crate::frame::{ ColorConversion, RawImage };
use crate::pyramid::Pyramid;

pub mod color;
pub mod corners;
pub mod lk;
mod native;   pub use native::*;
#[cfg(feature = "use-opencv")] mod opencv; #[cfg(feature = "use-opencv")] pub use self::opencv::*;

pub use corners::DetectionScratch;

pub type Point = (f32, f32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermCriteria {
    pub max_iterations: usize,
    pub epsilon: f32,
}
impl Default for TermCriteria {
    fn default() -> Self {
        Self { max_iterations: 20, epsilon: 0.01 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TrackStatus {
    Tracked,
    Lost,
}
impl TrackStatus {
    pub fn is_tracked(&self) -> bool { *self == TrackStatus::Tracked }
}

/// Output of one optical flow pass. All three vectors have the length of the input point set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowOutput {
    pub corners: Vec<Point>,
    pub status: Vec<TrackStatus>,
    pub error: Vec<f32>,
}

/// The image operations the tracker needs. Implementations must be pure with respect to their inputs,
/// the buffers passed in as `&mut` are scratch storage owned by the tracker.
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect_corners(&self, image: &GrayImage, scratch: &mut DetectionScratch, max_count: usize, quality: f32, min_dist: f32) -> Result<Vec<Point>>;

    /// Pyramid depth is taken from the pyramid buffers.
    fn track_optical_flow(&self, prev: &GrayImage, curr: &GrayImage, prev_pyramid: &mut Pyramid, curr_pyramid: &mut Pyramid,
                          prev_corners: &[Point], win_size: u32, criteria: TermCriteria) -> Result<FlowOutput>;

    fn convert_color(&self, image: &RawImage, conversion: ColorConversion) -> Result<RawImage>;
}
