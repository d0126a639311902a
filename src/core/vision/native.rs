// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use image::GrayImage;

use super::{ color, corners, lk, DetectionScratch, FlowOutput, Point, TermCriteria, VisionBackend };
use crate::error::{ Result, TrackerError };
use crate::frame::{ ColorConversion, RawImage };
use crate::pyramid::Pyramid;

/// Pure Rust implementation of the vision operations.
#[derive(Default, Clone, Copy, Debug)]
pub struct NativeBackend;

impl VisionBackend for NativeBackend {
    fn name(&self) -> &'static str { "native" }

    fn detect_corners(&self, image: &GrayImage, scratch: &mut DetectionScratch, max_count: usize, quality: f32, min_dist: f32) -> Result<Vec<Point>> {
        Ok(corners::good_features_to_track(image, scratch, max_count, quality, min_dist))
    }

    fn track_optical_flow(&self, prev: &GrayImage, curr: &GrayImage, prev_pyramid: &mut Pyramid, curr_pyramid: &mut Pyramid,
                          prev_corners: &[Point], win_size: u32, criteria: TermCriteria) -> Result<FlowOutput> {
        if prev.dimensions() != curr.dimensions() {
            return Err(TrackerError::FrameSizeMismatch { expected: prev.dimensions(), got: curr.dimensions() });
        }
        if prev_corners.is_empty() {
            return Ok(FlowOutput::default());
        }
        prev_pyramid.rebuild(prev);
        curr_pyramid.rebuild(curr);
        Ok(lk::calc_optical_flow_pyr_lk(prev_pyramid, curr_pyramid, prev_corners, win_size, criteria))
    }

    fn convert_color(&self, image: &RawImage, conversion: ColorConversion) -> Result<RawImage> {
        color::convert_color(image, conversion)
    }
}
