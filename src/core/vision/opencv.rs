// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use std::ffi::c_void;
use image::GrayImage;
use opencv::core::{ Mat, Point2f, Size, TermCriteria as CvTermCriteria, Vector, CV_8UC1, CV_8UC3 };
use opencv::prelude::MatTraitConst;

use super::{ DetectionScratch, FlowOutput, Point, TermCriteria, TrackStatus, VisionBackend };
use crate::error::{ Result, TrackerError };
use crate::frame::{ ColorConversion, PixelFormat, RawImage };
use crate::pyramid::Pyramid;

/// Vision operations forwarded to OpenCV.
#[derive(Default, Clone, Copy, Debug)]
pub struct OpenCVBackend;

fn gray_mat(img: &GrayImage) -> Result<Mat> {
    let (w, h) = (img.width() as i32, img.height() as i32);
    // The Mat borrows the image buffer, it must not outlive `img`
    Ok(unsafe { Mat::new_size_with_data_unsafe(Size::new(w, h), CV_8UC1, img.as_raw().as_ptr() as *mut c_void, w as usize) }?)
}

fn cv_type(format: PixelFormat) -> i32 {
    match format {
        PixelFormat::Gray8 => CV_8UC1,
        PixelFormat::Bgr8 | PixelFormat::Rgb8 => CV_8UC3,
    }
}

impl VisionBackend for OpenCVBackend {
    fn name(&self) -> &'static str { "opencv" }

    fn detect_corners(&self, image: &GrayImage, _scratch: &mut DetectionScratch, max_count: usize, quality: f32, min_dist: f32) -> Result<Vec<Point>> {
        let inp = gray_mat(image)?;
        let mut pts = Vector::<Point2f>::new();
        opencv::imgproc::good_features_to_track(&inp, &mut pts, max_count as i32, quality as f64, min_dist as f64, &Mat::default(), 3, false, 0.04)?;
        Ok(pts.iter().map(|p| (p.x, p.y)).collect())
    }

    fn track_optical_flow(&self, prev: &GrayImage, curr: &GrayImage, prev_pyramid: &mut Pyramid, _curr_pyramid: &mut Pyramid,
                          prev_corners: &[Point], win_size: u32, criteria: TermCriteria) -> Result<FlowOutput> {
        if prev.dimensions() != curr.dimensions() {
            return Err(TrackerError::FrameSizeMismatch { expected: prev.dimensions(), got: curr.dimensions() });
        }
        if prev_corners.is_empty() {
            return Ok(FlowOutput::default());
        }
        let a1_img = gray_mat(prev)?;
        let a2_img = gray_mat(curr)?;
        let a1_pts: Vector<Point2f> = prev_corners.iter().map(|(x, y)| Point2f::new(*x, *y)).collect();
        let mut a2_pts = Vector::<Point2f>::new();
        let mut status = Vector::<u8>::new();
        let mut err = Vector::<f32>::new();

        // OpenCV counts pyramid levels from 0
        let max_level = prev_pyramid.num_levels().saturating_sub(1) as i32;
        let crit = CvTermCriteria::new(3/*count+eps*/, criteria.max_iterations as i32, criteria.epsilon as f64)?;
        opencv::video::calc_optical_flow_pyr_lk(&a1_img, &a2_img, &a1_pts, &mut a2_pts, &mut status, &mut err,
                                                Size::new(win_size as i32, win_size as i32), max_level, crit, 0, 1e-4)?;

        Ok(FlowOutput {
            corners: a2_pts.iter().map(|p| (p.x, p.y)).collect(),
            status:  status.iter().map(|s| if s == 1 { TrackStatus::Tracked } else { TrackStatus::Lost }).collect(),
            error:   err.to_vec(),
        })
    }

    fn convert_color(&self, image: &RawImage, conversion: ColorConversion) -> Result<RawImage> {
        if image.format != conversion.input_format() {
            return Err(TrackerError::UnsupportedConversion { conversion, format: image.format });
        }
        let code = match conversion {
            ColorConversion::BgrToRgb  => opencv::imgproc::COLOR_BGR2RGB,
            ColorConversion::RgbToBgr  => opencv::imgproc::COLOR_RGB2BGR,
            ColorConversion::BgrToGray => opencv::imgproc::COLOR_BGR2GRAY,
            ColorConversion::RgbToGray => opencv::imgproc::COLOR_RGB2GRAY,
            ColorConversion::GrayToRgb => opencv::imgproc::COLOR_GRAY2RGB,
        };
        let (w, h) = (image.width as i32, image.height as i32);
        let step = image.width as usize * image.format.channels();
        let src = unsafe { Mat::new_size_with_data_unsafe(Size::new(w, h), cv_type(image.format), image.data.as_ptr() as *mut c_void, step) }?;
        let mut dst = Mat::default();
        opencv::imgproc::cvt_color_def(&src, &mut dst, code)?;
        RawImage::new(image.width, image.height, conversion.output_format(), dst.data_bytes()?.to_vec())
    }
}
