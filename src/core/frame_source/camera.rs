// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use opencv::core::Mat;
use opencv::prelude::{ MatTraitConst, VideoCaptureTrait, VideoCaptureTraitConst };
use opencv::videoio::{ VideoCapture, CAP_ANY };

use super::FrameSource;
use crate::error::{ Result, TrackerError };
use crate::frame::{ PixelFormat, RawImage };

/// Capture device opened through OpenCV. Frames are BGR.
pub struct CameraSource {
    device: i32,
    cap: VideoCapture,
    frame: Mat,
}

impl CameraSource {
    pub fn open(device: i32) -> Result<Self> {
        let cap = VideoCapture::new(device, CAP_ANY)?;
        if !cap.is_opened()? {
            return Err(TrackerError::capture(format!("camera {} could not be opened", device)));
        }
        log::info!("Opened camera {}", device);
        Ok(Self { device, cap, frame: Mat::default() })
    }
}

impl FrameSource for CameraSource {
    fn acquire_frame(&mut self) -> Result<RawImage> {
        let ok = self.cap.read(&mut self.frame)
            .map_err(|e| TrackerError::capture(format!("camera {}: {:?}", self.device, e)))?;
        if !ok || self.frame.empty() {
            return Err(TrackerError::capture(format!("camera {} returned no frame", self.device)));
        }
        if self.frame.channels() != 3 {
            return Err(TrackerError::capture(format!("camera {} delivered {} channels", self.device, self.frame.channels())));
        }
        let (w, h) = (self.frame.cols() as u32, self.frame.rows() as u32);
        let data = if self.frame.is_continuous() {
            self.frame.data_bytes()?.to_vec()
        } else {
            self.frame.try_clone()?.data_bytes()?.to_vec()
        };
        RawImage::new(w, h, PixelFormat::Bgr8, data)
    }
    fn describe(&self) -> String { format!("camera {}", self.device) }
}
