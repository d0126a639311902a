// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use crate::error::{ Result, TrackerError };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr8,
    Rgb8,
    Gray8,
}
impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConversion {
    BgrToRgb,
    RgbToBgr,
    BgrToGray,
    RgbToGray,
    GrayToRgb,
}
impl ColorConversion {
    pub fn input_format(&self) -> PixelFormat {
        match self {
            Self::BgrToRgb | Self::BgrToGray => PixelFormat::Bgr8,
            Self::RgbToBgr | Self::RgbToGray => PixelFormat::Rgb8,
            Self::GrayToRgb => PixelFormat::Gray8,
        }
    }
    pub fn output_format(&self) -> PixelFormat {
        match self {
            Self::BgrToRgb | Self::GrayToRgb => PixelFormat::Rgb8,
            Self::RgbToBgr => PixelFormat::Bgr8,
            Self::BgrToGray | Self::RgbToGray => PixelFormat::Gray8,
        }
    }
}

/// A tightly packed interleaved frame as delivered by a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(TrackerError::InvalidBuffer(format!("{}x{} {:?} needs {} bytes, got {}", width, height, format, expected, data.len())));
        }
        Ok(Self { width, height, format, data })
    }

    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Self {
        Self { width, height, format, data: vec![value; width as usize * height as usize * format.channels()] }
    }

    pub fn from_gray(img: &image::GrayImage) -> Self {
        Self { width: img.width(), height: img.height(), format: PixelFormat::Gray8, data: img.as_raw().clone() }
    }

    /// Converts an RGB image into the BGR layout cameras deliver.
    pub fn bgr_from_rgb(img: &image::RgbImage) -> Self {
        let mut data = img.as_raw().clone();
        for px in data.chunks_exact_mut(3) { px.swap(0, 2); }
        Self { width: img.width(), height: img.height(), format: PixelFormat::Bgr8, data }
    }

    pub fn size(&self) -> (u32, u32) { (self.width, self.height) }

    pub fn is_empty(&self) -> bool { self.width == 0 || self.height == 0 || self.data.is_empty() }
}
