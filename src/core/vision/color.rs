// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use crate::error::{ Result, TrackerError };
use crate::frame::{ ColorConversion, RawImage };

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

pub fn convert_color(image: &RawImage, conversion: ColorConversion) -> Result<RawImage> {
    if image.format != conversion.input_format() {
        return Err(TrackerError::UnsupportedConversion { conversion, format: image.format });
    }
    let data = match conversion {
        ColorConversion::BgrToRgb | ColorConversion::RgbToBgr => {
            let mut data = image.data.clone();
            for px in data.chunks_exact_mut(3) { px.swap(0, 2); }
            data
        }
        ColorConversion::BgrToGray => image.data.chunks_exact(3).map(|px| luma(px[2], px[1], px[0])).collect(),
        ColorConversion::RgbToGray => image.data.chunks_exact(3).map(|px| luma(px[0], px[1], px[2])).collect(),
        ColorConversion::GrayToRgb => image.data.iter().flat_map(|&v| [v, v, v]).collect(),
    };
    RawImage::new(image.width, image.height, conversion.output_format(), data)
}
