// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

//! Shi-Tomasi corner detection ("good features to track").
//!
//! The response of a pixel is the smaller eigenvalue of the gradient structure tensor summed over a 3x3 block.
//! Candidates above `quality * max_response` that are local maxima are accepted strongest first, skipping
//! any that fall closer than `min_dist` to an already accepted corner.

use image::{ GrayImage, ImageBuffer, Luma };
use rayon::prelude::*;

use super::Point;

pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Working storage for detection, reused across frames.
pub struct DetectionScratch {
    pub eig: FloatImage,
    dx: FloatImage,
    dy: FloatImage,
}

impl DetectionScratch {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            eig: FloatImage::new(width, height),
            dx:  FloatImage::new(width, height),
            dy:  FloatImage::new(width, height),
        }
    }
    fn ensure_size(&mut self, width: u32, height: u32) {
        if self.eig.dimensions() != (width, height) {
            log::debug!("Reallocating detection scratch to {}x{}", width, height);
            *self = Self::new(width, height);
        }
    }
}

pub fn good_features_to_track(img: &GrayImage, scratch: &mut DetectionScratch, max_count: usize, quality: f32, min_dist: f32) -> Vec<Point> {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 || max_count == 0 { return Vec::new(); }
    scratch.ensure_size(w, h);

    sobel(img, &mut scratch.dx, &mut scratch.dy);
    min_eigen_response(&scratch.dx, &scratch.dy, &mut scratch.eig);

    let eig = &scratch.eig;
    let max_response = eig.iter().copied().fold(0.0f32, f32::max);
    if max_response <= 0.0 { return Vec::new(); }
    let threshold = max_response * quality;

    let mut candidates = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let v = eig.get_pixel(x, y).0[0];
            if v <= threshold { continue; }
            let is_max = (y - 1..=y + 1).all(|ny| (x - 1..=x + 1).all(|nx| eig.get_pixel(nx, ny).0[0] <= v));
            if is_max {
                candidates.push((x, y, v));
            }
        }
    }
    // Stable sort keeps scan order for equal responses
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

    let min_dist_sq = min_dist * min_dist;
    let mut corners: Vec<Point> = Vec::with_capacity(max_count.min(candidates.len()));
    for (x, y, _) in candidates {
        let pt = (x as f32, y as f32);
        let far_enough = corners.iter().all(|c| {
            let (ddx, ddy) = (c.0 - pt.0, c.1 - pt.1);
            ddx * ddx + ddy * ddy >= min_dist_sq
        });
        if far_enough {
            corners.push(pt);
            if corners.len() >= max_count { break; }
        }
    }
    corners
}

#[inline]
fn px(img: &GrayImage, x: i64, y: i64) -> f32 {
    let x = x.clamp(0, img.width() as i64 - 1) as u32;
    let y = y.clamp(0, img.height() as i64 - 1) as u32;
    img.get_pixel(x, y).0[0] as f32
}

fn sobel(img: &GrayImage, dx: &mut FloatImage, dy: &mut FloatImage) {
    let w = img.width() as usize;
    dx.par_chunks_mut(w).zip(dy.par_chunks_mut(w)).enumerate().for_each(|(y, (row_x, row_y))| {
        let y = y as i64;
        for x in 0..w {
            let x = x as i64;
            let gx = (px(img, x + 1, y - 1) + 2.0 * px(img, x + 1, y) + px(img, x + 1, y + 1))
                   - (px(img, x - 1, y - 1) + 2.0 * px(img, x - 1, y) + px(img, x - 1, y + 1));
            let gy = (px(img, x - 1, y + 1) + 2.0 * px(img, x, y + 1) + px(img, x + 1, y + 1))
                   - (px(img, x - 1, y - 1) + 2.0 * px(img, x, y - 1) + px(img, x + 1, y - 1));
            row_x[x as usize] = gx / 8.0;
            row_y[x as usize] = gy / 8.0;
        }
    });
}

fn min_eigen_response(dx: &FloatImage, dy: &FloatImage, eig: &mut FloatImage) {
    let (w, h) = dx.dimensions();
    let at = |img: &FloatImage, x: i64, y: i64| -> f32 {
        img.get_pixel(x.clamp(0, w as i64 - 1) as u32, y.clamp(0, h as i64 - 1) as u32).0[0]
    };
    eig.par_chunks_mut(w as usize).enumerate().for_each(|(y, row)| {
        let y = y as i64;
        for x in 0..w as i64 {
            let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
            for by in -1..=1 {
                for bx in -1..=1 {
                    let gx = at(dx, x + bx, y + by);
                    let gy = at(dy, x + bx, y + by);
                    a += gx * gx;
                    b += gx * gy;
                    c += gy * gy;
                }
            }
            let half_trace = (a + c) * 0.5;
            let d = ((a - c) * 0.5).powi(2) + b * b;
            row[x as usize] = (half_trace - d.sqrt()).max(0.0);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x0 + size).contains(&x) && (y0..y0 + size).contains(&y) { Luma([220]) } else { Luma([20]) }
        })
    }

    #[test]
    fn uniform_image_has_no_corners() {
        let img = GrayImage::from_pixel(32, 32, Luma([128]));
        let mut scratch = DetectionScratch::new(32, 32);
        assert!(good_features_to_track(&img, &mut scratch, 10, 0.01, 1.0).is_empty());
    }

    #[test]
    fn finds_four_square_corners() {
        let img = square(40, 40, 12, 12, 14);
        let mut scratch = DetectionScratch::new(40, 40);
        let corners = good_features_to_track(&img, &mut scratch, 10, 0.1, 5.0);
        assert_eq!(corners.len(), 4);
        for (cx, cy) in [(12.0, 12.0), (25.0, 12.0), (12.0, 25.0), (25.0, 25.0)] {
            assert!(corners.iter().any(|c| (c.0 - cx).abs() <= 1.5 && (c.1 - cy).abs() <= 1.5), "missing corner near ({cx}, {cy}): {corners:?}");
        }
    }

    #[test]
    fn respects_max_count_and_min_dist() {
        let img = square(40, 40, 12, 12, 14);
        let mut scratch = DetectionScratch::new(8, 8);
        let corners = good_features_to_track(&img, &mut scratch, 2, 0.1, 5.0);
        assert_eq!(corners.len(), 2);
        let d = ((corners[0].0 - corners[1].0).powi(2) + (corners[0].1 - corners[1].1).powi(2)).sqrt();
        assert!(d >= 5.0);
        assert_eq!(scratch.eig.dimensions(), (40, 40));
    }
}
