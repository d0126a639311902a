// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

//! Pyramidal Lucas-Kanade sparse optical flow.
//!
//! Each point is tracked coarse to fine. On every level the 2x2 normal equations of the window
//! are solved iteratively until the update falls below epsilon or the iteration limit is hit.
//! The estimate of a level, doubled, seeds the next finer level.

use image::GrayImage;
use nalgebra::{ Matrix2, Vector2 };
use rayon::prelude::*;

use super::{ FlowOutput, Point, TermCriteria, TrackStatus };
use crate::pyramid::Pyramid;
use crate::tracker_params::MAX_WIN_SIZE;

// Normalized minimum eigenvalue below which a window is considered flat
const MIN_EIGEN_THRESHOLD: f32 = 1e-4;

pub fn calc_optical_flow_pyr_lk(prev: &Pyramid, next: &Pyramid, points: &[Point], win_size: u32, criteria: TermCriteria) -> FlowOutput {
    let half = (win_size.min(MAX_WIN_SIZE) / 2).max(1) as i32;
    let results: Vec<(Point, TrackStatus, f32)> = points.par_iter().map(|&pt| track_point(prev, next, pt, half, criteria)).collect();

    let mut out = FlowOutput {
        corners: Vec::with_capacity(results.len()),
        status:  Vec::with_capacity(results.len()),
        error:   Vec::with_capacity(results.len()),
    };
    for (pt, status, err) in results {
        out.corners.push(pt);
        out.status.push(status);
        out.error.push(err);
    }
    out
}

fn track_point(prev: &Pyramid, next: &Pyramid, pt: Point, half: i32, criteria: TermCriteria) -> (Point, TrackStatus, f32) {
    let levels = prev.num_levels().min(next.num_levels());
    let lost = (pt, TrackStatus::Lost, f32::MAX);
    let side = (2 * half + 1) as f32;
    let npix = side * side;

    let mut flow = Vector2::<f32>::zeros();
    for level in (0..levels).rev() {
        let scale = 2f32.powi(level as i32);
        let p = Vector2::new(pt.0 / scale, pt.1 / scale);
        let (img_prev, img_next) = (prev.level(level), next.level(level));

        let window = Window::sample(img_prev, p, half);
        let g = Matrix2::new(window.gxx, window.gxy, window.gxy, window.gyy);
        let min_eig = min_eigenvalue(window.gxx, window.gxy, window.gyy) / (npix * 255.0 * 255.0);

        match g.try_inverse() {
            Some(g_inv) if min_eig >= MIN_EIGEN_THRESHOLD => {
                for _ in 0..criteria.max_iterations {
                    let q = p + flow;
                    let b = window.mismatch(img_next, q, half);
                    let delta = g_inv * b;
                    flow += delta;
                    if !flow.x.is_finite() || !flow.y.is_finite() { return lost; }
                    if delta.norm_squared() < criteria.epsilon * criteria.epsilon { break; }
                }
            }
            // Too little texture on the finest level to trust anything
            _ if level == 0 => return lost,
            // Coarse level without texture, pass the current estimate down unchanged
            _ => { }
        }
        if level > 0 {
            flow *= 2.0;
        }
    }

    let (w, h) = prev.level(0).dimensions();
    let out = (pt.0 + flow.x, pt.1 + flow.y);
    if out.0 < 0.0 || out.1 < 0.0 || out.0 > (w - 1) as f32 || out.1 > (h - 1) as f32 {
        return lost;
    }
    let error = patch_error(prev.level(0), next.level(0), pt, out, half);
    (out, TrackStatus::Tracked, error)
}

fn min_eigenvalue(gxx: f32, gxy: f32, gyy: f32) -> f32 {
    let half_trace = (gxx + gyy) * 0.5;
    let d = ((gxx - gyy) * 0.5).powi(2) + gxy * gxy;
    half_trace - d.sqrt()
}

/// Template intensities and gradients of the previous image around a point.
struct Window {
    values: Vec<f32>,
    grad_x: Vec<f32>,
    grad_y: Vec<f32>,
    gxx: f32,
    gxy: f32,
    gyy: f32,
}

impl Window {
    fn sample(img: &GrayImage, p: Vector2<f32>, half: i32) -> Self {
        let side = (2 * half + 1) as usize;
        let n = side * side;
        let mut w = Window { values: Vec::with_capacity(n), grad_x: Vec::with_capacity(n), grad_y: Vec::with_capacity(n), gxx: 0.0, gxy: 0.0, gyy: 0.0 };
        for dy in -half..=half {
            for dx in -half..=half {
                let (x, y) = (p.x + dx as f32, p.y + dy as f32);
                let ix = (sample_bilinear(img, x + 1.0, y) - sample_bilinear(img, x - 1.0, y)) * 0.5;
                let iy = (sample_bilinear(img, x, y + 1.0) - sample_bilinear(img, x, y - 1.0)) * 0.5;
                w.values.push(sample_bilinear(img, x, y));
                w.grad_x.push(ix);
                w.grad_y.push(iy);
                w.gxx += ix * ix;
                w.gxy += ix * iy;
                w.gyy += iy * iy;
            }
        }
        w
    }

    fn mismatch(&self, next: &GrayImage, q: Vector2<f32>, half: i32) -> Vector2<f32> {
        let mut b = Vector2::<f32>::zeros();
        let mut idx = 0;
        for dy in -half..=half {
            for dx in -half..=half {
                let dt = self.values[idx] - sample_bilinear(next, q.x + dx as f32, q.y + dy as f32);
                b.x += self.grad_x[idx] * dt;
                b.y += self.grad_y[idx] * dt;
                idx += 1;
            }
        }
        b
    }
}

fn patch_error(prev: &GrayImage, next: &GrayImage, from: Point, to: Point, half: i32) -> f32 {
    let mut sum = 0.0f32;
    let mut n = 0usize;
    for dy in -half..=half {
        for dx in -half..=half {
            let a = sample_bilinear(prev, from.0 + dx as f32, from.1 + dy as f32);
            let b = sample_bilinear(next, to.0 + dx as f32, to.1 + dy as f32);
            sum += (a - b).abs();
            n += 1;
        }
    }
    sum / n as f32
}

/// Bilinear interpolation with the border replicated outside the image
pub fn sample_bilinear(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0).0[0] as f32;
    let p10 = img.get_pixel(x1, y0).0[0] as f32;
    let p01 = img.get_pixel(x0, y1).0[0] as f32;
    let p11 = img.get_pixel(x1, y1).0[0] as f32;

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    top * (1.0 - fy) + bottom * fy
}
