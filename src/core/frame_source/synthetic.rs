// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use std::sync::Arc;
use std::sync::atomic::{ AtomicUsize, Ordering::SeqCst };

use super::FrameSource;
use crate::error::{ Result, TrackerError };
use crate::frame::{ PixelFormat, RawImage };

/// Cycles through a fixed list of frames, optionally failing after a number of frames.
pub struct SyntheticSource {
    frames: Vec<RawImage>,
    index: usize,
    limit: Option<usize>,
    delivered: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new(frames: Vec<RawImage>) -> Self {
        Self { frames, index: 0, limit: None, delivered: Default::default() }
    }
    pub fn repeat(frame: RawImage) -> Self { Self::new(vec![frame]) }
    pub fn alternate(a: RawImage, b: RawImage) -> Self { Self::new(vec![a, b]) }

    /// After `limit` frames every acquisition fails with `CaptureUnavailable`.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Counter of frames handed out so far, usable after the source moved into a tracker.
    pub fn delivered(&self) -> Arc<AtomicUsize> { self.delivered.clone() }
}

impl FrameSource for SyntheticSource {
    fn acquire_frame(&mut self) -> Result<RawImage> {
        if self.frames.is_empty() {
            return Err(TrackerError::capture("synthetic source has no frames"));
        }
        if let Some(limit) = self.limit {
            if self.delivered.load(SeqCst) >= limit {
                return Err(TrackerError::capture(format!("synthetic source exhausted after {} frames", limit)));
            }
        }
        let frame = self.frames[self.index % self.frames.len()].clone();
        self.index += 1;
        self.delivered.fetch_add(1, SeqCst);
        Ok(frame)
    }
    fn describe(&self) -> String { format!("synthetic ({} frames)", self.frames.len()) }
}

/// Frames of a bright soft-edged square of side `size` moving right by `step` pixels per frame, BGR.
pub fn moving_square_scene(width: u32, height: u32, size: u32, step: u32, count: usize) -> Vec<RawImage> {
    let y0 = height.saturating_sub(size) / 2;
    let travel = width.saturating_sub(size + 2).max(1);
    (0..count).map(|i| {
        let x0 = 1 + (i as u32 * step) % travel;
        square_frame(width, height, x0 as f32, y0 as f32, size as f32)
    }).collect()
}

/// A single soft-edged square on a dark background. The square spans `[x0, x0 + size]` with edges
/// ramping over three pixels, which keeps its corners trackable at subpixel precision.
pub fn square_frame(width: u32, height: u32, x0: f32, y0: f32, size: f32) -> RawImage {
    let ramp = |t: f32| ((t + 1.5) / 3.0).clamp(0.0, 1.0);
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            let (fx, fy) = (x as f32, y as f32);
            let s = ramp(fx - x0) * ramp(x0 + size - fx) * ramp(fy - y0) * ramp(y0 + size - fy);
            let v = (30.0 + 180.0 * s).round() as u8;
            data.extend_from_slice(&[v, v, v]);
        }
    }
    RawImage { width, height, format: PixelFormat::Bgr8, data }
}
